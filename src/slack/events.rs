//! Slack push-event intake.
//!
//! Socket Mode delivers every subscribed event here. Human-authored channel
//! or DM messages become [`InboundEvent::Text`], addressed back to the
//! channel they came from. Bot messages (including the relay's own replies),
//! edits, joins, and every other event type become [`InboundEvent::Other`].

use std::sync::Arc;

use slack_morphism::prelude::{
    SlackClient, SlackClientEventsUserState, SlackClientHyperHttpsConnector,
    SlackEventCallbackBody, SlackMessageEvent, SlackPushEventCallback,
};
use tracing::warn;

use crate::models::{InboundEvent, RequesterId};
use crate::pipe::PipeOrchestrator;

/// Handle a push event delivered via Socket Mode.
///
/// Routing runs on its own task so the Socket Mode acknowledgement is not
/// held up by chat delivery. Events are therefore not ordered: two messages
/// arriving back to back may reach the worker in either order.
///
/// # Errors
///
/// Never fails; unusable events are ignored.
pub async fn handle_push_event(
    event: SlackPushEventCallback,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::UserCallbackResult<()> {
    let orchestrator: Option<Arc<PipeOrchestrator>> = {
        let guard = state.read().await;
        guard.get_user_state::<Arc<PipeOrchestrator>>().cloned()
    };
    let Some(orchestrator) = orchestrator else {
        warn!("orchestrator not available; dropping push event");
        return Ok(());
    };

    let inbound = match &event.event {
        SlackEventCallbackBody::Message(message) => inbound_from_message(message),
        _ => InboundEvent::Other,
    };

    tokio::spawn(async move {
        orchestrator.handle_inbound(inbound).await;
    });
    Ok(())
}

fn inbound_from_message(message: &SlackMessageEvent) -> InboundEvent {
    inbound_from_parts(
        message.origin.channel.as_ref().map(|channel| channel.0.as_str()),
        message
            .content
            .as_ref()
            .and_then(|content| content.text.as_deref()),
        message.sender.bot_id.is_some() || message.subtype.is_some(),
    )
}

/// Classify a Slack message from its channel, text, and bot/subtype flag.
#[must_use]
pub fn inbound_from_parts(
    channel: Option<&str>,
    text: Option<&str>,
    automated: bool,
) -> InboundEvent {
    if automated {
        return InboundEvent::Other;
    }
    match (channel, text) {
        (Some(channel), Some(text)) if !channel.is_empty() => InboundEvent::Text {
            from: RequesterId::new(channel),
            text: text.to_owned(),
        },
        _ => InboundEvent::Other,
    }
}
