//! Slack Web API client and Socket Mode listener.

use std::sync::Arc;

use slack_morphism::prelude::{
    SlackApiChatPostMessageRequest, SlackApiToken, SlackApiTokenType, SlackApiTokenValue,
    SlackChannelId, SlackClient, SlackClientEventsListenerEnvironment,
    SlackClientHyperHttpsConnector, SlackClientSession, SlackClientSocketModeConfig,
    SlackClientSocketModeListener, SlackMessageContent, SlackSocketModeListenerCallbacks,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::delivery::{ChatDelivery, DeliveryFuture};
use crate::models::RequesterId;
use crate::pipe::PipeOrchestrator;
use crate::slack::events;
use crate::{config::SlackConfig, AppError, Result};

/// Message to be delivered to Slack via `chat.postMessage`.
#[derive(Debug, Clone)]
pub struct SlackMessage {
    /// Destination channel (or DM) ID.
    pub channel: SlackChannelId,
    /// Message body; Slack renders `mrkdwn`.
    pub text: String,
}

impl SlackMessage {
    /// Create a plain-text message for a channel.
    #[must_use]
    pub fn plain(channel: SlackChannelId, text: impl Into<String>) -> Self {
        Self {
            channel,
            text: text.into(),
        }
    }

    fn into_request(self) -> SlackApiChatPostMessageRequest {
        SlackApiChatPostMessageRequest::new(
            self.channel,
            SlackMessageContent::new().with_text(self.text),
        )
        .with_unfurl_links(false)
        .with_unfurl_media(false)
    }
}

/// Slack connection used both for delivery and for receiving events.
pub struct SlackService {
    client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    bot_token: SlackApiToken,
    app_token: SlackApiToken,
    operator_channel: SlackChannelId,
}

impl SlackService {
    /// Build the HTTPS client from loaded credentials.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the HTTPS connector cannot be created.
    pub fn connect(config: &SlackConfig) -> Result<Self> {
        let connector = SlackClientHyperHttpsConnector::new()
            .map_err(|err| AppError::Slack(format!("failed to init slack connector: {err}")))?;
        let client = Arc::new(SlackClient::new(connector));
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.bot_token.clone()))
            .with_token_type(SlackApiTokenType::Bot);
        let app_token = SlackApiToken::new(SlackApiTokenValue(config.app_token.clone()))
            .with_token_type(SlackApiTokenType::App);

        Ok(Self {
            client,
            bot_token,
            app_token,
            operator_channel: SlackChannelId(config.operator_channel_id.clone()),
        })
    }

    /// Post `message` and wait for Slack to accept it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the API call fails.
    pub async fn post(&self, message: SlackMessage) -> Result<()> {
        let request = message.into_request();
        self.http_session()
            .chat_post_message(&request)
            .await
            .map_err(|err| AppError::Slack(format!("failed to post message: {err}")))?;
        debug!(channel = %request.channel.0, "sent slack message");
        Ok(())
    }

    /// Start the Socket Mode listener, routing message events to `orchestrator`.
    #[must_use]
    pub fn spawn_socket_mode(&self, orchestrator: Arc<PipeOrchestrator>) -> JoinHandle<()> {
        let listener_env = Arc::new(
            SlackClientEventsListenerEnvironment::new(Arc::clone(&self.client))
                .with_error_handler(|err, _client, _state| {
                    error!(?err, "socket mode error");
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR
                })
                .with_user_state(orchestrator),
        );
        let callbacks = SlackSocketModeListenerCallbacks::new()
            .with_hello_events(|event, _client, _state| async move {
                info!(?event, "socket hello");
            })
            .with_push_events(events::handle_push_event);
        let config = SlackClientSocketModeConfig::new();

        let listener = SlackClientSocketModeListener::new(&config, listener_env, callbacks);
        let app_token = self.app_token.clone();
        tokio::spawn(async move {
            if let Err(error) = listener.listen_for(&app_token).await {
                error!(?error, "socket mode listen failed");
                return;
            }

            listener.serve().await;
            info!("socket mode listener exited");
        })
    }

    fn http_session(&self) -> SlackClientSession<'_, SlackClientHyperHttpsConnector> {
        self.client.open_session(&self.bot_token)
    }
}

impl ChatDelivery for SlackService {
    fn deliver<'a>(&'a self, to: &'a RequesterId, text: String) -> DeliveryFuture<'a> {
        let channel = SlackChannelId(to.as_str().to_owned());
        Box::pin(self.post(SlackMessage::plain(channel, text)))
    }

    fn notify_operator(&self, text: String) -> DeliveryFuture<'_> {
        Box::pin(self.post(SlackMessage::plain(self.operator_channel.clone(), text)))
    }
}
