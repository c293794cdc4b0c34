//! Outbound chat delivery abstraction.
//!
//! The [`ChatDelivery`] trait decouples the pipe core from the chat platform.
//! The Slack adapter implements it in production; tests substitute a
//! recording fake.

use std::future::Future;
use std::pin::Pin;

use crate::models::RequesterId;
use crate::Result;

/// Boxed future returned by [`ChatDelivery`] methods.
pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Sends text to chat identities.
pub trait ChatDelivery: Send + Sync {
    /// Deliver `text` to `to`.
    ///
    /// Resolves only once the platform has accepted the message, so a caller
    /// awaiting it knows the message is visible before doing anything else.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Slack`](crate::AppError::Slack) (or the platform
    /// equivalent) if the platform rejects the message.
    fn deliver<'a>(&'a self, to: &'a RequesterId, text: String) -> DeliveryFuture<'a>;

    /// Deliver `text` to the operator-facing channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the message.
    fn notify_operator(&self, text: String) -> DeliveryFuture<'_>;
}
