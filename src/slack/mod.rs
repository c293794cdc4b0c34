//! Slack front-end: Socket Mode intake and `chat.postMessage` delivery.

pub mod client;
pub mod events;
