//! Delivery channels: where notifications are posted.
//!
//! - Discord Bot REST API
//! - In-memory channel for tests and embedding

mod discord;
mod memory;

pub use discord::{DiscordChannel, DiscordConfig};
pub use memory::{ChannelOp, MemoryChannel};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::message::MessageContent;

/// Opaque identifier of a message previously sent on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHandle(String);

impl MessageHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure of a single delivery-channel call.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// The message no longer exists (deleted by someone else, or never did).
    #[error("message not found")]
    NotFound,

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

impl DeliveryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

pub type DeliveryResult<T> = std::result::Result<T, DeliveryError>;

/// A chat surface notifications are delivered to.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str;

    /// Post a new message.
    async fn send(&self, content: &MessageContent) -> DeliveryResult<MessageHandle>;

    /// Replace the body of an existing message.
    async fn edit(&self, handle: &MessageHandle, content: &MessageContent) -> DeliveryResult<()>;

    async fn delete(&self, handle: &MessageHandle) -> DeliveryResult<()>;

    /// Read back an existing message.
    async fn fetch(&self, handle: &MessageHandle) -> DeliveryResult<MessageContent>;
}
