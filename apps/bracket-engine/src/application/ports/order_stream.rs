//! Order Stream Port (Driven Port)
//!
//! Interface for the broker's live order-update stream. The underlying
//! connection is a single shared subscription; `subscribe`/`unsubscribe`
//! must be idempotent from the caller's perspective.

use async_trait::async_trait;
use serde_json::Value;

/// Channel name for order status updates.
pub const ORDER_UPDATES_CHANNEL: &str = "orders";

/// Order stream error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    /// The stream connection is not established.
    #[error("order stream not connected")]
    NotConnected,

    /// Subscribing or unsubscribing failed.
    #[error("stream subscription failed: {message}")]
    SubscriptionFailed {
        /// Error details.
        message: String,
    },
}

/// Port for the broker order-update stream.
#[async_trait]
pub trait OrderStreamPort: Send + Sync {
    /// Subscribe to a channel. Subscribing twice must not duplicate delivery.
    async fn subscribe(&self, channel: &str) -> Result<(), StreamError>;

    /// Unsubscribe from a channel.
    async fn unsubscribe(&self, channel: &str) -> Result<(), StreamError>;

    /// Drain all currently available messages without blocking.
    async fn poll_messages(&self) -> Vec<Value>;

    /// Whether the stream connection is usable.
    async fn is_ready(&self) -> bool;
}
