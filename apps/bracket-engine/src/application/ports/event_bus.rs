//! Event Bus Port (Driven Port)
//!
//! Fire-and-forget pub-sub fan-out to zero or more live listeners
//! (e.g. a dashboard websocket), keyed by topic.

use async_trait::async_trait;
use serde_json::Value;

/// Event publishing error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    /// Publishing failed.
    #[error("event publish failed: {message}")]
    PublishFailed {
        /// Error details.
        message: String,
    },
}

/// Port for publishing events to live listeners.
#[async_trait]
pub trait EventBusPort: Send + Sync {
    /// Publish a payload on a topic.
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PublishError>;
}

/// No-op event bus for tests and wiring without listeners.
#[derive(Debug, Clone, Default)]
pub struct NoOpEventBus;

#[async_trait]
impl EventBusPort for NoOpEventBus {
    async fn publish(&self, _topic: &str, _payload: Value) -> Result<(), PublishError> {
        Ok(())
    }
}
