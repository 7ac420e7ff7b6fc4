//! Notification Sink Port (Driven Port)
//!
//! Fire-and-forget alerts about fills and protective-order actions.
//! Delivery failures are logged by callers and never abort a monitor loop.

use async_trait::async_trait;
use serde_json::Value;

/// Notification error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    /// Delivery failed.
    #[error("notification delivery failed: {message}")]
    DeliveryFailed {
        /// Error details.
        message: String,
    },
}

/// Port for the notification sink.
#[async_trait]
pub trait NotifierPort: Send + Sync {
    /// Emit a notification event.
    async fn notify(&self, event_type: &str, payload: Value) -> Result<(), NotifyError>;
}

/// No-op notifier for tests and wiring without a sink.
#[derive(Debug, Clone, Default)]
pub struct NoOpNotifier;

#[async_trait]
impl NotifierPort for NoOpNotifier {
    async fn notify(&self, _event_type: &str, _payload: Value) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn no_op_notifier_succeeds() {
        let notifier = NoOpNotifier;
        let result = notifier.notify("order_filled", json!({"id": "x"})).await;
        assert!(result.is_ok());
    }
}
