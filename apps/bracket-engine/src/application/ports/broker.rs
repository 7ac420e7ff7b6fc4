//! Broker REST Port (Driven Port)
//!
//! Interface for the brokerage REST API: order listings for reconciliation
//! and the protective-order adjustments the price-target monitor performs.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Price changes to apply to an existing order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderModify {
    /// New stop price.
    pub stop_price: Option<Decimal>,
    /// New limit price.
    pub limit_price: Option<Decimal>,
}

impl OrderModify {
    /// Modify both stop and limit prices.
    #[must_use]
    pub const fn stop_and_limit(stop_price: Decimal, limit_price: Decimal) -> Self {
        Self {
            stop_price: Some(stop_price),
            limit_price: Some(limit_price),
        }
    }
}

/// Acknowledgment from the broker for a newly placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerAck {
    /// Broker-assigned order ID.
    pub order_id: String,
}

/// Broker port error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// Connection error.
    #[error("broker connection error: {message}")]
    ConnectionError {
        /// Error details.
        message: String,
    },

    /// Request rejected by the broker.
    #[error("broker rejected request: {reason}")]
    Rejected {
        /// Rejection reason.
        reason: String,
    },

    /// Order not found.
    #[error("order not found: {order_id}")]
    OrderNotFound {
        /// The missing order ID.
        order_id: String,
    },

    /// Rate limited.
    #[error("rate limited by broker")]
    RateLimited,

    /// Unknown error.
    #[error("broker error: {message}")]
    Unknown {
        /// Error details.
        message: String,
    },
}

/// Port for broker REST interactions.
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// List current orders as raw payloads, for reconciliation.
    async fn list_orders(&self) -> Result<Vec<Value>, BrokerError>;

    /// Modify prices on an existing order.
    async fn modify_order(&self, order_id: &str, modify: OrderModify) -> Result<(), BrokerError>;

    /// Cancel an order.
    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError>;

    /// Place a trailing-stop order for a contract.
    async fn place_trailing_stop(
        &self,
        contract_id: i64,
        quantity: Decimal,
        trail_amount: Decimal,
    ) -> Result<BrokerAck, BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn stop_and_limit_sets_both_prices() {
        let modify = OrderModify::stop_and_limit(dec!(1.00), dec!(0.99));
        assert_eq!(modify.stop_price, Some(dec!(1.00)));
        assert_eq!(modify.limit_price, Some(dec!(0.99)));
    }

    #[test]
    fn error_display() {
        let err = BrokerError::Rejected {
            reason: "margin".to_string(),
        };
        assert!(err.to_string().contains("margin"));
    }
}
