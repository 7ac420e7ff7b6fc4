//! Positions Port (Driven Port)
//!
//! Interface for the broker's position listing, the source of share
//! quantities and average costs for P&L computation.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A position held at the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInfo {
    /// Broker contract ID.
    pub contract_id: i64,
    /// Ticker symbol.
    pub symbol: String,
    /// Signed position size.
    pub quantity: Decimal,
    /// Average cost per share.
    pub avg_cost: Decimal,
    /// Last price reported with the position, when available.
    pub last_price: Option<Decimal>,
}

/// Positions port error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PositionsError {
    /// Connection error.
    #[error("positions connection error: {message}")]
    ConnectionError {
        /// Error details.
        message: String,
    },
}

/// Port for position listings.
#[async_trait]
pub trait PositionsPort: Send + Sync {
    /// List all currently held positions.
    async fn list_positions(&self) -> Result<Vec<PositionInfo>, PositionsError>;
}
