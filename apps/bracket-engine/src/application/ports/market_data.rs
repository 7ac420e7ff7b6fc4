//! Market Data Port (Driven Port)
//!
//! Interface for last-price lookups (price-target monitoring) and per-contract
//! tick subscriptions (P&L tracking). Ticks are multiplexed over one shared
//! connection keyed by contract ID.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A market-data tick for a subscribed contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketTick {
    /// Last trade price.
    pub last: Decimal,
    /// Bid price, when reported.
    pub bid: Option<Decimal>,
    /// Ask price, when reported.
    pub ask: Option<Decimal>,
}

impl MarketTick {
    /// A tick carrying only a last price.
    #[must_use]
    pub const fn last_only(last: Decimal) -> Self {
        Self {
            last,
            bid: None,
            ask: None,
        }
    }
}

/// Market data error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MarketDataError {
    /// Connection error.
    #[error("market data connection error: {message}")]
    ConnectionError {
        /// Error details.
        message: String,
    },

    /// No data available for the requested instrument.
    #[error("market data unavailable for {instrument}")]
    Unavailable {
        /// The requested ticker or contract.
        instrument: String,
    },
}

/// Port for market data.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Current last price for a ticker, or `None` when not quoted.
    async fn last_price(&self, ticker: &str) -> Result<Option<Decimal>, MarketDataError>;

    /// Subscribe to ticks for a contract. Must be idempotent.
    async fn subscribe_market_data(&self, contract_id: i64) -> Result<(), MarketDataError>;

    /// Unsubscribe from ticks for a contract.
    async fn unsubscribe_market_data(&self, contract_id: i64) -> Result<(), MarketDataError>;

    /// Drain all pending ticks, keyed by contract ID.
    async fn poll_market_data(&self) -> HashMap<i64, MarketTick>;
}
