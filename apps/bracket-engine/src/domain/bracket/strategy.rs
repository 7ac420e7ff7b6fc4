//! Per-ticker strategy plan.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::BracketOrder;

/// Ticker-level strategy fields submitted alongside brackets.
///
/// Every field is optional; present fields overwrite the stored strategy on
/// merge, absent fields leave it untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyFields {
    /// Reference price for breakeven calculations.
    pub entry_price: Option<Decimal>,
    /// Whether the last target converts the remaining leg to a trailing stop.
    pub free_runner: Option<bool>,
    /// Price targets; may arrive unsorted.
    pub price_targets: Option<Vec<Decimal>>,
    /// Smallest price increment for protective limit offsets.
    pub minimum_variation: Option<Decimal>,
}

/// One strategy per ticker symbol, holding its bracket orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerStrategy {
    /// Ticker symbol (unique key).
    pub ticker: String,
    /// Smallest price increment for protective limit offsets.
    #[serde(default)]
    pub minimum_variation: Decimal,
    /// Reference price for breakeven calculations.
    #[serde(default)]
    pub entry_price: Option<Decimal>,
    /// Whether the last target converts the remaining leg to a trailing stop.
    #[serde(default)]
    pub free_runner: bool,
    /// Price targets; may be unsorted on input.
    #[serde(default)]
    pub price_targets: Vec<Decimal>,
    /// Bracket orders in insertion order.
    #[serde(default)]
    pub orders: Vec<BracketOrder>,
}

impl TickerStrategy {
    /// Create an empty strategy for a ticker.
    #[must_use]
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            minimum_variation: Decimal::ZERO,
            entry_price: None,
            free_runner: false,
            price_targets: Vec::new(),
            orders: Vec::new(),
        }
    }

    /// Merge submitted strategy fields into this strategy.
    pub fn merge_fields(&mut self, fields: &StrategyFields) {
        if let Some(entry_price) = fields.entry_price {
            self.entry_price = Some(entry_price);
        }
        if let Some(free_runner) = fields.free_runner {
            self.free_runner = free_runner;
        }
        if let Some(targets) = &fields.price_targets {
            self.price_targets = targets.clone();
        }
        if let Some(minimum_variation) = fields.minimum_variation {
            self.minimum_variation = minimum_variation;
        }
    }

    /// Price targets sorted ascending.
    #[must_use]
    pub fn sorted_targets(&self) -> Vec<Decimal> {
        let mut targets = self.price_targets.clone();
        targets.sort_unstable();
        targets
    }

    /// Whether any bracket on this ticker is still live.
    #[must_use]
    pub fn has_open_orders(&self) -> bool {
        self.orders.iter().any(BracketOrder::is_open)
    }
}
