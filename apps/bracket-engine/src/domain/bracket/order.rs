//! Bracket order record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::status::BracketStatus;

/// Reference to a child exit leg at the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLeg {
    /// Broker order ID of the leg.
    pub order_id: String,
}

impl OrderLeg {
    /// Create a leg reference.
    #[must_use]
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
        }
    }
}

/// A parent entry order with its optional exit legs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketOrder {
    /// Ticker symbol the bracket trades.
    pub ticker: String,
    /// Parent order ID, globally unique across the store.
    pub parent_order_id: String,
    /// When the bracket was submitted.
    pub created_at: DateTime<Utc>,
    /// Current status.
    #[serde(default)]
    pub status: BracketStatus,
    /// Take-profit leg reference.
    #[serde(default)]
    pub limit_sell: Option<OrderLeg>,
    /// Protective-stop leg reference.
    #[serde(default)]
    pub stop_loss: Option<OrderLeg>,
    /// Per-order take-profit hint (may differ from ticker-level targets).
    #[serde(default)]
    pub target_price: Option<Decimal>,
    /// Per-order stop-loss hint.
    #[serde(default)]
    pub stop_loss_price: Option<Decimal>,
    /// Per-order free-runner override.
    #[serde(default)]
    pub free_runner: bool,
    /// Smallest price increment for protective limit offsets.
    #[serde(default)]
    pub minimum_variation: Decimal,
    /// Broker contract ID, recorded from observed fills or positions.
    #[serde(default)]
    pub contract_id: Option<i64>,
    /// Whether the protective stop was already moved to breakeven.
    #[serde(default)]
    pub breakeven_applied: bool,
    /// Replacement trailing-stop order ID, once activated.
    #[serde(default)]
    pub trailing_order_id: Option<String>,
    /// Last raw reconciliation/fill payload plus `updated_at`.
    #[serde(default)]
    pub last_update: Option<Map<String, Value>>,
}

impl BracketOrder {
    /// Create a new open bracket.
    #[must_use]
    pub fn new(ticker: impl Into<String>, parent_order_id: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            parent_order_id: parent_order_id.into(),
            created_at: Utc::now(),
            status: BracketStatus::Open,
            limit_sell: None,
            stop_loss: None,
            target_price: None,
            stop_loss_price: None,
            free_runner: false,
            minimum_variation: Decimal::ZERO,
            contract_id: None,
            breakeven_applied: false,
            trailing_order_id: None,
            last_update: None,
        }
    }

    /// Whether the bracket is still live.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Merge details into `last_update`, refreshing `updated_at`.
    ///
    /// Existing keys are overwritten by new values; keys absent from
    /// `details` are preserved so P&L figures and fill payloads accumulate.
    pub fn merge_last_update(&mut self, details: Map<String, Value>) {
        let map = self.last_update.get_or_insert_with(Map::new);
        for (key, value) in details {
            map.insert(key, value);
        }
        map.insert(
            "updated_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
    }

    /// Filled quantity recorded from the most recent fill payload, if any.
    #[must_use]
    pub fn filled_qty(&self) -> Option<Decimal> {
        self.last_update
            .as_ref()
            .and_then(|map| map.get("filled_qty"))
            .and_then(decimal_from_value)
    }

    /// Average fill price recorded from the most recent fill payload, if any.
    #[must_use]
    pub fn avg_price(&self) -> Option<Decimal> {
        self.last_update
            .as_ref()
            .and_then(|map| map.get("avg_price"))
            .and_then(decimal_from_value)
    }
}

/// Parse a decimal out of a JSON number or string.
fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn new_bracket_is_open() {
        let bracket = BracketOrder::new("AAPL", "parent-1");
        assert!(bracket.is_open());
        assert!(bracket.last_update.is_none());
        assert!(!bracket.breakeven_applied);
    }

    #[test]
    fn merge_last_update_accumulates() {
        let mut bracket = BracketOrder::new("AAPL", "parent-1");

        let mut first = Map::new();
        first.insert("filled_qty".to_string(), json!("100"));
        bracket.merge_last_update(first);

        let mut second = Map::new();
        second.insert("avg_price".to_string(), json!(1.25));
        bracket.merge_last_update(second);

        let map = bracket.last_update.as_ref().unwrap();
        assert_eq!(map.get("filled_qty"), Some(&json!("100")));
        assert_eq!(map.get("avg_price"), Some(&json!(1.25)));
        assert!(map.contains_key("updated_at"));
    }

    #[test]
    fn filled_qty_parses_numbers_and_strings() {
        let mut bracket = BracketOrder::new("AAPL", "parent-1");
        assert!(bracket.filled_qty().is_none());

        let mut details = Map::new();
        details.insert("filled_qty".to_string(), json!(42));
        bracket.merge_last_update(details);
        assert_eq!(bracket.filled_qty(), Some(dec!(42)));

        let mut details = Map::new();
        details.insert("filled_qty".to_string(), json!("17.5"));
        bracket.merge_last_update(details);
        assert_eq!(bracket.filled_qty(), Some(dec!(17.5)));
    }

    #[test]
    fn serde_round_trip_preserves_fields() {
        let mut bracket = BracketOrder::new("TSLA", "parent-9");
        bracket.stop_loss = Some(OrderLeg::new("stop-9"));
        bracket.limit_sell = Some(OrderLeg::new("limit-9"));
        bracket.minimum_variation = dec!(0.01);
        bracket.target_price = Some(dec!(250));
        bracket.free_runner = true;

        let json = serde_json::to_string(&bracket).unwrap();
        let restored: BracketOrder = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.parent_order_id, "parent-9");
        assert_eq!(restored.stop_loss, Some(OrderLeg::new("stop-9")));
        assert_eq!(restored.minimum_variation, dec!(0.01));
        assert_eq!(restored.target_price, Some(dec!(250)));
        assert!(restored.free_runner);
    }

    #[test]
    fn deserializes_without_newer_fields() {
        // Records written before the breakeven flag and contract ID existed.
        let json = json!({
            "ticker": "AAPL",
            "parent_order_id": "parent-1",
            "created_at": "2026-01-05T10:00:00Z",
            "status": "OPEN"
        });

        let bracket: BracketOrder = serde_json::from_value(json).unwrap();
        assert!(!bracket.breakeven_applied);
        assert!(bracket.contract_id.is_none());
        assert!(bracket.trailing_order_id.is_none());
    }
}
