//! Broker payload normalization.
//!
//! Order-update messages arrive from the stream and from REST listings in
//! several shapes: field names vary by endpoint, numbers arrive as strings,
//! and payloads may be wrapped one level deep in `{"data": ...}` or
//! `{"data": [...]}`. This module flattens all of that into one fixed
//! [`OrderUpdate`] schema. The alias lists are plain data so they can be
//! extended and tested independently of the matching logic.

use rust_decimal::Decimal;
use serde_json::Value;

/// Field spellings for the parent/originating order reference.
const PARENT_REF_FIELDS: &[&str] = &[
    "parent_id",
    "parentId",
    "parent_order_id",
    "parentOrderId",
    "orig_order_id",
    "origOrderId",
];

/// Field spellings for the order's own ID.
const ORDER_ID_FIELDS: &[&str] = &["order_id", "orderId", "id"];

/// Field spellings for the client-assigned order ID.
const CLIENT_ORDER_ID_FIELDS: &[&str] = &["client_order_id", "clientOrderId", "c_oid", "cOID"];

/// Field spellings for the order status.
const STATUS_FIELDS: &[&str] = &["status", "order_status", "orderStatus"];

/// Field spellings for the filled quantity.
const FILLED_QTY_FIELDS: &[&str] = &["filled_qty", "filledQuantity", "filled", "cum_qty", "cumQty"];

/// Field spellings for the remaining quantity.
const REMAINING_QTY_FIELDS: &[&str] = &["remaining_qty", "remainingQuantity", "remaining"];

/// Field spellings for the average fill price.
const AVG_PRICE_FIELDS: &[&str] = &[
    "avg_price",
    "avgPrice",
    "avg_fill_price",
    "avgFillPrice",
    "average_price",
];

/// Field spellings for the broker contract ID.
const CONTRACT_ID_FIELDS: &[&str] = &["conid", "conidex", "contract_id", "contractId"];

/// A broker order update flattened into a fixed schema.
#[derive(Debug, Clone)]
pub struct OrderUpdate {
    /// Parent/originating order reference, if the message is about a child leg.
    pub parent_ref: Option<String>,
    /// The order's own ID.
    pub order_id: Option<String>,
    /// Client-assigned order ID.
    pub client_order_id: Option<String>,
    /// Reported status, as-is.
    pub status: Option<String>,
    /// Filled quantity.
    pub filled_qty: Option<Decimal>,
    /// Remaining quantity.
    pub remaining_qty: Option<Decimal>,
    /// Average fill price.
    pub avg_price: Option<Decimal>,
    /// Broker contract ID.
    pub contract_id: Option<i64>,
    /// The original payload, kept for forensics and `last_update`.
    pub raw: Value,
}

impl OrderUpdate {
    /// Whether this update reports a completed fill.
    ///
    /// True when the status contains `FILLED` (case-insensitive), or when a
    /// positive filled quantity is reported with no remainder.
    #[must_use]
    pub fn indicates_fill(&self) -> bool {
        if let Some(status) = &self.status
            && status.to_uppercase().contains("FILLED")
        {
            return true;
        }

        match (self.filled_qty, self.remaining_qty) {
            (Some(filled), None) => filled > Decimal::ZERO,
            (Some(filled), Some(remaining)) => {
                filled > Decimal::ZERO && remaining == Decimal::ZERO
            }
            _ => false,
        }
    }
}

/// Normalize a raw stream/REST message into zero or more order updates.
///
/// Unwraps one level of `{"data": ...}` and `{"data": [...]}`; top-level
/// arrays are handled element by element. Non-object elements are skipped.
#[must_use]
pub fn normalize_message(message: &Value) -> Vec<OrderUpdate> {
    let unwrapped = match message {
        Value::Object(map) => map.get("data").unwrap_or(message),
        _ => message,
    };

    match unwrapped {
        Value::Array(items) => items.iter().filter_map(parse_object).collect(),
        Value::Object(_) => parse_object(unwrapped).into_iter().collect(),
        _ => Vec::new(),
    }
}

/// Parse a single JSON object into an [`OrderUpdate`].
fn parse_object(value: &Value) -> Option<OrderUpdate> {
    let obj = value.as_object()?;

    Some(OrderUpdate {
        parent_ref: string_field(obj, PARENT_REF_FIELDS),
        order_id: string_field(obj, ORDER_ID_FIELDS),
        client_order_id: string_field(obj, CLIENT_ORDER_ID_FIELDS),
        status: string_field(obj, STATUS_FIELDS),
        filled_qty: decimal_field(obj, FILLED_QTY_FIELDS),
        remaining_qty: decimal_field(obj, REMAINING_QTY_FIELDS),
        avg_price: decimal_field(obj, AVG_PRICE_FIELDS),
        contract_id: i64_field(obj, CONTRACT_ID_FIELDS),
        raw: value.clone(),
    })
}

/// First matching alias rendered as a string (IDs may arrive numeric).
fn string_field(obj: &serde_json::Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// First matching alias parsed as a decimal (number or numeric string).
fn decimal_field(obj: &serde_json::Map<String, Value>, aliases: &[&str]) -> Option<Decimal> {
    aliases.iter().find_map(|key| match obj.get(*key) {
        Some(Value::Number(n)) => n.to_string().parse().ok(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// First matching alias parsed as an integer (number or numeric string).
fn i64_field(obj: &serde_json::Map<String, Value>, aliases: &[&str]) -> Option<i64> {
    aliases.iter().find_map(|key| match obj.get(*key) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn parses_flat_object() {
        let updates = normalize_message(&json!({
            "orderId": 1001,
            "parentId": "900",
            "status": "Submitted",
            "filledQuantity": "0",
            "remainingQuantity": "100",
            "conid": 265598
        }));

        assert_eq!(updates.len(), 1);
        let update = &updates[0];
        assert_eq!(update.order_id.as_deref(), Some("1001"));
        assert_eq!(update.parent_ref.as_deref(), Some("900"));
        assert_eq!(update.status.as_deref(), Some("Submitted"));
        assert_eq!(update.filled_qty, Some(dec!(0)));
        assert_eq!(update.remaining_qty, Some(dec!(100)));
        assert_eq!(update.contract_id, Some(265_598));
    }

    #[test]
    fn unwraps_data_object() {
        let updates = normalize_message(&json!({"data": {"order_id": "7", "status": "FILLED"}}));
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].order_id.as_deref(), Some("7"));
    }

    #[test]
    fn unwraps_data_array() {
        let updates = normalize_message(&json!({
            "data": [
                {"order_id": "1"},
                {"order_id": "2"},
                "noise"
            ]
        }));
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].order_id.as_deref(), Some("1"));
        assert_eq!(updates[1].order_id.as_deref(), Some("2"));
    }

    #[test]
    fn scalar_message_is_empty() {
        assert!(normalize_message(&json!("ping")).is_empty());
        assert!(normalize_message(&json!(42)).is_empty());
    }

    #[test_case(json!({"status": "Filled"}), true; "status filled")]
    #[test_case(json!({"status": "PartiallyFilled"}), true; "status contains filled")]
    #[test_case(json!({"status": "Submitted"}), false; "status open")]
    #[test_case(json!({"filled_qty": 100}), true; "filled qty no remainder field")]
    #[test_case(json!({"filled_qty": 100, "remaining_qty": 0}), true; "filled qty zero remainder")]
    #[test_case(json!({"filled_qty": 100, "remaining_qty": 50}), false; "partial remainder")]
    #[test_case(json!({"filled_qty": 0}), false; "nothing filled")]
    fn fill_decision(payload: Value, expected: bool) {
        let updates = normalize_message(&payload);
        assert_eq!(updates[0].indicates_fill(), expected);
    }

    #[test]
    fn raw_payload_preserved() {
        let payload = json!({"orderId": "5", "status": "Filled", "extra": {"venue": "SMART"}});
        let updates = normalize_message(&payload);
        assert_eq!(updates[0].raw, payload);
    }

    #[test]
    fn numeric_strings_parse_as_decimals() {
        let updates = normalize_message(&json!({
            "order_id": "5",
            "avgPrice": "1.2345",
            "cumQty": "250"
        }));
        assert_eq!(updates[0].avg_price, Some(dec!(1.2345)));
        assert_eq!(updates[0].filled_qty, Some(dec!(250)));
    }
}
