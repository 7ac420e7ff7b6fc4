//! Matching order updates to stored brackets.
//!
//! The parent order ID is the stable key in the store. A broker reports a
//! child leg with a reference to its parent when that leg activates, so the
//! parent reference is tried first; direct order-ID and client-order-ID
//! matches are fallbacks for messages that are about the parent itself.

use super::update::OrderUpdate;

/// Which field of the update matched a stored parent order ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Matched via the parent/originating order reference.
    ParentRef,
    /// Matched via the order's own ID.
    OrderId,
    /// Matched via the client-assigned order ID.
    ClientOrderId,
}

/// Whether a fill applies to the parent entry or a child exit leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillScope {
    /// The parent entry order filled: a position was opened.
    Parent,
    /// A child exit leg filled: the position was reduced or closed.
    Child,
}

/// A resolved match between an update and a stored bracket.
#[derive(Debug, Clone)]
pub struct BracketMatch {
    /// Parent order ID of the matched bracket.
    pub parent_order_id: String,
    /// Which field produced the match.
    pub kind: MatchKind,
}

/// Match an update against the known parent order IDs.
///
/// Priority: parent reference, then order ID, then client order ID. Returns
/// `None` when nothing matches, which is normal traffic for unrelated orders.
#[must_use]
pub fn match_update(update: &OrderUpdate, parent_ids: &[String]) -> Option<BracketMatch> {
    let candidates = [
        (update.parent_ref.as_deref(), MatchKind::ParentRef),
        (update.order_id.as_deref(), MatchKind::OrderId),
        (update.client_order_id.as_deref(), MatchKind::ClientOrderId),
    ];

    for (candidate, kind) in candidates {
        if let Some(candidate) = candidate
            && let Some(parent_id) = parent_ids.iter().find(|id| id.as_str() == candidate)
        {
            return Some(BracketMatch {
                parent_order_id: parent_id.clone(),
                kind,
            });
        }
    }

    None
}

/// Classify whether a fill is about the parent entry or a child leg.
///
/// The update is about the parent when its own order ID is the bracket's
/// parent order ID; anything matched only through a parent reference is a
/// child leg reporting in.
#[must_use]
pub fn fill_scope(update: &OrderUpdate, parent_order_id: &str) -> FillScope {
    if update.order_id.as_deref() == Some(parent_order_id)
        || update.client_order_id.as_deref() == Some(parent_order_id)
    {
        FillScope::Parent
    } else {
        FillScope::Child
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(parent_ref: Option<&str>, order_id: Option<&str>, client: Option<&str>) -> OrderUpdate {
        OrderUpdate {
            parent_ref: parent_ref.map(String::from),
            order_id: order_id.map(String::from),
            client_order_id: client.map(String::from),
            status: None,
            filled_qty: None,
            remaining_qty: None,
            avg_price: None,
            contract_id: None,
            raw: json!({}),
        }
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn parent_ref_wins_over_order_id() {
        // Both fields match *different* stored brackets; the parent
        // reference must win.
        let parents = ids(&["parent-a", "parent-b"]);
        let update = update(Some("parent-a"), Some("parent-b"), None);

        let matched = match_update(&update, &parents).unwrap();
        assert_eq!(matched.parent_order_id, "parent-a");
        assert_eq!(matched.kind, MatchKind::ParentRef);
    }

    #[test]
    fn order_id_fallback() {
        let parents = ids(&["parent-a"]);
        let update = update(Some("unknown"), Some("parent-a"), None);

        let matched = match_update(&update, &parents).unwrap();
        assert_eq!(matched.kind, MatchKind::OrderId);
    }

    #[test]
    fn client_order_id_fallback() {
        let parents = ids(&["parent-a"]);
        let update = update(None, Some("unknown"), Some("parent-a"));

        let matched = match_update(&update, &parents).unwrap();
        assert_eq!(matched.kind, MatchKind::ClientOrderId);
    }

    #[test]
    fn no_match_is_none() {
        let parents = ids(&["parent-a"]);
        let update = update(Some("x"), Some("y"), Some("z"));
        assert!(match_update(&update, &parents).is_none());
    }

    #[test]
    fn fill_scope_parent_when_own_id_matches() {
        let update = update(None, Some("parent-a"), None);
        assert_eq!(fill_scope(&update, "parent-a"), FillScope::Parent);
    }

    #[test]
    fn fill_scope_child_when_matched_via_parent_ref() {
        // Child leg activates: its own order ID differs from the parent.
        let update = update(Some("parent-a"), Some("child-7"), None);
        assert_eq!(fill_scope(&update, "parent-a"), FillScope::Child);
    }
}
