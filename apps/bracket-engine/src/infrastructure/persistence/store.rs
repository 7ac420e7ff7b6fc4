//! File-backed bracket store.
//!
//! One JSON file maps ticker → [`TickerStrategy`] (with embedded orders).
//! All reads and writes are serialized under a single async mutex so the
//! three monitor loops never observe a torn record. Persistence is a
//! full-file rewrite on every mutation, fine at tens of brackets and
//! seconds-scale update rates.
//!
//! Failure semantics: a write failure is logged and the in-memory state
//! stays authoritative for the rest of the process lifetime; a malformed
//! file on load is replaced with an empty store. Older deployments wrote a
//! flat `parent_order_id → record` file, which is migrated into the grouped
//! shape on load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::domain::bracket::{BracketOrder, BracketStatus, StrategyFields, TickerStrategy};

/// In-memory store state, grouped by ticker.
#[derive(Debug, Default)]
struct StoreState {
    tickers: BTreeMap<String, TickerStrategy>,
}

impl StoreState {
    fn find_mut(&mut self, parent_order_id: &str) -> Option<&mut BracketOrder> {
        // Linear scan across all tickers; acceptable at tens of brackets.
        self.tickers
            .values_mut()
            .flat_map(|strategy| strategy.orders.iter_mut())
            .find(|order| order.parent_order_id == parent_order_id)
    }

    fn contains(&self, parent_order_id: &str) -> bool {
        self.tickers
            .values()
            .flat_map(|strategy| strategy.orders.iter())
            .any(|order| order.parent_order_id == parent_order_id)
    }
}

/// Persistent, lock-guarded store of trading brackets grouped by ticker.
pub struct BracketStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl BracketStore {
    /// Load the store from a file, or start empty.
    ///
    /// A missing file is normal on first run. A malformed file is replaced
    /// with an empty store rather than propagating a fatal error.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tickers = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => decode_file(&contents).unwrap_or_else(|| {
                warn!(path = %path.display(), "Malformed store file, starting empty");
                BTreeMap::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                error!(path = %path.display(), error = %err, "Failed to read store file, starting empty");
                BTreeMap::new()
            }
        };

        let order_count: usize = tickers.values().map(|s| s.orders.len()).sum();
        info!(
            path = %path.display(),
            tickers = tickers.len(),
            orders = order_count,
            "Bracket store loaded"
        );

        Self {
            path,
            state: Mutex::new(StoreState { tickers }),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merge strategy fields and append brackets for a ticker.
    ///
    /// Brackets whose `parent_order_id` is already present anywhere in the
    /// store are silently skipped. Returns the IDs actually added.
    pub async fn add_brackets(
        &self,
        ticker: &str,
        fields: &StrategyFields,
        brackets: Vec<BracketOrder>,
    ) -> Vec<String> {
        let mut state = self.state.lock().await;

        let mut added = Vec::new();
        let mut fresh = Vec::new();
        for bracket in brackets {
            if state.contains(&bracket.parent_order_id)
                || added.contains(&bracket.parent_order_id)
            {
                debug!(
                    parent_order_id = %bracket.parent_order_id,
                    "Duplicate bracket submission skipped"
                );
                continue;
            }
            added.push(bracket.parent_order_id.clone());
            fresh.push(bracket);
        }

        let strategy = state
            .tickers
            .entry(ticker.to_string())
            .or_insert_with(|| TickerStrategy::new(ticker));
        strategy.merge_fields(fields);
        strategy.orders.extend(fresh);

        self.persist(&state).await;
        added
    }

    /// Look up a bracket by parent order ID.
    pub async fn get_bracket(&self, parent_order_id: &str) -> Option<BracketOrder> {
        let state = self.state.lock().await;
        state
            .tickers
            .values()
            .flat_map(|strategy| strategy.orders.iter())
            .find(|order| order.parent_order_id == parent_order_id)
            .cloned()
    }

    /// All brackets, in ticker-then-insertion order.
    pub async fn list_brackets(&self) -> Vec<BracketOrder> {
        let state = self.state.lock().await;
        state
            .tickers
            .values()
            .flat_map(|strategy| strategy.orders.iter())
            .cloned()
            .collect()
    }

    /// All parent order IDs, in ticker-then-insertion order.
    pub async fn parent_order_ids(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .tickers
            .values()
            .flat_map(|strategy| strategy.orders.iter())
            .map(|order| order.parent_order_id.clone())
            .collect()
    }

    /// Snapshot of all ticker strategies.
    pub async fn ticker_strategies(&self) -> Vec<TickerStrategy> {
        let state = self.state.lock().await;
        state.tickers.values().cloned().collect()
    }

    /// Whether any bracket is still live.
    pub async fn has_open_brackets(&self) -> bool {
        let state = self.state.lock().await;
        state.tickers.values().any(TickerStrategy::has_open_orders)
    }

    /// Set a bracket's status and merge details into `last_update`.
    ///
    /// The status string is case-normalized. Returns whether a record was
    /// found. Monotonicity of the stream path is the caller's concern: REST
    /// reconciliation may legitimately overwrite a stale status.
    pub async fn update_status(
        &self,
        parent_order_id: &str,
        status: &str,
        details: Option<Map<String, Value>>,
    ) -> bool {
        let mut state = self.state.lock().await;
        let Some(order) = state.find_mut(parent_order_id) else {
            return false;
        };

        order.status = BracketStatus::normalize(status);
        order.merge_last_update(details.unwrap_or_default());

        debug!(
            parent_order_id = %parent_order_id,
            status = %order.status,
            "Bracket status updated"
        );

        self.persist(&state).await;
        true
    }

    /// Merge details into a bracket's `last_update` without touching status.
    pub async fn merge_last_update(
        &self,
        parent_order_id: &str,
        details: Map<String, Value>,
    ) -> bool {
        let mut state = self.state.lock().await;
        let Some(order) = state.find_mut(parent_order_id) else {
            return false;
        };
        order.merge_last_update(details);
        self.persist(&state).await;
        true
    }

    /// Mark that the protective stop was moved to breakeven.
    pub async fn mark_breakeven_applied(&self, parent_order_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(order) = state.find_mut(parent_order_id) else {
            return false;
        };
        order.breakeven_applied = true;
        self.persist(&state).await;
        true
    }

    /// Record a replacement trailing-stop order, clearing the exit legs.
    pub async fn record_trailing(&self, parent_order_id: &str, trailing_order_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(order) = state.find_mut(parent_order_id) else {
            return false;
        };
        order.limit_sell = None;
        order.stop_loss = None;
        order.trailing_order_id = Some(trailing_order_id.to_string());
        self.persist(&state).await;
        true
    }

    /// Record a learned broker contract ID. Never overwrites an existing one.
    pub async fn record_contract_id(&self, parent_order_id: &str, contract_id: i64) -> bool {
        let mut state = self.state.lock().await;
        let Some(order) = state.find_mut(parent_order_id) else {
            return false;
        };
        if order.contract_id.is_none() {
            order.contract_id = Some(contract_id);
            self.persist(&state).await;
        }
        true
    }

    /// Remove a bracket from its ticker's order list.
    pub async fn remove_bracket(&self, parent_order_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let mut removed = false;
        for strategy in state.tickers.values_mut() {
            let before = strategy.orders.len();
            strategy
                .orders
                .retain(|order| order.parent_order_id != parent_order_id);
            if strategy.orders.len() != before {
                removed = true;
                break;
            }
        }
        if removed {
            self.persist(&state).await;
        }
        removed
    }

    /// Rewrite the backing file. Failures are logged; in-memory state stays
    /// authoritative.
    async fn persist(&self, state: &StoreState) {
        let json = match serde_json::to_string_pretty(&state.tickers) {
            Ok(json) => json,
            Err(err) => {
                error!(error = %err, "Failed to serialize bracket store");
                return;
            }
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(err) = tokio::fs::create_dir_all(parent).await
        {
            error!(path = %parent.display(), error = %err, "Failed to create store directory");
            return;
        }

        if let Err(err) = tokio::fs::write(&self.path, json).await {
            error!(path = %self.path.display(), error = %err, "Failed to persist bracket store");
        }
    }
}

/// Decode the store file, migrating the legacy flat shape when found.
fn decode_file(contents: &str) -> Option<BTreeMap<String, TickerStrategy>> {
    let value: Value = serde_json::from_str(contents).ok()?;
    let map = value.as_object()?;

    // Legacy files mapped parent_order_id → bracket record directly. Those
    // records carry a parent_order_id field and no orders list.
    let is_legacy = map
        .values()
        .any(|v| v.get("parent_order_id").is_some() && v.get("orders").is_none());

    if is_legacy {
        let flat: BTreeMap<String, BracketOrder> = serde_json::from_value(value.clone()).ok()?;
        let mut tickers: BTreeMap<String, TickerStrategy> = BTreeMap::new();
        for (_, order) in flat {
            tickers
                .entry(order.ticker.clone())
                .or_insert_with(|| TickerStrategy::new(&order.ticker))
                .orders
                .push(order);
        }
        info!(tickers = tickers.len(), "Migrated legacy flat store file");
        return Some(tickers);
    }

    serde_json::from_value(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn fields() -> StrategyFields {
        StrategyFields {
            entry_price: Some(dec!(1.00)),
            free_runner: Some(true),
            price_targets: Some(vec![dec!(1.50), dec!(1.20)]),
            minimum_variation: Some(dec!(0.01)),
        }
    }

    fn store_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("brackets.json")
    }

    #[tokio::test]
    async fn add_and_get_bracket() {
        let dir = tempfile::tempdir().unwrap();
        let store = BracketStore::load(store_path(&dir)).await;

        let added = store
            .add_brackets("AAPL", &fields(), vec![BracketOrder::new("AAPL", "p-1")])
            .await;
        assert_eq!(added, vec!["p-1".to_string()]);

        let bracket = store.get_bracket("p-1").await.unwrap();
        assert_eq!(bracket.ticker, "AAPL");
        assert!(store.get_bracket("p-unknown").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_submission_stored_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = BracketStore::load(store_path(&dir)).await;

        let first = store
            .add_brackets("AAPL", &fields(), vec![BracketOrder::new("AAPL", "p-1")])
            .await;
        let second = store
            .add_brackets("AAPL", &fields(), vec![BracketOrder::new("AAPL", "p-1")])
            .await;

        assert_eq!(first, vec!["p-1".to_string()]);
        assert!(second.is_empty());
        assert_eq!(store.list_brackets().await.len(), 1);
    }

    #[tokio::test]
    async fn strategy_fields_merged_on_submission() {
        let dir = tempfile::tempdir().unwrap();
        let store = BracketStore::load(store_path(&dir)).await;

        store
            .add_brackets("AAPL", &fields(), vec![BracketOrder::new("AAPL", "p-1")])
            .await;

        let strategies = store.ticker_strategies().await;
        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0].entry_price, Some(dec!(1.00)));
        assert!(strategies[0].free_runner);
        assert_eq!(strategies[0].minimum_variation, dec!(0.01));
    }

    #[tokio::test]
    async fn round_trip_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir);

        {
            let store = BracketStore::load(&path).await;
            let mut bracket = BracketOrder::new("AAPL", "p-1");
            bracket.stop_loss = Some(crate::domain::bracket::OrderLeg::new("stop-1"));
            bracket.minimum_variation = dec!(0.01);
            store.add_brackets("AAPL", &fields(), vec![bracket]).await;
            store
                .add_brackets(
                    "TSLA",
                    &StrategyFields::default(),
                    vec![BracketOrder::new("TSLA", "p-2")],
                )
                .await;
        }

        // Simulated restart: reload from file.
        let store = BracketStore::load(&path).await;
        let brackets = store.list_brackets().await;
        let ids: Vec<_> = brackets.iter().map(|b| b.parent_order_id.clone()).collect();
        assert_eq!(ids, vec!["p-1".to_string(), "p-2".to_string()]);

        let restored = store.get_bracket("p-1").await.unwrap();
        assert_eq!(
            restored.stop_loss,
            Some(crate::domain::bracket::OrderLeg::new("stop-1"))
        );
        assert_eq!(restored.minimum_variation, dec!(0.01));
    }

    #[tokio::test]
    async fn update_status_merges_details() {
        let dir = tempfile::tempdir().unwrap();
        let store = BracketStore::load(store_path(&dir)).await;
        store
            .add_brackets("AAPL", &fields(), vec![BracketOrder::new("AAPL", "p-1")])
            .await;

        let mut details = Map::new();
        details.insert("filled_qty".to_string(), json!("100"));
        let found = store.update_status("p-1", "filled", Some(details)).await;
        assert!(found);

        let bracket = store.get_bracket("p-1").await.unwrap();
        assert_eq!(bracket.status, BracketStatus::Filled);
        let map = bracket.last_update.unwrap();
        assert_eq!(map.get("filled_qty"), Some(&json!("100")));
        assert!(map.contains_key("updated_at"));

        assert!(!store.update_status("p-unknown", "filled", None).await);
    }

    #[tokio::test]
    async fn remove_bracket_deletes_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = BracketStore::load(store_path(&dir)).await;
        store
            .add_brackets("AAPL", &fields(), vec![BracketOrder::new("AAPL", "p-1")])
            .await;

        assert!(store.remove_bracket("p-1").await);
        assert!(!store.remove_bracket("p-1").await);
        assert!(store.list_brackets().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir);
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = BracketStore::load(&path).await;
        assert!(store.list_brackets().await.is_empty());
    }

    #[tokio::test]
    async fn legacy_flat_file_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir);

        let legacy = json!({
            "p-1": {
                "ticker": "AAPL",
                "parent_order_id": "p-1",
                "created_at": "2026-01-05T10:00:00Z",
                "status": "OPEN"
            },
            "p-2": {
                "ticker": "AAPL",
                "parent_order_id": "p-2",
                "created_at": "2026-01-05T10:01:00Z",
                "status": "FILLED"
            }
        });
        tokio::fs::write(&path, legacy.to_string()).await.unwrap();

        let store = BracketStore::load(&path).await;
        let brackets = store.list_brackets().await;
        assert_eq!(brackets.len(), 2);
        assert!(brackets.iter().all(|b| b.ticker == "AAPL"));

        let strategies = store.ticker_strategies().await;
        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0].ticker, "AAPL");
    }

    #[tokio::test]
    async fn has_open_brackets_tracks_terminal_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let store = BracketStore::load(store_path(&dir)).await;
        store
            .add_brackets("AAPL", &fields(), vec![BracketOrder::new("AAPL", "p-1")])
            .await;

        assert!(store.has_open_brackets().await);
        store.update_status("p-1", "CANCELLED", None).await;
        assert!(!store.has_open_brackets().await);
    }

    #[tokio::test]
    async fn record_contract_id_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = BracketStore::load(store_path(&dir)).await;
        store
            .add_brackets("AAPL", &fields(), vec![BracketOrder::new("AAPL", "p-1")])
            .await;

        store.record_contract_id("p-1", 265_598).await;
        store.record_contract_id("p-1", 999).await;

        let bracket = store.get_bracket("p-1").await.unwrap();
        assert_eq!(bracket.contract_id, Some(265_598));
    }

    #[tokio::test]
    async fn record_trailing_clears_legs() {
        let dir = tempfile::tempdir().unwrap();
        let store = BracketStore::load(store_path(&dir)).await;

        let mut bracket = BracketOrder::new("AAPL", "p-1");
        bracket.limit_sell = Some(crate::domain::bracket::OrderLeg::new("limit-1"));
        bracket.stop_loss = Some(crate::domain::bracket::OrderLeg::new("stop-1"));
        store.add_brackets("AAPL", &fields(), vec![bracket]).await;

        store.record_trailing("p-1", "trail-1").await;

        let bracket = store.get_bracket("p-1").await.unwrap();
        assert!(bracket.limit_sell.is_none());
        assert!(bracket.stop_loss.is_none());
        assert_eq!(bracket.trailing_order_id, Some("trail-1".to_string()));
    }
}
