//! Fill Watcher
//!
//! Consumes the broker order-update stream while any bracket is open,
//! matches messages to stored brackets, marks fills, and reconciles against
//! REST order listings to catch updates the stream missed. The subscription
//! state machine is `UNSUBSCRIBED → SUBSCRIBED → UNSUBSCRIBED`, driven by
//! whether any bracket is currently non-terminal.

use std::collections::{HashMap, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::application::ports::{
    BrokerPort, NotifierPort, ORDER_UPDATES_CHANNEL, OrderStreamPort,
};
use crate::domain::bracket::BracketStatus;
use crate::domain::matching::{FillScope, fill_scope, match_update};
use crate::domain::update::{OrderUpdate, normalize_message};
use crate::infrastructure::persistence::BracketStore;

use super::supervisor::{Monitor, Pace};

/// Fill watcher configuration.
#[derive(Debug, Clone)]
pub struct FillWatcherConfig {
    /// How long a fill notification suppresses duplicates for the same
    /// bracket and payload.
    pub dedupe_window: Duration,
    /// How many drained stream messages to keep as the reconciliation
    /// fallback snapshot.
    pub snapshot_capacity: usize,
}

impl Default for FillWatcherConfig {
    fn default() -> Self {
        Self {
            dedupe_window: Duration::from_secs(300),
            snapshot_capacity: 256,
        }
    }
}

/// Counts from one reconciliation pass, for diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileReport {
    /// Updates examined.
    pub examined: usize,
    /// Brackets updated.
    pub updated: usize,
}

/// Time-windowed duplicate-notification suppression.
///
/// Owned by the watcher, pruned every cycle. Keyed by bracket plus payload
/// hash so a re-delivered FILLED message does not notify twice while a
/// genuinely new payload still does.
#[derive(Debug)]
struct NotificationDedupe {
    window: Duration,
    seen: HashMap<(String, u64), Instant>,
}

impl NotificationDedupe {
    fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Record a notification; returns false when it was already sent within
    /// the window.
    fn insert(&mut self, parent_order_id: &str, payload_hash: u64) -> bool {
        let key = (parent_order_id.to_string(), payload_hash);
        let now = Instant::now();
        match self.seen.get(&key) {
            Some(at) if now.duration_since(*at) < self.window => false,
            _ => {
                self.seen.insert(key, now);
                true
            }
        }
    }

    fn prune(&mut self) {
        let window = self.window;
        let now = Instant::now();
        self.seen.retain(|_, at| now.duration_since(*at) < window);
    }
}

/// Watches the order-update stream and keeps the store in sync with fills.
pub struct FillWatcher<S, B, N>
where
    S: OrderStreamPort,
    B: BrokerPort,
    N: NotifierPort,
{
    store: Arc<BracketStore>,
    stream: Arc<S>,
    broker: Arc<B>,
    notifier: Arc<N>,
    config: FillWatcherConfig,
    subscribed: bool,
    snapshot: VecDeque<Value>,
    dedupe: NotificationDedupe,
}

impl<S, B, N> FillWatcher<S, B, N>
where
    S: OrderStreamPort,
    B: BrokerPort,
    N: NotifierPort,
{
    /// Create a fill watcher with default configuration.
    #[must_use]
    pub fn new(store: Arc<BracketStore>, stream: Arc<S>, broker: Arc<B>, notifier: Arc<N>) -> Self {
        Self::with_config(store, stream, broker, notifier, FillWatcherConfig::default())
    }

    /// Create a fill watcher with custom configuration.
    #[must_use]
    pub fn with_config(
        store: Arc<BracketStore>,
        stream: Arc<S>,
        broker: Arc<B>,
        notifier: Arc<N>,
        config: FillWatcherConfig,
    ) -> Self {
        let dedupe = NotificationDedupe::new(config.dedupe_window);
        Self {
            store,
            stream,
            broker,
            notifier,
            config,
            subscribed: false,
            snapshot: VecDeque::new(),
            dedupe,
        }
    }

    /// Whether the watcher currently holds a stream subscription.
    #[must_use]
    pub const fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Run one watcher iteration.
    pub async fn run_once(&mut self) -> anyhow::Result<Pace> {
        let has_open = self.store.has_open_brackets().await;

        if !has_open {
            if self.subscribed {
                if let Err(err) = self.stream.unsubscribe(ORDER_UPDATES_CHANNEL).await {
                    warn!(error = %err, "Failed to unsubscribe from order stream");
                }
                self.subscribed = false;
                info!("No open brackets, unsubscribed from order stream");
            }
            return Ok(Pace::Idle);
        }

        // Readiness probe: a dead stream flips us back to unsubscribed so
        // the next branch re-subscribes and reconciles.
        if self.subscribed && !self.stream.is_ready().await {
            warn!("Order stream no longer ready, dropping subscription state");
            self.subscribed = false;
        }

        if !self.subscribed {
            self.stream
                .subscribe(ORDER_UPDATES_CHANNEL)
                .await
                .map_err(|err| anyhow::anyhow!("order stream subscribe failed: {err}"))?;
            self.subscribed = true;
            info!("Subscribed to order stream");

            // Catch anything missed while unsubscribed.
            let report = self.reconcile().await;
            info!(
                examined = report.examined,
                updated = report.updated,
                "Reconciled after subscribing"
            );
        }

        let messages = self.stream.poll_messages().await;
        for message in messages {
            self.remember(message.clone());
            let updates = normalize_message(&message);
            if updates.is_empty() {
                debug!(payload = %message, "Skipping unparseable stream message");
                continue;
            }
            for update in updates {
                self.apply_update(&update, false).await;
            }
        }

        self.dedupe.prune();
        Ok(Pace::Active)
    }

    /// Reconcile stored brackets against a REST order listing.
    ///
    /// Falls back to the cached stream snapshot when the listing is
    /// unavailable. Only terminal remote statuses are acted on, so a coarse
    /// REST status never overwrites a richer stream-derived one.
    pub async fn reconcile(&mut self) -> ReconcileReport {
        let entries = match self.broker.list_orders().await {
            Ok(orders) => orders,
            Err(err) => {
                warn!(
                    error = %err,
                    "REST order listing failed, reconciling from cached stream snapshot"
                );
                self.snapshot.iter().cloned().collect()
            }
        };

        let mut report = ReconcileReport::default();
        for entry in entries {
            for update in normalize_message(&entry) {
                report.examined += 1;

                // Act only on FILLED/CANCELLED/CLOSED remote statuses.
                let terminal = update
                    .status
                    .as_deref()
                    .is_some_and(|s| BracketStatus::normalize(s).is_terminal());
                if !terminal {
                    continue;
                }

                if self.apply_update(&update, true).await {
                    report.updated += 1;
                }
            }
        }

        report
    }

    /// Apply one normalized update to the store. Returns whether a bracket
    /// was updated.
    async fn apply_update(&mut self, update: &OrderUpdate, authoritative: bool) -> bool {
        let parent_ids = self.store.parent_order_ids().await;
        let Some(matched) = match_update(update, &parent_ids) else {
            // Normal traffic for unrelated orders.
            debug!(
                order_id = ?update.order_id,
                parent_ref = ?update.parent_ref,
                "Order update matches no stored bracket"
            );
            return false;
        };

        let parent_order_id = matched.parent_order_id.clone();
        let Some(bracket) = self.store.get_bracket(&parent_order_id).await else {
            return false;
        };

        if let Some(contract_id) = update.contract_id {
            self.store
                .record_contract_id(&parent_order_id, contract_id)
                .await;
        }

        if update.indicates_fill() {
            let mut details = Map::new();
            if let Some(filled_qty) = update.filled_qty {
                details.insert("filled_qty".to_string(), json!(filled_qty));
            }
            if let Some(avg_price) = update.avg_price {
                details.insert("avg_price".to_string(), json!(avg_price));
            }
            details.insert("raw_message".to_string(), update.raw.clone());

            self.store
                .update_status(&parent_order_id, "FILLED", Some(details))
                .await;

            self.emit_fill_notification(update, &parent_order_id, &bracket.ticker)
                .await;
            return true;
        }

        if let Some(status) = &update.status {
            // The stream path never resurrects a terminal bracket; REST
            // reconciliation is allowed to overwrite a stale status.
            if !authoritative && bracket.status.is_terminal() {
                debug!(
                    parent_order_id = %parent_order_id,
                    current = %bracket.status,
                    reported = %status,
                    "Ignoring stream status for terminal bracket"
                );
                return false;
            }

            let mut details = Map::new();
            details.insert("raw_message".to_string(), update.raw.clone());
            self.store
                .update_status(&parent_order_id, status, Some(details))
                .await;
            return true;
        }

        false
    }

    /// Emit a fill notification, suppressing duplicates within the window.
    async fn emit_fill_notification(
        &mut self,
        update: &OrderUpdate,
        parent_order_id: &str,
        ticker: &str,
    ) {
        let payload_hash = hash_value(&update.raw);
        if !self.dedupe.insert(parent_order_id, payload_hash) {
            debug!(
                parent_order_id = %parent_order_id,
                "Duplicate fill payload, notification suppressed"
            );
            return;
        }

        let event = match fill_scope(update, parent_order_id) {
            FillScope::Parent => "parent_filled",
            FillScope::Child => "child_filled",
        };
        let payload = json!({
            "parent_order_id": parent_order_id,
            "ticker": ticker,
            "filled_qty": update.filled_qty,
            "avg_price": update.avg_price,
        });

        if let Err(err) = self.notifier.notify(event, payload).await {
            warn!(error = %err, event = event, "Fill notification failed");
        }
    }

    /// Keep a bounded cache of raw messages as the reconciliation fallback.
    fn remember(&mut self, message: Value) {
        self.snapshot.push_back(message);
        while self.snapshot.len() > self.config.snapshot_capacity {
            self.snapshot.pop_front();
        }
    }
}

#[async_trait]
impl<S, B, N> Monitor for FillWatcher<S, B, N>
where
    S: OrderStreamPort + 'static,
    B: BrokerPort + 'static,
    N: NotifierPort + 'static,
{
    fn name(&self) -> &'static str {
        "fill-watcher"
    }

    async fn tick(&mut self) -> anyhow::Result<Pace> {
        self.run_once().await
    }

    async fn shutdown(&mut self) {
        if self.subscribed {
            if let Err(err) = self.stream.unsubscribe(ORDER_UPDATES_CHANNEL).await {
                warn!(error = %err, "Failed to release stream subscription on shutdown");
            }
            self.subscribed = false;
        }
    }
}

/// Stable hash of a JSON payload for duplicate detection.
fn hash_value(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.to_string().hash(&mut hasher);
    hasher.finish()
}
