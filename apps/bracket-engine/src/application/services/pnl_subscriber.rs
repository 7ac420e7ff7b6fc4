//! Position P&L Subscriber
//!
//! Subscribes to market-data ticks only for contracts actually held by
//! filled brackets, computes realized-against-cost P&L per tick, persists
//! the figures into the bracket's `last_update`, and republishes them on a
//! pub-sub topic keyed by parent order ID for live listeners.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Map, json};
use tracing::{debug, info, warn};

use crate::application::ports::{
    EventBusPort, MarketDataPort, PositionInfo, PositionsPort,
};
use crate::domain::bracket::{BracketOrder, BracketStatus};
use crate::infrastructure::persistence::BracketStore;

use super::supervisor::{Monitor, Pace};

/// P&L subscriber configuration.
#[derive(Debug, Clone)]
pub struct PnlSubscriberConfig {
    /// Contract multiplier applied to P&L (1 for equities).
    pub multiplier: Decimal,
}

impl Default for PnlSubscriberConfig {
    fn default() -> Self {
        Self { multiplier: dec!(1) }
    }
}

/// Manages per-contract market-data subscriptions and P&L publication.
pub struct PnlSubscriber<M, P, E>
where
    M: MarketDataPort,
    P: PositionsPort,
    E: EventBusPort,
{
    store: Arc<BracketStore>,
    market_data: Arc<M>,
    positions: Arc<P>,
    event_bus: Arc<E>,
    config: PnlSubscriberConfig,
    subscribed: HashSet<i64>,
    position_cache: HashMap<i64, PositionInfo>,
}

impl<M, P, E> PnlSubscriber<M, P, E>
where
    M: MarketDataPort,
    P: PositionsPort,
    E: EventBusPort,
{
    /// Create a P&L subscriber with default configuration.
    #[must_use]
    pub fn new(
        store: Arc<BracketStore>,
        market_data: Arc<M>,
        positions: Arc<P>,
        event_bus: Arc<E>,
    ) -> Self {
        Self::with_config(
            store,
            market_data,
            positions,
            event_bus,
            PnlSubscriberConfig::default(),
        )
    }

    /// Create a P&L subscriber with custom configuration.
    #[must_use]
    pub fn with_config(
        store: Arc<BracketStore>,
        market_data: Arc<M>,
        positions: Arc<P>,
        event_bus: Arc<E>,
        config: PnlSubscriberConfig,
    ) -> Self {
        Self {
            store,
            market_data,
            positions,
            event_bus,
            config,
            subscribed: HashSet::new(),
            position_cache: HashMap::new(),
        }
    }

    /// Currently subscribed contract IDs.
    #[must_use]
    pub fn subscribed_contracts(&self) -> &HashSet<i64> {
        &self.subscribed
    }

    /// Run one subscriber iteration.
    pub async fn run_once(&mut self) -> anyhow::Result<Pace> {
        let filled: Vec<BracketOrder> = self
            .store
            .list_brackets()
            .await
            .into_iter()
            .filter(|bracket| bracket.status == BracketStatus::Filled)
            .collect();

        // Learn contract IDs for filled brackets that never reported one,
        // by symbol match against the position listing.
        if filled.iter().any(|b| b.contract_id.is_none()) {
            self.refresh_positions().await;
            for bracket in filled.iter().filter(|b| b.contract_id.is_none()) {
                if let Some(position) = self
                    .position_cache
                    .values()
                    .find(|p| p.symbol == bracket.ticker)
                {
                    self.store
                        .record_contract_id(&bracket.parent_order_id, position.contract_id)
                        .await;
                    info!(
                        parent_order_id = %bracket.parent_order_id,
                        contract_id = position.contract_id,
                        "Learned contract ID from position listing"
                    );
                }
            }
        }

        // Contract → parent order mapping for this cycle.
        let wanted: HashMap<i64, String> = self
            .store
            .list_brackets()
            .await
            .into_iter()
            .filter(|b| b.status == BracketStatus::Filled)
            .filter_map(|b| b.contract_id.map(|id| (id, b.parent_order_id)))
            .collect();

        self.sync_subscriptions(&wanted).await;

        if wanted.is_empty() {
            return Ok(Pace::Idle);
        }

        let ticks = self.market_data.poll_market_data().await;
        for (contract_id, tick) in ticks {
            if !self.subscribed.contains(&contract_id) {
                continue;
            }
            let Some(parent_order_id) = wanted.get(&contract_id) else {
                continue;
            };
            self.publish_pnl(contract_id, parent_order_id, tick.last)
                .await;
        }

        Ok(Pace::Active)
    }

    /// Diff wanted contracts against current subscriptions.
    async fn sync_subscriptions(&mut self, wanted: &HashMap<i64, String>) {
        let unwanted: Vec<i64> = self
            .subscribed
            .iter()
            .filter(|id| !wanted.contains_key(id))
            .copied()
            .collect();
        for contract_id in unwanted {
            if let Err(err) = self.market_data.unsubscribe_market_data(contract_id).await {
                warn!(contract_id, error = %err, "Market data unsubscribe failed");
            }
            self.subscribed.remove(&contract_id);
            debug!(contract_id, "Unsubscribed market data");
        }

        let missing: Vec<i64> = wanted
            .keys()
            .filter(|id| !self.subscribed.contains(id))
            .copied()
            .collect();
        if missing.is_empty() {
            return;
        }

        // New contracts need cost basis for P&L.
        self.refresh_positions().await;
        for contract_id in missing {
            match self.market_data.subscribe_market_data(contract_id).await {
                Ok(()) => {
                    self.subscribed.insert(contract_id);
                    info!(contract_id, "Subscribed market data for filled position");
                }
                Err(err) => {
                    warn!(contract_id, error = %err, "Market data subscribe failed");
                }
            }
        }
    }

    /// Compute P&L from a tick, persist it, and publish it.
    async fn publish_pnl(&self, contract_id: i64, parent_order_id: &str, last_price: Decimal) {
        let Some(position) = self.position_cache.get(&contract_id) else {
            // No cost basis yet; silently skip this tick.
            debug!(contract_id, "No position data for tick, skipping P&L");
            return;
        };
        if position.quantity == Decimal::ZERO {
            debug!(contract_id, "Zero position size, skipping P&L");
            return;
        }

        let unrealized_pnl =
            (last_price - position.avg_cost) * position.quantity * self.config.multiplier;
        let unrealized_pnl_pct = if position.avg_cost == Decimal::ZERO {
            None
        } else {
            Some((last_price - position.avg_cost) / position.avg_cost * dec!(100))
        };
        let updated_at = Utc::now().to_rfc3339();

        let mut details = Map::new();
        details.insert("last_price".to_string(), json!(last_price));
        details.insert("unrealized_pnl".to_string(), json!(unrealized_pnl));
        details.insert("unrealized_pnl_pct".to_string(), json!(unrealized_pnl_pct));
        self.store.merge_last_update(parent_order_id, details).await;

        let payload = json!({
            "type": "pnl",
            "parent_order_id": parent_order_id,
            "contract_id": contract_id,
            "last_price": last_price,
            "unrealized_pnl": unrealized_pnl,
            "unrealized_pnl_pct": unrealized_pnl_pct,
            "updated_at": updated_at,
        });
        if let Err(err) = self.event_bus.publish(parent_order_id, payload).await {
            warn!(error = %err, parent_order_id = %parent_order_id, "P&L publish failed");
        }
    }

    /// Refresh the position cache. Failures keep the previous cache.
    async fn refresh_positions(&mut self) {
        match self.positions.list_positions().await {
            Ok(positions) => {
                self.position_cache = positions
                    .into_iter()
                    .map(|p| (p.contract_id, p))
                    .collect();
            }
            Err(err) => {
                warn!(error = %err, "Position listing failed, keeping cached data");
            }
        }
    }
}

#[async_trait]
impl<M, P, E> Monitor for PnlSubscriber<M, P, E>
where
    M: MarketDataPort + 'static,
    P: PositionsPort + 'static,
    E: EventBusPort + 'static,
{
    fn name(&self) -> &'static str {
        "pnl-subscriber"
    }

    async fn tick(&mut self) -> anyhow::Result<Pace> {
        self.run_once().await
    }

    async fn shutdown(&mut self) {
        for contract_id in self.subscribed.drain() {
            if let Err(err) = self.market_data.unsubscribe_market_data(contract_id).await {
                warn!(contract_id, error = %err, "Unsubscribe on shutdown failed");
            }
        }
    }
}
