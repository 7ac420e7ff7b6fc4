//! Price-Target Monitor
//!
//! Polls the current price per ticker and runs the two-phase target
//! strategy: once the first target is reached the protective stop is moved
//! to breakeven, and once the last target is reached a free-runner bracket
//! swaps its remaining exit legs for a trailing stop.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::application::ports::{
    BrokerPort, MarketDataPort, NotifierPort, OrderModify, PositionsPort,
};
use crate::domain::bracket::{BracketOrder, TickerStrategy};
use crate::infrastructure::persistence::BracketStore;

use super::supervisor::{Monitor, Pace};

/// Price-target monitor configuration.
#[derive(Debug, Clone)]
pub struct TargetMonitorConfig {
    /// Trailing amount as a percent of the last price target.
    pub trailing_stop_percent: Decimal,
}

impl Default for TargetMonitorConfig {
    fn default() -> Self {
        Self {
            trailing_stop_percent: dec!(5),
        }
    }
}

/// Monitors ticker strategies and adjusts protective orders.
pub struct TargetMonitor<B, M, P, N>
where
    B: BrokerPort,
    M: MarketDataPort,
    P: PositionsPort,
    N: NotifierPort,
{
    store: Arc<BracketStore>,
    broker: Arc<B>,
    market_data: Arc<M>,
    positions: Arc<P>,
    notifier: Arc<N>,
    config: TargetMonitorConfig,
}

impl<B, M, P, N> TargetMonitor<B, M, P, N>
where
    B: BrokerPort,
    M: MarketDataPort,
    P: PositionsPort,
    N: NotifierPort,
{
    /// Create a target monitor with default configuration.
    #[must_use]
    pub fn new(
        store: Arc<BracketStore>,
        broker: Arc<B>,
        market_data: Arc<M>,
        positions: Arc<P>,
        notifier: Arc<N>,
    ) -> Self {
        Self::with_config(
            store,
            broker,
            market_data,
            positions,
            notifier,
            TargetMonitorConfig::default(),
        )
    }

    /// Create a target monitor with custom configuration.
    #[must_use]
    pub fn with_config(
        store: Arc<BracketStore>,
        broker: Arc<B>,
        market_data: Arc<M>,
        positions: Arc<P>,
        notifier: Arc<N>,
        config: TargetMonitorConfig,
    ) -> Self {
        Self {
            store,
            broker,
            market_data,
            positions,
            notifier,
            config,
        }
    }

    /// Run one evaluation pass over all ticker strategies.
    pub async fn run_once(&mut self) -> anyhow::Result<Pace> {
        for strategy in self.store.ticker_strategies().await {
            let Some(entry_price) = strategy.entry_price else {
                continue;
            };
            if strategy.price_targets.is_empty() || strategy.orders.is_empty() {
                continue;
            }

            let price = match self.market_data.last_price(&strategy.ticker).await {
                Ok(Some(price)) => price,
                Ok(None) => {
                    debug!(ticker = %strategy.ticker, "No price available, skipping");
                    continue;
                }
                Err(err) => {
                    debug!(ticker = %strategy.ticker, error = %err, "Price fetch failed, skipping");
                    continue;
                }
            };

            let targets = strategy.sorted_targets();
            let first = targets[0];

            if price >= first {
                self.move_stops_to_breakeven(&strategy, entry_price, price)
                    .await;
            }

            // The last target only means anything with more than one target.
            if targets.len() > 1 {
                let last = targets[targets.len() - 1];
                if price >= last {
                    self.activate_trailing_stops(&strategy, last, price).await;
                }
            }
        }

        Ok(Pace::Active)
    }

    /// Move every protective stop on this ticker to breakeven.
    async fn move_stops_to_breakeven(
        &self,
        strategy: &TickerStrategy,
        entry_price: Decimal,
        current_price: Decimal,
    ) {
        for order in &strategy.orders {
            let Some(stop_leg) = &order.stop_loss else {
                continue;
            };
            if order.breakeven_applied {
                continue;
            }

            let minimum_variation = if order.minimum_variation > Decimal::ZERO {
                order.minimum_variation
            } else {
                strategy.minimum_variation
            };
            let limit_price = entry_price - minimum_variation;
            let modify = OrderModify::stop_and_limit(entry_price, limit_price);

            match self.broker.modify_order(&stop_leg.order_id, modify).await {
                Ok(()) => {
                    self.store
                        .mark_breakeven_applied(&order.parent_order_id)
                        .await;
                    info!(
                        ticker = %strategy.ticker,
                        parent_order_id = %order.parent_order_id,
                        stop_price = %entry_price,
                        limit_price = %limit_price,
                        "Moved protective stop to breakeven"
                    );
                    self.notify(
                        "breakeven_moved",
                        json!({
                            "ticker": strategy.ticker,
                            "parent_order_id": order.parent_order_id,
                            "stop_order_id": stop_leg.order_id,
                            "stop_price": entry_price,
                            "limit_price": limit_price,
                            "current_price": current_price,
                        }),
                    )
                    .await;
                }
                Err(err) => {
                    warn!(
                        ticker = %strategy.ticker,
                        order_id = %stop_leg.order_id,
                        error = %err,
                        "Failed to move stop to breakeven"
                    );
                    self.notify(
                        "order_modify_failed",
                        json!({
                            "ticker": strategy.ticker,
                            "parent_order_id": order.parent_order_id,
                            "stop_order_id": stop_leg.order_id,
                            "error": err.to_string(),
                        }),
                    )
                    .await;
                }
            }
        }
    }

    /// Replace remaining exit legs with a trailing stop for free runners.
    async fn activate_trailing_stops(
        &self,
        strategy: &TickerStrategy,
        last_target: Decimal,
        current_price: Decimal,
    ) {
        let trail_amount =
            last_target * self.config.trailing_stop_percent / dec!(100);

        for order in &strategy.orders {
            let free_runner = order.free_runner || strategy.free_runner;
            if !free_runner || order.trailing_order_id.is_some() {
                continue;
            }
            if order.limit_sell.is_none() && order.stop_loss.is_none() {
                continue;
            }

            let Some((contract_id, quantity)) = self.resolve_contract_and_qty(order).await else {
                warn!(
                    ticker = %strategy.ticker,
                    parent_order_id = %order.parent_order_id,
                    "Cannot derive contract or quantity for trailing stop, skipping"
                );
                continue;
            };

            if !self.cancel_exit_legs(strategy, order).await {
                continue;
            }

            match self
                .broker
                .place_trailing_stop(contract_id, quantity, trail_amount)
                .await
            {
                Ok(ack) => {
                    self.store
                        .record_trailing(&order.parent_order_id, &ack.order_id)
                        .await;
                    info!(
                        ticker = %strategy.ticker,
                        parent_order_id = %order.parent_order_id,
                        trailing_order_id = %ack.order_id,
                        trail_amount = %trail_amount,
                        "Activated trailing stop"
                    );
                    self.notify(
                        "trailing_stop_activated",
                        json!({
                            "ticker": strategy.ticker,
                            "parent_order_id": order.parent_order_id,
                            "trailing_order_id": ack.order_id,
                            "trail_amount": trail_amount,
                            "quantity": quantity,
                            "last_target": last_target,
                            "current_price": current_price,
                        }),
                    )
                    .await;
                }
                Err(err) => {
                    warn!(
                        ticker = %strategy.ticker,
                        parent_order_id = %order.parent_order_id,
                        error = %err,
                        "Failed to place trailing stop"
                    );
                    self.notify(
                        "trailing_stop_failed",
                        json!({
                            "ticker": strategy.ticker,
                            "parent_order_id": order.parent_order_id,
                            "error": err.to_string(),
                        }),
                    )
                    .await;
                }
            }
        }
    }

    /// Cancel a bracket's exit legs before replacing them.
    ///
    /// Returns false when a cancel fails; the trailing stop is not placed
    /// then, so the position is never protected twice.
    async fn cancel_exit_legs(&self, strategy: &TickerStrategy, order: &BracketOrder) -> bool {
        let legs = [order.limit_sell.as_ref(), order.stop_loss.as_ref()];
        for leg in legs.into_iter().flatten() {
            if let Err(err) = self.broker.cancel_order(&leg.order_id).await {
                warn!(
                    ticker = %strategy.ticker,
                    order_id = %leg.order_id,
                    error = %err,
                    "Failed to cancel exit leg"
                );
                self.notify(
                    "order_cancel_failed",
                    json!({
                        "ticker": strategy.ticker,
                        "parent_order_id": order.parent_order_id,
                        "order_id": leg.order_id,
                        "error": err.to_string(),
                    }),
                )
                .await;
                return false;
            }
        }
        true
    }

    /// Contract ID and share quantity for the replacement trailing order.
    ///
    /// Quantity comes from the recorded fill; the position listing is the
    /// fallback for both fields.
    async fn resolve_contract_and_qty(&self, order: &BracketOrder) -> Option<(i64, Decimal)> {
        let mut contract_id = order.contract_id;
        let mut quantity = order.filled_qty().filter(|qty| *qty > Decimal::ZERO);

        if contract_id.is_none() || quantity.is_none() {
            match self.positions.list_positions().await {
                Ok(positions) => {
                    let position = positions.iter().find(|p| {
                        Some(p.contract_id) == contract_id || p.symbol == order.ticker
                    });
                    if let Some(position) = position {
                        contract_id = contract_id.or(Some(position.contract_id));
                        if quantity.is_none() && position.quantity != Decimal::ZERO {
                            quantity = Some(position.quantity.abs());
                        }
                    }
                }
                Err(err) => {
                    debug!(error = %err, "Position listing unavailable");
                }
            }
        }

        Some((contract_id?, quantity?))
    }

    async fn notify(&self, event: &str, payload: serde_json::Value) {
        if let Err(err) = self.notifier.notify(event, payload).await {
            warn!(error = %err, event = event, "Notification failed");
        }
    }
}

#[async_trait]
impl<B, M, P, N> Monitor for TargetMonitor<B, M, P, N>
where
    B: BrokerPort + 'static,
    M: MarketDataPort + 'static,
    P: PositionsPort + 'static,
    N: NotifierPort + 'static,
{
    fn name(&self) -> &'static str {
        "price-target-monitor"
    }

    async fn tick(&mut self) -> anyhow::Result<Pace> {
        self.run_once().await
    }
}
