//! Paper adapters.
//!
//! In-process implementations of every port so the engine runs end-to-end
//! without a live gateway: the stream and market data are fed by hand (or by
//! a demo script), the broker acknowledges everything and records the calls
//! it receives. Used by the binary's paper mode and by the test suites.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::application::ports::{
    BrokerAck, BrokerError, BrokerPort, EventBusPort, MarketDataError, MarketDataPort, MarketTick,
    NotifierPort, NotifyError, OrderModify, OrderStreamPort, PositionInfo, PositionsError,
    PositionsPort, PublishError, StreamError,
};

/// Paper order-update stream fed by hand.
#[derive(Debug, Default)]
pub struct PaperOrderStream {
    ready: AtomicBool,
    channels: Mutex<HashSet<String>>,
    queue: Mutex<VecDeque<Value>>,
}

impl PaperOrderStream {
    /// Create a ready stream.
    #[must_use]
    pub fn new() -> Self {
        let stream = Self::default();
        stream.ready.store(true, Ordering::SeqCst);
        stream
    }

    /// Queue a message for the next drain.
    pub fn push_message(&self, message: Value) {
        self.queue.lock().push_back(message);
    }

    /// Flip stream readiness.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Whether a channel is currently subscribed.
    #[must_use]
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.channels.lock().contains(channel)
    }
}

#[async_trait]
impl OrderStreamPort for PaperOrderStream {
    async fn subscribe(&self, channel: &str) -> Result<(), StreamError> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(StreamError::NotConnected);
        }
        self.channels.lock().insert(channel.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), StreamError> {
        self.channels.lock().remove(channel);
        Ok(())
    }

    async fn poll_messages(&self) -> Vec<Value> {
        self.queue.lock().drain(..).collect()
    }

    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Paper broker: acknowledges everything and records the calls.
#[derive(Debug, Default)]
pub struct PaperBroker {
    listing: Mutex<Vec<Value>>,
    fail_listing: AtomicBool,
    modifications: Mutex<Vec<(String, OrderModify)>>,
    cancellations: Mutex<Vec<String>>,
    trailing_orders: Mutex<Vec<(i64, Decimal, Decimal)>>,
}

impl PaperBroker {
    /// Create an empty paper broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the order listing returned by `list_orders`.
    pub fn set_listing(&self, orders: Vec<Value>) {
        *self.listing.lock() = orders;
    }

    /// Make `list_orders` fail, to exercise the reconciliation fallback.
    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Recorded `modify_order` calls.
    #[must_use]
    pub fn modifications(&self) -> Vec<(String, OrderModify)> {
        self.modifications.lock().clone()
    }

    /// Recorded `cancel_order` calls.
    #[must_use]
    pub fn cancellations(&self) -> Vec<String> {
        self.cancellations.lock().clone()
    }

    /// Recorded trailing-stop placements as `(contract_id, qty, trail_amount)`.
    #[must_use]
    pub fn trailing_orders(&self) -> Vec<(i64, Decimal, Decimal)> {
        self.trailing_orders.lock().clone()
    }
}

#[async_trait]
impl BrokerPort for PaperBroker {
    async fn list_orders(&self) -> Result<Vec<Value>, BrokerError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(BrokerError::ConnectionError {
                message: "paper listing disabled".to_string(),
            });
        }
        Ok(self.listing.lock().clone())
    }

    async fn modify_order(&self, order_id: &str, modify: OrderModify) -> Result<(), BrokerError> {
        self.modifications
            .lock()
            .push((order_id.to_string(), modify));
        Ok(())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        self.cancellations.lock().push(order_id.to_string());
        Ok(())
    }

    async fn place_trailing_stop(
        &self,
        contract_id: i64,
        quantity: Decimal,
        trail_amount: Decimal,
    ) -> Result<BrokerAck, BrokerError> {
        self.trailing_orders
            .lock()
            .push((contract_id, quantity, trail_amount));
        Ok(BrokerAck {
            order_id: format!("paper-trail-{}", uuid::Uuid::new_v4()),
        })
    }
}

/// Paper market data with settable prices and a hand-fed tick queue.
#[derive(Debug, Default)]
pub struct PaperMarketData {
    prices: Mutex<HashMap<String, Decimal>>,
    subscriptions: Mutex<HashSet<i64>>,
    ticks: Mutex<Vec<(i64, MarketTick)>>,
}

impl PaperMarketData {
    /// Create empty paper market data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the last price for a ticker.
    pub fn set_price(&self, ticker: &str, price: Decimal) {
        self.prices.lock().insert(ticker.to_string(), price);
    }

    /// Queue a tick for a contract.
    pub fn push_tick(&self, contract_id: i64, tick: MarketTick) {
        self.ticks.lock().push((contract_id, tick));
    }

    /// Currently subscribed contracts.
    #[must_use]
    pub fn subscriptions(&self) -> HashSet<i64> {
        self.subscriptions.lock().clone()
    }
}

#[async_trait]
impl MarketDataPort for PaperMarketData {
    async fn last_price(&self, ticker: &str) -> Result<Option<Decimal>, MarketDataError> {
        Ok(self.prices.lock().get(ticker).copied())
    }

    async fn subscribe_market_data(&self, contract_id: i64) -> Result<(), MarketDataError> {
        self.subscriptions.lock().insert(contract_id);
        Ok(())
    }

    async fn unsubscribe_market_data(&self, contract_id: i64) -> Result<(), MarketDataError> {
        self.subscriptions.lock().remove(&contract_id);
        Ok(())
    }

    async fn poll_market_data(&self) -> HashMap<i64, MarketTick> {
        self.ticks.lock().drain(..).collect()
    }
}

/// Paper position listing.
#[derive(Debug, Default)]
pub struct PaperPositions {
    positions: Mutex<Vec<PositionInfo>>,
}

impl PaperPositions {
    /// Create an empty position listing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the position listing.
    pub fn set_positions(&self, positions: Vec<PositionInfo>) {
        *self.positions.lock() = positions;
    }
}

#[async_trait]
impl PositionsPort for PaperPositions {
    async fn list_positions(&self) -> Result<Vec<PositionInfo>, PositionsError> {
        Ok(self.positions.lock().clone())
    }
}

/// Notifier that records events and logs them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingNotifier {
    /// Create an empty recording notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().clone()
    }

    /// Recorded events of one type.
    #[must_use]
    pub fn events_of(&self, event_type: &str) -> Vec<Value> {
        self.events
            .lock()
            .iter()
            .filter(|(t, _)| t == event_type)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl NotifierPort for RecordingNotifier {
    async fn notify(&self, event_type: &str, payload: Value) -> Result<(), NotifyError> {
        tracing::info!(event = event_type, payload = %payload, "notification");
        self.events.lock().push((event_type.to_string(), payload));
        Ok(())
    }
}

/// Notifier that only writes events to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotifierPort for LogNotifier {
    async fn notify(&self, event_type: &str, payload: Value) -> Result<(), NotifyError> {
        tracing::info!(event = event_type, payload = %payload, "notification");
        Ok(())
    }
}

/// Event bus backed by a broadcast channel; listeners may come and go.
#[derive(Debug)]
pub struct ChannelEventBus {
    sender: broadcast::Sender<(String, Value)>,
}

impl ChannelEventBus {
    /// Create a bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all published events as `(topic, payload)` pairs.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<(String, Value)> {
        self.sender.subscribe()
    }
}

impl Default for ChannelEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventBusPort for ChannelEventBus {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PublishError> {
        // No listeners is fine for a fire-and-forget fan-out.
        let _ = self.sender.send((topic.to_string(), payload));
        Ok(())
    }
}
