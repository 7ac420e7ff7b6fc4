//! End-to-end bracket lifecycle over the paper adapters.
//!
//! Drives one bracket from submission through fill detection, P&L
//! publication, the breakeven move, and trailing-stop activation, then
//! verifies the fill watcher goes idle and the store survives a restart.

use std::sync::Arc;

use rust_decimal_macros::dec;
use serde_json::json;

use bracket_engine::application::ports::MarketTick;
use bracket_engine::application::services::{FillWatcher, Pace, PnlSubscriber, TargetMonitor};
use bracket_engine::domain::bracket::{BracketOrder, BracketStatus, OrderLeg, StrategyFields};
use bracket_engine::infrastructure::paper::{
    ChannelEventBus, PaperBroker, PaperMarketData, PaperOrderStream, PaperPositions,
    RecordingNotifier,
};
use bracket_engine::infrastructure::persistence::BracketStore;

struct Harness {
    store: Arc<BracketStore>,
    stream: Arc<PaperOrderStream>,
    broker: Arc<PaperBroker>,
    market_data: Arc<PaperMarketData>,
    positions: Arc<PaperPositions>,
    notifier: Arc<RecordingNotifier>,
    event_bus: Arc<ChannelEventBus>,
}

impl Harness {
    async fn new(dir: &tempfile::TempDir) -> Self {
        let store = Arc::new(BracketStore::load(dir.path().join("brackets.json")).await);
        Self {
            store,
            stream: Arc::new(PaperOrderStream::new()),
            broker: Arc::new(PaperBroker::new()),
            market_data: Arc::new(PaperMarketData::new()),
            positions: Arc::new(PaperPositions::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            event_bus: Arc::new(ChannelEventBus::default()),
        }
    }

    fn fill_watcher(&self) -> FillWatcher<PaperOrderStream, PaperBroker, RecordingNotifier> {
        FillWatcher::new(
            Arc::clone(&self.store),
            Arc::clone(&self.stream),
            Arc::clone(&self.broker),
            Arc::clone(&self.notifier),
        )
    }

    fn target_monitor(
        &self,
    ) -> TargetMonitor<PaperBroker, PaperMarketData, PaperPositions, RecordingNotifier> {
        TargetMonitor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.broker),
            Arc::clone(&self.market_data),
            Arc::clone(&self.positions),
            Arc::clone(&self.notifier),
        )
    }

    fn pnl_subscriber(&self) -> PnlSubscriber<PaperMarketData, PaperPositions, ChannelEventBus> {
        PnlSubscriber::new(
            Arc::clone(&self.store),
            Arc::clone(&self.market_data),
            Arc::clone(&self.positions),
            Arc::clone(&self.event_bus),
        )
    }

    async fn submit_bracket(&self) {
        let fields = StrategyFields {
            entry_price: Some(dec!(1.00)),
            free_runner: Some(true),
            price_targets: Some(vec![dec!(1.50), dec!(1.20)]),
            minimum_variation: Some(dec!(0.01)),
        };
        let mut bracket = BracketOrder::new("AAPL", "p-1");
        bracket.limit_sell = Some(OrderLeg::new("limit-1"));
        bracket.stop_loss = Some(OrderLeg::new("stop-1"));
        bracket.minimum_variation = dec!(0.01);

        let added = self.store.add_brackets("AAPL", &fields, vec![bracket]).await;
        assert_eq!(added, vec!["p-1".to_string()]);
    }
}

#[tokio::test]
async fn bracket_lifecycle_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new(&dir).await;
    harness.submit_bracket().await;

    let mut watcher = harness.fill_watcher();
    let mut targets = harness.target_monitor();
    let mut pnl = harness.pnl_subscriber();

    // Open bracket: the watcher subscribes to the order stream.
    assert_eq!(watcher.run_once().await.unwrap(), Pace::Active);
    assert!(harness.stream.is_subscribed("orders"));

    // Parent fill arrives on the stream.
    harness.stream.push_message(json!({
        "orderId": "p-1",
        "status": "Filled",
        "filledQuantity": "100",
        "avgPrice": "1.02",
        "conid": 101
    }));
    watcher.run_once().await.unwrap();

    let bracket = harness.store.get_bracket("p-1").await.unwrap();
    assert_eq!(bracket.status, BracketStatus::Filled);
    assert_eq!(bracket.contract_id, Some(101));
    assert_eq!(harness.notifier.events_of("parent_filled").len(), 1);

    // The P&L subscriber picks up the filled contract and publishes ticks.
    harness.positions.set_positions(vec![
        bracket_engine::application::ports::PositionInfo {
            contract_id: 101,
            symbol: "AAPL".to_string(),
            quantity: dec!(100),
            avg_cost: dec!(1.02),
            last_price: None,
        },
    ]);
    let mut listener = harness.event_bus.subscribe();
    pnl.run_once().await.unwrap();
    assert!(harness.market_data.subscriptions().contains(&101));

    harness
        .market_data
        .push_tick(101, MarketTick::last_only(dec!(1.10)));
    pnl.run_once().await.unwrap();

    let (topic, payload) = listener.recv().await.unwrap();
    assert_eq!(topic, "p-1");
    assert_eq!(payload["type"], "pnl");
    // (1.10 - 1.02) * 100 = 8.00
    assert_eq!(payload["unrealized_pnl"], json!(dec!(8.00)));

    // First target reached: stop moves to breakeven.
    harness.market_data.set_price("AAPL", dec!(1.21));
    targets.run_once().await.unwrap();

    let modifications = harness.broker.modifications();
    assert_eq!(modifications.len(), 1);
    assert_eq!(modifications[0].0, "stop-1");
    assert_eq!(modifications[0].1.stop_price, Some(dec!(1.00)));
    assert_eq!(modifications[0].1.limit_price, Some(dec!(0.99)));

    // Last target reached: legs cancelled, trailing stop placed at
    // 5% of 1.50 = 0.075.
    harness.market_data.set_price("AAPL", dec!(1.55));
    targets.run_once().await.unwrap();

    let cancellations = harness.broker.cancellations();
    assert!(cancellations.contains(&"limit-1".to_string()));
    assert!(cancellations.contains(&"stop-1".to_string()));
    let trailing = harness.broker.trailing_orders();
    assert_eq!(trailing, vec![(101, dec!(100), dec!(0.075))]);

    let bracket = harness.store.get_bracket("p-1").await.unwrap();
    assert!(bracket.trailing_order_id.is_some());

    // All brackets terminal: the watcher lets go of the stream.
    assert_eq!(watcher.run_once().await.unwrap(), Pace::Idle);
    assert!(!harness.stream.is_subscribed("orders"));

    // Restart: everything the monitors recorded survives the reload.
    let reloaded = BracketStore::load(dir.path().join("brackets.json")).await;
    let bracket = reloaded.get_bracket("p-1").await.unwrap();
    assert_eq!(bracket.status, BracketStatus::Filled);
    assert_eq!(bracket.contract_id, Some(101));
    assert!(bracket.breakeven_applied);
    assert!(bracket.limit_sell.is_none());
    assert!(bracket.stop_loss.is_none());
    assert!(bracket.trailing_order_id.is_some());
}

#[tokio::test]
async fn reconciliation_catches_fills_missed_while_unsubscribed() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new(&dir).await;
    harness.submit_bracket().await;

    // The fill happened while the engine was down; only REST knows.
    harness.broker.set_listing(vec![json!({
        "orderId": "p-1",
        "status": "Filled",
        "filledQuantity": 100,
        "avgPrice": 1.05
    })]);

    // First iteration subscribes and immediately reconciles.
    let mut watcher = harness.fill_watcher();
    watcher.run_once().await.unwrap();

    let bracket = harness.store.get_bracket("p-1").await.unwrap();
    assert_eq!(bracket.status, BracketStatus::Filled);
    assert_eq!(harness.notifier.events_of("parent_filled").len(), 1);
}
