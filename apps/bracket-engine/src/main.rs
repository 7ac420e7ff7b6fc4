//! Bracket Engine Binary
//!
//! Starts the three bracket monitors (fill watcher, price-target monitor,
//! P&L subscriber) over one shared store and runs until interrupted.
//!
//! Runs against the in-process paper adapters; a live gateway is wired in
//! by swapping the port implementations built in `main`.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin bracket-engine
//! ```
//!
//! # Environment Variables
//!
//! - `BRACKET_STORE_PATH`: store file path (default: ./data/brackets.json)
//! - `BRACKET_POLL_INTERVAL_SECS`: fill watcher poll interval (default: 1)
//! - `BRACKET_IDLE_INTERVAL_SECS`: fill watcher idle interval (default: 5)
//! - `BRACKET_TARGET_INTERVAL_SECS`: price-target interval (default: 5)
//! - `BRACKET_PNL_INTERVAL_SECS`: P&L interval (default: 5)
//! - `BRACKET_TRAILING_STOP_PERCENT`: trailing stop percent (default: 5)
//! - `RUST_LOG`: log level (default: info)

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use bracket_engine::application::services::{
    FillWatcher, PnlSubscriber, TargetMonitor, spawn_monitor,
};
use bracket_engine::config::Settings;
use bracket_engine::infrastructure::paper::{
    ChannelEventBus, LogNotifier, PaperBroker, PaperMarketData, PaperOrderStream, PaperPositions,
};
use bracket_engine::infrastructure::persistence::BracketStore;
use bracket_engine::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    tracing::info!("Starting bracket engine");

    let settings = Settings::from_env();
    tracing::info!(
        store_path = %settings.store_path.display(),
        poll_interval_secs = settings.poll_interval.as_secs(),
        target_interval_secs = settings.target_interval.as_secs(),
        trailing_stop_percent = %settings.trailing_stop_percent,
        "Configuration loaded"
    );

    let store = Arc::new(BracketStore::load(&settings.store_path).await);

    // Paper adapters; a live gateway replaces these.
    let stream = Arc::new(PaperOrderStream::new());
    let broker = Arc::new(PaperBroker::new());
    let market_data = Arc::new(PaperMarketData::new());
    let positions = Arc::new(PaperPositions::new());
    let notifier = Arc::new(LogNotifier);
    let event_bus = Arc::new(ChannelEventBus::default());

    let shutdown = CancellationToken::new();

    let fill_watcher = FillWatcher::with_config(
        Arc::clone(&store),
        Arc::clone(&stream),
        Arc::clone(&broker),
        Arc::clone(&notifier),
        settings.fill_watcher(),
    );
    let target_monitor = TargetMonitor::with_config(
        Arc::clone(&store),
        Arc::clone(&broker),
        Arc::clone(&market_data),
        Arc::clone(&positions),
        Arc::clone(&notifier),
        settings.target_monitor(),
    );
    let pnl_subscriber = PnlSubscriber::with_config(
        Arc::clone(&store),
        Arc::clone(&market_data),
        Arc::clone(&positions),
        Arc::clone(&event_bus),
        settings.pnl_subscriber(),
    );

    let handles = vec![
        spawn_monitor(fill_watcher, settings.fill_supervisor(), shutdown.clone()),
        spawn_monitor(
            target_monitor,
            settings.target_supervisor(),
            shutdown.clone(),
        ),
        spawn_monitor(pnl_subscriber, settings.pnl_supervisor(), shutdown.clone()),
    ];

    signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    // Cancel and join every monitor so no mutation is left pending and
    // stream subscriptions are released.
    shutdown.cancel();
    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Monitor task join failed");
        }
    }

    tracing::info!("Bracket engine stopped");
    Ok(())
}
