// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Bracket Engine - Order Lifecycle Library
//!
//! Automates a multi-leg order bracket's lifecycle against an external
//! brokerage: stores parent entry orders with their exit legs, watches the
//! live order-update stream for fills, reconciles against REST listings
//! when the stream is unreliable, adjusts protective orders as price
//! targets are reached, and tracks per-position P&L.
//!
//! # Architecture
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Bracket types and decision logic
//!   - `bracket`: `TickerStrategy`, `BracketOrder`, status semantics
//!   - `update`: broker payload normalization into one fixed schema
//!   - `matching`: update-to-bracket matching and fill classification
//!
//! - **Application**: Ports and monitor services
//!   - `ports`: collaborator contracts (stream, broker REST, market data,
//!     positions, notification sink, pub-sub)
//!   - `services`: the fill watcher, price-target monitor, and P&L
//!     subscriber, all run under one supervisor policy
//!
//! - **Infrastructure**: Adapters
//!   - `persistence`: lock-guarded, file-backed bracket store
//!   - `paper`: in-process port implementations for local runs and tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Domain layer - Bracket types and decision logic.
pub mod domain;

/// Application layer - Ports and monitor services.
pub mod application;

/// Infrastructure layer - Adapters and persistence.
pub mod infrastructure;

/// Engine configuration from environment variables.
pub mod config;

/// Logging initialization.
pub mod telemetry;

// Domain re-exports
pub use domain::bracket::{BracketOrder, BracketStatus, OrderLeg, StrategyFields, TickerStrategy};

// Application re-exports
pub use application::ports::{
    BrokerPort, EventBusPort, MarketDataPort, NotifierPort, OrderStreamPort, PositionsPort,
};
pub use application::services::{
    FillWatcher, Monitor, Pace, PnlSubscriber, SupervisorConfig, TargetMonitor, spawn_monitor,
};

// Infrastructure re-exports
pub use config::Settings;
pub use infrastructure::persistence::BracketStore;
