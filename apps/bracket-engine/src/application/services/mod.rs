//! Monitor services.
//!
//! Three long-lived monitors share one runtime: the fill watcher, the
//! price-target monitor, and the position P&L subscriber. Each implements
//! [`Monitor`] and runs under the supervisor, which owns pacing, backoff,
//! and cancellation.

mod fill_watcher;
mod pnl_subscriber;
mod supervisor;
mod target_monitor;

pub use fill_watcher::{FillWatcher, FillWatcherConfig, ReconcileReport};
pub use pnl_subscriber::{PnlSubscriber, PnlSubscriberConfig};
pub use supervisor::{BackoffPolicy, Monitor, MonitorBackoff, Pace, SupervisorConfig, spawn_monitor};
pub use target_monitor::{TargetMonitor, TargetMonitorConfig};
