//! Engine configuration, loaded from environment variables.
//!
//! Every setting has a default matching the monitoring cadence the engine
//! was tuned for (1s fill polling, 5s idle/target/P&L intervals, 5%
//! trailing). `BRACKET_STORE_PATH` selects the store file, which also gives
//! tests an isolated store.

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::application::services::{
    BackoffPolicy, FillWatcherConfig, PnlSubscriberConfig, SupervisorConfig, TargetMonitorConfig,
};

/// Complete engine configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path of the bracket store file.
    pub store_path: PathBuf,
    /// Fill watcher sleep between active iterations.
    pub poll_interval: Duration,
    /// Fill watcher sleep while nothing is open.
    pub idle_interval: Duration,
    /// Price-target evaluation interval.
    pub target_interval: Duration,
    /// P&L subscriber interval.
    pub pnl_interval: Duration,
    /// Trailing amount as a percent of the last price target.
    pub trailing_stop_percent: Decimal,
    /// Duplicate fill-notification suppression window.
    pub dedupe_window: Duration,
    /// First backoff delay after a failed iteration.
    pub backoff_initial: Duration,
    /// Backoff ceiling.
    pub backoff_max: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("./data/brackets.json"),
            poll_interval: Duration::from_secs(1),
            idle_interval: Duration::from_secs(5),
            target_interval: Duration::from_secs(5),
            pnl_interval: Duration::from_secs(5),
            trailing_stop_percent: dec!(5),
            dedupe_window: Duration::from_secs(300),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
        }
    }
}

impl Settings {
    /// Load settings from environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store_path: std::env::var("BRACKET_STORE_PATH")
                .map_or(defaults.store_path, PathBuf::from),
            poll_interval: parse_env_duration_secs(
                "BRACKET_POLL_INTERVAL_SECS",
                defaults.poll_interval,
            ),
            idle_interval: parse_env_duration_secs(
                "BRACKET_IDLE_INTERVAL_SECS",
                defaults.idle_interval,
            ),
            target_interval: parse_env_duration_secs(
                "BRACKET_TARGET_INTERVAL_SECS",
                defaults.target_interval,
            ),
            pnl_interval: parse_env_duration_secs(
                "BRACKET_PNL_INTERVAL_SECS",
                defaults.pnl_interval,
            ),
            trailing_stop_percent: parse_env_decimal(
                "BRACKET_TRAILING_STOP_PERCENT",
                defaults.trailing_stop_percent,
            ),
            dedupe_window: parse_env_duration_secs(
                "BRACKET_DEDUPE_WINDOW_SECS",
                defaults.dedupe_window,
            ),
            backoff_initial: parse_env_duration_secs(
                "BRACKET_BACKOFF_INITIAL_SECS",
                defaults.backoff_initial,
            ),
            backoff_max: parse_env_duration_secs("BRACKET_BACKOFF_MAX_SECS", defaults.backoff_max),
        }
    }

    /// Backoff policy shared by all monitors.
    #[must_use]
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial: self.backoff_initial,
            max: self.backoff_max,
            ..Default::default()
        }
    }

    /// Supervisor configuration for the fill watcher.
    #[must_use]
    pub fn fill_supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            poll_interval: self.poll_interval,
            idle_interval: self.idle_interval,
            backoff: self.backoff_policy(),
        }
    }

    /// Supervisor configuration for the price-target monitor.
    #[must_use]
    pub fn target_supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            poll_interval: self.target_interval,
            idle_interval: self.target_interval,
            backoff: self.backoff_policy(),
        }
    }

    /// Supervisor configuration for the P&L subscriber.
    #[must_use]
    pub fn pnl_supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            poll_interval: self.pnl_interval,
            idle_interval: self.pnl_interval,
            backoff: self.backoff_policy(),
        }
    }

    /// Fill watcher configuration.
    #[must_use]
    pub fn fill_watcher(&self) -> FillWatcherConfig {
        FillWatcherConfig {
            dedupe_window: self.dedupe_window,
            ..Default::default()
        }
    }

    /// Price-target monitor configuration.
    #[must_use]
    pub fn target_monitor(&self) -> TargetMonitorConfig {
        TargetMonitorConfig {
            trailing_stop_percent: self.trailing_stop_percent,
        }
    }

    /// P&L subscriber configuration.
    #[must_use]
    pub fn pnl_subscriber(&self) -> PnlSubscriberConfig {
        PnlSubscriberConfig::default()
    }
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_decimal(key: &str, default: Decimal) -> Decimal {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
