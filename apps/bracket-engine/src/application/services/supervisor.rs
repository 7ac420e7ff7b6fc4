//! Monitor supervision.
//!
//! Runs a [`Monitor`] as a long-lived task: tick, sleep, repeat. The
//! supervisor owns the loop policy so it is uniform across monitors — a
//! clean iteration sleeps the poll interval (or the longer idle interval
//! when the monitor reports nothing to watch), a failed iteration backs off
//! exponentially with jitter, and cancellation lets the monitor unwind
//! through its `shutdown` hook before the task exits.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Pacing requested by a monitor after a clean iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Work was (or may soon be) available; sleep the short poll interval.
    Active,
    /// Nothing to watch; sleep the longer idle interval.
    Idle,
}

/// A supervised monitor loop body.
#[async_trait]
pub trait Monitor: Send {
    /// Monitor name for logs.
    fn name(&self) -> &'static str;

    /// Run one iteration. Errors trigger backoff; they never kill the task.
    async fn tick(&mut self) -> anyhow::Result<Pace>;

    /// Final cleanup on cancellation (e.g. releasing stream subscriptions).
    async fn shutdown(&mut self) {}
}

/// Exponential backoff policy for failed iterations.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// First backoff delay.
    pub initial: Duration,
    /// Backoff ceiling.
    pub max: Duration,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
    /// Jitter factor (±fraction of the delay).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

/// Backoff state across iterations. Unlike a bounded retry budget, a
/// monitor retries forever; the delay just saturates at the ceiling.
#[derive(Debug)]
pub struct MonitorBackoff {
    policy: BackoffPolicy,
    consecutive_failures: u32,
}

impl MonitorBackoff {
    /// Create backoff state from a policy.
    #[must_use]
    pub const fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
        }
    }

    /// Delay before the next attempt, advancing the failure count.
    pub fn next_delay(&mut self) -> Duration {
        let base_ms = self.policy.initial.as_millis() as f64
            * self.policy.multiplier.powi(self.consecutive_failures as i32);
        let capped_ms = base_ms.min(self.policy.max.as_millis() as f64);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(self.apply_jitter(capped_ms) as u64)
    }

    /// Reset after a clean iteration.
    pub const fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Consecutive failure count.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn apply_jitter(&self, delay_ms: f64) -> f64 {
        if self.policy.jitter <= 0.0 {
            return delay_ms;
        }
        let range = delay_ms * self.policy.jitter;
        let min = (delay_ms - range).max(0.0);
        let max = delay_ms + range;
        rand::rng().random_range(min..=max)
    }
}

/// Loop configuration for a supervised monitor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Sleep between active iterations.
    pub poll_interval: Duration,
    /// Sleep between idle iterations.
    pub idle_interval: Duration,
    /// Backoff policy for failed iterations.
    pub backoff: BackoffPolicy,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            idle_interval: Duration::from_secs(5),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Spawn a monitor under supervision.
///
/// The returned handle completes only after the monitor has observed
/// cancellation and finished its `shutdown` hook, so joining it guarantees
/// no mutation is left pending.
pub fn spawn_monitor<M>(
    mut monitor: M,
    config: SupervisorConfig,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()>
where
    M: Monitor + 'static,
{
    tokio::spawn(async move {
        let name = monitor.name();
        let mut backoff = MonitorBackoff::new(config.backoff.clone());
        info!(monitor = name, "Monitor started");

        loop {
            let sleep_for = match monitor.tick().await {
                Ok(Pace::Active) => {
                    backoff.reset();
                    config.poll_interval
                }
                Ok(Pace::Idle) => {
                    backoff.reset();
                    config.idle_interval
                }
                Err(err) => {
                    let delay = backoff.next_delay();
                    warn!(
                        monitor = name,
                        error = %err,
                        failures = backoff.consecutive_failures(),
                        delay_ms = delay.as_millis() as u64,
                        "Monitor iteration failed, backing off"
                    );
                    delay
                }
            };

            tokio::select! {
                () = tokio::time::sleep(sleep_for) => {}
                () = shutdown.cancelled() => {
                    monitor.shutdown().await;
                    info!(monitor = name, "Monitor stopped");
                    break;
                }
            }
        }
    })
}
