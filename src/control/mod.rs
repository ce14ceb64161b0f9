//! Adaptive concurrency control.
//!
//! The controller is an AIMD-style loop: once per tick it reads the server
//! error rate from the sliding window and either halves the ceiling (error
//! rate above threshold) or grows it by the recovery factor once errors have
//! been quiet for the recovery interval. Decreases win over increases within a
//! tick, and the ceiling always stays inside `[min, max]`.

pub mod dispatcher;
pub mod window;

pub use dispatcher::{BoundedDispatcher, DispatchPermit};
pub use window::SlidingErrorWindow;

use crate::{config::RestoreConfig, state::RunState};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ConcurrencyState {
    pub current: usize,
    pub min: usize,
    pub max: usize,
    pub backoff_factor: f64,
    pub recovery_factor: f64,
    pub recovery_interval: Duration,
    pub last_adjustment: Instant,
    pub last_server_error: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    Decrease {
        from: usize,
        to: usize,
        error_rate: f64,
    },
    Increase {
        from: usize,
        to: usize,
        /// `None` when no server error has been seen during the run.
        quiet_for: Option<Duration>,
    },
}

impl Adjustment {
    pub fn target(&self) -> usize {
        match *self {
            Adjustment::Decrease { to, .. } | Adjustment::Increase { to, .. } => to,
        }
    }
}

impl ConcurrencyState {
    pub fn from_config(config: &RestoreConfig, now: Instant) -> Self {
        Self {
            current: config
                .initial_concurrency
                .clamp(config.min_concurrency, config.max_concurrency),
            min: config.min_concurrency,
            max: config.max_concurrency,
            backoff_factor: config.backoff_factor,
            recovery_factor: config.recovery_factor,
            recovery_interval: config.recovery_interval,
            last_adjustment: now,
            last_server_error: None,
        }
    }

    /// Decide the next ceiling without mutating anything.
    pub fn evaluate(&self, error_rate: f64, threshold: f64, now: Instant) -> Option<Adjustment> {
        if error_rate > threshold {
            let to = ((self.current as f64 * self.backoff_factor).floor() as usize).max(self.min);
            return (to != self.current).then_some(Adjustment::Decrease {
                from: self.current,
                to,
                error_rate,
            });
        }

        let quiet_for = self
            .last_server_error
            .map(|at| now.saturating_duration_since(at));
        let recovered = quiet_for.map_or(true, |quiet| quiet > self.recovery_interval);
        if recovered && self.current < self.max {
            let to = ((self.current as f64 * self.recovery_factor).ceil() as usize).min(self.max);
            return (to != self.current).then_some(Adjustment::Increase {
                from: self.current,
                to,
                quiet_for,
            });
        }
        None
    }
}

/// Periodic task retuning the dispatcher from the shared run state.
pub struct ConcurrencyController {
    state: Arc<RunState>,
    interval: Duration,
    threshold: f64,
}

impl ConcurrencyController {
    pub fn new(state: Arc<RunState>, config: &RestoreConfig) -> Self {
        Self {
            state,
            interval: config.adjust_interval,
            threshold: config.error_rate_threshold,
        }
    }

    /// Run one control step for the tick scheduled at `scheduled`.
    ///
    /// The debounce compares scheduled instants, so a tick that is processed
    /// late does not push the next one out of its interval.
    pub fn tick(&self, scheduled: Instant) -> Option<Adjustment> {
        let adjustment = self.state.adjust(scheduled, self.interval, self.threshold)?;
        match adjustment {
            Adjustment::Decrease {
                from,
                to,
                error_rate,
            } => info!(
                from,
                to,
                error_rate = %format!("{:.2}%", error_rate * 100.0),
                "reducing concurrency due to server errors"
            ),
            Adjustment::Increase {
                from,
                to,
                quiet_for,
            } => info!(
                from,
                to,
                quiet_secs = quiet_for.map(|d| d.as_secs_f64()),
                "increasing concurrency"
            ),
        }
        Some(adjustment)
    }

    /// Spawn the loop; it stops when `shutdown` fires or its sender is dropped.
    pub fn spawn(self, shutdown: oneshot::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                scheduled = ticker.tick() => {
                    self.tick(scheduled);
                }
            }
        }
        debug!("concurrency controller stopped");
    }
}
