//! Shared run state.
//!
//! One instance per run, shared by the scheduler, the workers, and the
//! concurrency controller. Every mutation goes through a method here.

use crate::{
    config::RestoreConfig,
    control::{Adjustment, BoundedDispatcher, ConcurrencyState, SlidingErrorWindow},
    models::{BatchReport, Counters, ItemProgress, RunSummary},
};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

pub struct RunState {
    counters: Mutex<Counters>,
    window: Mutex<SlidingErrorWindow>,
    concurrency: Mutex<ConcurrencyState>,
    dispatcher: Arc<BoundedDispatcher>,
    started: Instant,
}

impl RunState {
    pub fn new(config: &RestoreConfig) -> Self {
        let now = Instant::now();
        let concurrency = ConcurrencyState::from_config(config, now);
        Self {
            counters: Mutex::new(Counters::default()),
            window: Mutex::new(SlidingErrorWindow::new(
                config.window_duration,
                config.window_capacity,
            )),
            dispatcher: Arc::new(BoundedDispatcher::new(concurrency.current)),
            concurrency: Mutex::new(concurrency),
            started: now,
        }
    }

    pub fn dispatcher(&self) -> &Arc<BoundedDispatcher> {
        &self.dispatcher
    }

    pub fn record_restored(&self) {
        self.counters.lock().restored += 1;
    }

    /// Count a non-benign failure and feed it to the error window.
    pub fn record_failure(&self, is_server_error: bool, at: Instant) {
        self.counters.lock().failed += 1;
        self.window.lock().record(is_server_error, at);
        if is_server_error {
            self.concurrency.lock().last_server_error = Some(at);
        }
    }

    /// Count a failure that never produced a classified outcome (a worker fault).
    pub fn record_fault(&self) {
        self.counters.lock().failed += 1;
    }

    pub fn counters(&self) -> Counters {
        *self.counters.lock()
    }

    pub fn error_rate(&self) -> f64 {
        self.window.lock().error_rate(Instant::now())
    }

    pub fn window_len(&self) -> usize {
        self.window.lock().len()
    }

    pub fn ceiling(&self) -> usize {
        self.concurrency.lock().current
    }

    pub fn concurrency(&self) -> ConcurrencyState {
        self.concurrency.lock().clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Apply one controller step. The ceiling and the dispatcher capacity
    /// change together under the concurrency lock.
    pub fn adjust(&self, now: Instant, debounce: Duration, threshold: f64) -> Option<Adjustment> {
        let error_rate = self.window.lock().error_rate(now);

        let mut state = self.concurrency.lock();
        if now.saturating_duration_since(state.last_adjustment) < debounce {
            return None;
        }
        let adjustment = state.evaluate(error_rate, threshold, now)?;
        state.current = adjustment.target();
        state.last_adjustment = now;
        self.dispatcher.set_capacity(state.current);
        Some(adjustment)
    }

    pub fn item_progress(&self, completed: usize, total: usize) -> ItemProgress {
        let elapsed = self.elapsed().as_secs_f64();
        let items_per_sec = if elapsed > 0.0 {
            completed as f64 / elapsed
        } else {
            0.0
        };
        let eta_secs = if items_per_sec > 0.0 {
            total.saturating_sub(completed) as f64 / items_per_sec
        } else {
            0.0
        };
        ItemProgress {
            completed,
            total,
            items_per_sec,
            eta_secs,
            error_rate: self.error_rate(),
        }
    }

    pub fn batch_report(&self, batch: usize, batches: usize) -> BatchReport {
        let counters = self.counters();
        let elapsed = self.elapsed().as_secs_f64();
        BatchReport {
            batch,
            batches,
            restored: counters.restored,
            failed: counters.failed,
            ops_per_sec: per_second(counters.restored, elapsed),
            concurrency: self.ceiling(),
            error_rate: self.error_rate(),
            elapsed_secs: elapsed,
        }
    }

    pub fn summary(&self) -> RunSummary {
        let counters = self.counters();
        let elapsed = self.elapsed().as_secs_f64();
        RunSummary {
            restored: counters.restored,
            failed: counters.failed,
            elapsed_secs: elapsed,
            throughput: per_second(counters.restored, elapsed),
        }
    }
}

fn per_second(count: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        count as f64 / elapsed_secs
    } else {
        0.0
    }
}
