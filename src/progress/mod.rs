//! Progress reporting.
//!
//! Sinks only observe the run; nothing they do feeds back into scheduling.

use crate::models::{BatchReport, ItemProgress, RunSummary};
use parking_lot::RwLock;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

pub trait ProgressSink: Send + Sync {
    fn item_completed(&self, progress: &ItemProgress);

    fn batch_finished(&self, report: &BatchReport);

    fn run_finished(&self, _summary: &RunSummary) {}
}

impl<T: ProgressSink + ?Sized> ProgressSink for Arc<T> {
    fn item_completed(&self, progress: &ItemProgress) {
        (**self).item_completed(progress)
    }

    fn batch_finished(&self, report: &BatchReport) {
        (**self).batch_finished(report)
    }

    fn run_finished(&self, summary: &RunSummary) {
        (**self).run_finished(summary)
    }
}

impl<A: ProgressSink, B: ProgressSink> ProgressSink for (A, B) {
    fn item_completed(&self, progress: &ItemProgress) {
        self.0.item_completed(progress);
        self.1.item_completed(progress);
    }

    fn batch_finished(&self, report: &BatchReport) {
        self.0.batch_finished(report);
        self.1.batch_finished(report);
    }

    fn run_finished(&self, summary: &RunSummary) {
        self.0.run_finished(summary);
        self.1.run_finished(summary);
    }
}

/// Writes progress to the tracing subscriber.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn item_completed(&self, p: &ItemProgress) {
        debug!(
            completed = p.completed,
            total = p.total,
            speed = %format!("{:.2} it/s", p.items_per_sec),
            eta = %format_elapsed(Duration::from_secs_f64(p.eta_secs)),
            error_rate = %format!("{:.1}%", p.error_rate * 100.0),
            "item completed"
        );
    }

    fn batch_finished(&self, r: &BatchReport) {
        info!(
            "Batch {}/{} - Restored: {} - Failed: {} - Ops/sec: {:.2} - Concurrency: {} - Error Rate: {:.1}% - Elapsed: {}",
            r.batch,
            r.batches,
            r.restored,
            r.failed,
            r.ops_per_sec,
            r.concurrency,
            r.error_rate * 100.0,
            format_elapsed(Duration::from_secs_f64(r.elapsed_secs)),
        );
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub progress: Option<ItemProgress>,
    pub last_batch: Option<BatchReport>,
    pub summary: Option<RunSummary>,
}

/// Keeps the latest snapshot for the status endpoint.
#[derive(Debug, Default)]
pub struct StatusBoard {
    snapshot: RwLock<StatusSnapshot>,
}

impl StatusBoard {
    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot.read().clone()
    }
}

impl ProgressSink for StatusBoard {
    fn item_completed(&self, progress: &ItemProgress) {
        self.snapshot.write().progress = Some(progress.clone());
    }

    fn batch_finished(&self, report: &BatchReport) {
        self.snapshot.write().last_batch = Some(report.clone());
    }

    fn run_finished(&self, summary: &RunSummary) {
        self.snapshot.write().summary = Some(summary.clone());
    }
}

/// `HH:MM:SS`, hours unbounded.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_elapsed_time() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(3723)), "01:02:03");
        assert_eq!(format_elapsed(Duration::from_secs(100 * 3600)), "100:00:00");
    }

    #[test]
    fn board_keeps_latest_values() {
        let board = Arc::new(StatusBoard::default());
        let sink: (LogProgress, Arc<StatusBoard>) = (LogProgress, board.clone());

        for completed in 1..=2 {
            sink.item_completed(&ItemProgress {
                completed,
                total: 2,
                items_per_sec: 1.0,
                eta_secs: 0.0,
                error_rate: 0.0,
            });
        }
        sink.run_finished(&RunSummary {
            restored: 2,
            failed: 0,
            elapsed_secs: 2.0,
            throughput: 1.0,
        });

        let snapshot = board.snapshot();
        assert_eq!(snapshot.progress.map(|p| p.completed), Some(2));
        assert!(snapshot.last_batch.is_none());
        assert_eq!(snapshot.summary.map(|s| s.restored), Some(2));
    }
}
