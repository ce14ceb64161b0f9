mod classify;

pub use classify::{ErrorClassifier, FailureKind};

use crate::{
    models::{DeletedItem, ItemOutcome},
    network::RestoreTarget,
    state::RunState,
};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::warn;

/// Performs one gated restore call and records its outcome.
#[derive(Clone)]
pub struct RestoreWorker {
    target: Arc<dyn RestoreTarget>,
    state: Arc<RunState>,
    classifier: Arc<ErrorClassifier>,
}

impl RestoreWorker {
    pub fn new(
        target: Arc<dyn RestoreTarget>,
        state: Arc<RunState>,
        classifier: ErrorClassifier,
    ) -> Self {
        Self {
            target,
            state,
            classifier: Arc::new(classifier),
        }
    }

    pub async fn restore_item(&self, item: &DeletedItem) -> ItemOutcome {
        // Held until this function returns or unwinds.
        let _permit = self.state.dispatcher().acquire().await;

        match self.target.undelete(&item.path, &item.deletion_id).await {
            Ok(()) => {
                self.state.record_restored();
                ItemOutcome::Restored
            }
            Err(err) => match self.classifier.classify(&err) {
                FailureKind::Conflict => ItemOutcome::AlreadyRestored,
                kind => {
                    self.state
                        .record_failure(kind == FailureKind::Server, Instant::now());
                    warn!(path = %item.path, kind = ?kind, error = %err, "failed to restore");
                    ItemOutcome::Failed(kind)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::RestoreConfig, error::StorageError, models::Counters};
    use async_trait::async_trait;

    struct Fixed(Result<(), StorageError>);

    #[async_trait]
    impl RestoreTarget for Fixed {
        async fn undelete(&self, _path: &str, _deletion_id: &str) -> Result<(), StorageError> {
            self.0.clone()
        }
    }

    fn worker(result: Result<(), StorageError>) -> (RestoreWorker, Arc<RunState>) {
        let state = Arc::new(RunState::new(&RestoreConfig::default()));
        let worker = RestoreWorker::new(
            Arc::new(Fixed(result)),
            state.clone(),
            ErrorClassifier::default(),
        );
        (worker, state)
    }

    #[tokio::test]
    async fn success_counts_restored() {
        let (worker, state) = worker(Ok(()));
        let outcome = worker.restore_item(&DeletedItem::new("a/b", "1")).await;
        assert_eq!(outcome, ItemOutcome::Restored);
        assert_eq!(state.counters(), Counters { restored: 1, failed: 0 });
        assert_eq!(state.dispatcher().in_flight(), 0);
    }

    #[tokio::test]
    async fn conflict_is_benign() {
        let (worker, state) = worker(Err(StorageError::new(
            Some(409),
            Some("BlobAlreadyExists"),
            "409 Conflict",
        )));
        let outcome = worker.restore_item(&DeletedItem::new("a", "1")).await;
        assert_eq!(outcome, ItemOutcome::AlreadyRestored);
        assert_eq!(state.counters(), Counters::default());
        assert_eq!(state.window_len(), 0);
        assert_eq!(state.dispatcher().in_flight(), 0);
    }

    #[tokio::test]
    async fn server_error_counts_and_marks_last_error() {
        let (worker, state) = worker(Err(StorageError::new(
            Some(503),
            None,
            "503 Service Unavailable",
        )));
        let outcome = worker.restore_item(&DeletedItem::new("a", "1")).await;
        assert_eq!(outcome, ItemOutcome::Failed(FailureKind::Server));
        assert_eq!(state.counters().failed, 1);
        assert_eq!(state.error_rate(), 1.0);
        assert!(state.concurrency().last_server_error.is_some());
    }

    #[tokio::test]
    async fn other_error_is_recorded_without_backoff_signal() {
        let (worker, state) = worker(Err(StorageError::new(Some(403), None, "403 Forbidden")));
        let outcome = worker.restore_item(&DeletedItem::new("a", "1")).await;
        assert_eq!(outcome, ItemOutcome::Failed(FailureKind::Other));
        assert_eq!(state.counters().failed, 1);
        assert_eq!(state.window_len(), 1);
        assert_eq!(state.error_rate(), 0.0);
        assert!(state.concurrency().last_server_error.is_none());
    }
}
