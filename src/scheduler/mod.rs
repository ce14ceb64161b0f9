use crate::{
    config::RestoreConfig,
    control::ConcurrencyController,
    error::RestoreError,
    models::{DeletedItem, RunSummary},
    network::DeletedPathSource,
    progress::ProgressSink,
    restore::RestoreWorker,
    state::RunState,
};
use futures::TryStreamExt;
use std::sync::Arc;
use tokio::{sync::oneshot, task::JoinSet};
use tracing::{error, info, warn};

/// Drain the listing into items. Any listing failure is fatal.
pub async fn collect_items(
    source: &dyn DeletedPathSource,
) -> Result<Vec<DeletedItem>, RestoreError> {
    source
        .deleted_paths()
        .map_ok(DeletedItem::from)
        .try_collect()
        .await
        .map_err(RestoreError::Listing)
}

/// Stable sort, so equal depths keep listing order.
pub fn sort_by_depth(items: &mut [DeletedItem]) {
    items.sort_by_key(|item| item.depth);
}

/// A third of the items per batch, clamped to `[min, max]`.
///
/// Panics if `min > max`; `RestoreConfig::validate` rules that out.
pub fn batch_size(total: usize, min: usize, max: usize) -> usize {
    (total / 3).clamp(min, max)
}

pub fn build_batch_plan(items: Vec<DeletedItem>, min: usize, max: usize) -> Vec<Vec<DeletedItem>> {
    if items.is_empty() {
        return Vec::new();
    }
    let size = batch_size(items.len(), min, max);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut rest = items;
    while rest.len() > size {
        let tail = rest.split_off(size);
        batches.push(rest);
        rest = tail;
    }
    batches.push(rest);
    batches
}

pub struct BatchScheduler {
    worker: RestoreWorker,
    state: Arc<RunState>,
    progress: Arc<dyn ProgressSink>,
    config: RestoreConfig,
}

impl BatchScheduler {
    /// Fails when `config` does not validate, so `run` never sees unusable
    /// batch or concurrency bounds.
    pub fn new(
        worker: RestoreWorker,
        state: Arc<RunState>,
        progress: Arc<dyn ProgressSink>,
        config: RestoreConfig,
    ) -> Result<Self, RestoreError> {
        config.validate()?;
        Ok(Self {
            worker,
            state,
            progress,
            config,
        })
    }

    /// Restore every item, one batch at a time, while the controller retunes
    /// the dispatcher in the background.
    pub async fn run(&self, mut items: Vec<DeletedItem>) -> RunSummary {
        sort_by_depth(&mut items);
        let total = items.len();
        let batches = build_batch_plan(
            items,
            self.config.min_batch_size,
            self.config.max_batch_size,
        );
        let batch_count = batches.len();
        info!(total, batches = batch_count, "processing deleted items");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let controller =
            ConcurrencyController::new(self.state.clone(), &self.config).spawn(shutdown_rx);

        let mut completed = 0;
        for (index, batch) in batches.into_iter().enumerate() {
            let mut tasks = JoinSet::new();
            for item in batch {
                let worker = self.worker.clone();
                tasks.spawn(async move { worker.restore_item(&item).await });
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined {
                    error!(error = %err, "restore task aborted");
                    self.state.record_fault();
                }
                completed += 1;
                self.progress
                    .item_completed(&self.state.item_progress(completed, total));
            }

            self.progress
                .batch_finished(&self.state.batch_report(index + 1, batch_count));
        }

        if shutdown_tx.send(()).is_err() {
            warn!("concurrency controller exited before the run finished");
        }
        if let Err(err) = controller.await {
            warn!(error = %err, "concurrency controller task failed");
        }

        let summary = self.state.summary();
        self.progress.run_finished(&summary);
        summary
    }
}
