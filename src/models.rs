use crate::restore::FailureKind;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// A `{name, deletion_id}` pair as returned by the listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedPath {
    pub name: String,
    pub deletion_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedItem {
    pub path: String,
    pub deletion_id: String,
    pub depth: usize,
}

impl DeletedItem {
    pub fn new(path: impl Into<String>, deletion_id: impl Into<String>) -> Self {
        let path = path.into();
        let depth = path.split('/').count();
        Self {
            path,
            deletion_id: deletion_id.into(),
            depth,
        }
    }
}

impl From<DeletedPath> for DeletedItem {
    fn from(entry: DeletedPath) -> Self {
        Self::new(entry.name, entry.deletion_id)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OutcomeEvent {
    pub at: Instant,
    pub is_server_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Restored,
    AlreadyRestored,
    Failed(FailureKind),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub restored: u64,
    pub failed: u64,
}

/// Per-item progress, emitted in completion order.
#[derive(Debug, Clone, Serialize)]
pub struct ItemProgress {
    pub completed: usize,
    pub total: usize,
    pub items_per_sec: f64,
    pub eta_secs: f64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch: usize,
    pub batches: usize,
    pub restored: u64,
    pub failed: u64,
    pub ops_per_sec: f64,
    pub concurrency: usize,
    pub error_rate: f64,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub restored: u64,
    pub failed: u64,
    pub elapsed_secs: f64,
    pub throughput: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_counts_path_segments() {
        assert_eq!(DeletedItem::new("top", "1").depth, 1);
        assert_eq!(DeletedItem::new("a/b/c.txt", "1").depth, 3);
    }
}
