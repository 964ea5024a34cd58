//! Bounded queue between the change detector and the reconciler.
//!
//! The detector pushes [`ChangeEvent`]s through a [`QueueSender`]; a single
//! [`ReconcileWorker`] task drains them in order and applies the matching
//! scan. When the queue is full the detector blocks, which is the
//! backpressure the watch loop relies on.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::detector::{ChangeEvent, ChangeHandler};
use crate::reconcile::{IndexReconciler, ScanType};

/// Scan applied for each kind of change.
pub fn scan_for(event: &ChangeEvent) -> ScanType {
    match event {
        ChangeEvent::Added(_) | ChangeEvent::Modified(_) => ScanType::Modify,
        ChangeEvent::Deleted(_) => ScanType::Remove,
        ChangeEvent::Unknown(_) => ScanType::Full,
    }
}

/// Producer side of the queue. Implements [`ChangeHandler`].
#[derive(Clone)]
pub struct QueueSender {
    tx: mpsc::Sender<ChangeEvent>,
}

impl ChangeHandler for QueueSender {
    /// Blocks while the queue is full. Must be called off the async
    /// runtime (the watch loop calls handlers from the blocking pool).
    fn on_change(&self, event: ChangeEvent) {
        if let Err(e) = self.tx.blocking_send(event) {
            tracing::warn!(path = %e.0.path().display(), "reconcile worker gone, dropping change");
        }
    }
}

/// Single consumer applying queued changes one at a time.
pub struct ReconcileWorker {
    task: JoinHandle<WorkerStats>,
}

/// Totals for a worker's lifetime.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub applied: usize,
    pub failed: usize,
    pub inserted: usize,
    pub deleted: usize,
}

impl ReconcileWorker {
    /// Spawn the worker. It runs until every [`QueueSender`] is dropped
    /// and the queue is drained.
    pub fn spawn(reconciler: Arc<IndexReconciler>, capacity: usize) -> (QueueSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(run_worker(reconciler, rx));
        (QueueSender { tx }, Self { task })
    }

    /// Wait for the queue to drain and the worker to exit.
    pub async fn join(self) -> WorkerStats {
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "reconcile worker ended abnormally");
                WorkerStats::default()
            }
        }
    }
}

async fn run_worker(
    reconciler: Arc<IndexReconciler>,
    mut rx: mpsc::Receiver<ChangeEvent>,
) -> WorkerStats {
    let mut stats = WorkerStats::default();

    while let Some(event) = rx.recv().await {
        let scan = scan_for(&event);
        let path: PathBuf = event.path().to_path_buf();

        match reconciler.apply(scan, &path).await {
            Ok(report) => {
                stats.applied += 1;
                stats.inserted += report.inserted;
                stats.deleted += report.deleted;
            }
            Err(e) => {
                stats.failed += 1;
                tracing::error!(
                    kind = event.kind(),
                    scan = %scan,
                    path = %path.display(),
                    error = %e,
                    "failed to apply change"
                );
            }
        }
    }

    tracing::debug!(applied = stats.applied, failed = stats.failed, "reconcile worker finished");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_mapping() {
        let p = PathBuf::from("/w/a.txt");
        assert_eq!(scan_for(&ChangeEvent::Added(p.clone())), ScanType::Modify);
        assert_eq!(scan_for(&ChangeEvent::Modified(p.clone())), ScanType::Modify);
        assert_eq!(scan_for(&ChangeEvent::Deleted(p.clone())), ScanType::Remove);
        assert_eq!(scan_for(&ChangeEvent::Unknown(p)), ScanType::Full);
    }
}
