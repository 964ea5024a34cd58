//! `docsync watch`: keep the index in sync with the watched folder until
//! interrupted.
//!
//! Startup order:
//! 1. `full` scan of the root, which picks up anything a previous run
//!    detected but never applied;
//! 2. spawn the reconcile worker;
//! 3. open the change detector and start watching (startup reconciliation
//!    events go through the worker like any other change).
//!
//! Ctrl-C stops the watcher, lets the worker drain its queue, then exits.
//! If the watch loop ends on its own the command drains the queue and exits
//! without waiting for Ctrl-C.

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::detector::ChangeDetector;
use crate::embedding::ProviderRegistry;
use crate::reconcile::IndexReconciler;
use crate::sqlite_store::SqliteIndexStore;
use crate::worker::ReconcileWorker;

pub async fn run_watch(config: &Config, profile: Option<&str>, initial_scan: bool) -> Result<()> {
    let profile = config.embedding.resolve(profile)?;
    let embedder = ProviderRegistry::with_builtins().create(profile)?;
    let store = SqliteIndexStore::open(&config.index.path).await?;

    let reconciler = Arc::new(
        IndexReconciler::new(Arc::new(store), embedder, config.chunking)
            .with_batch_size(config.embedding.batch_size)
            .with_watch_config(config.watch.clone()),
    );

    let detector = ChangeDetector::open(&config.watch.root, &config.watch)?;

    if initial_scan {
        let report = reconciler.full(detector.root()).await?;
        println!("Initial scan: {}", report);
    }

    let (sender, worker) = ReconcileWorker::spawn(reconciler, config.watch.queue_capacity);
    let handle = detector.clone().start(Arc::new(sender)).await?;

    println!(
        "Watching {} ({} files tracked). Press Ctrl-C to stop.",
        detector.root().display(),
        detector.tracked()
    );

    match handle.stop_on(tokio::signal::ctrl_c()).await {
        Some(signal) => {
            signal?;
            println!("Stopping...");
        }
        None => tracing::warn!("watch loop ended unexpectedly, draining queued changes"),
    }

    let stats = worker.join().await;
    println!(
        "Applied {} changes ({} failed): {} entries inserted, {} deleted.",
        stats.applied, stats.failed, stats.inserted, stats.deleted
    );

    Ok(())
}
