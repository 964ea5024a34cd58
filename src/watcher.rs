//! Live folder watching.
//!
//! [`ChangeDetector::start`] subscribes to OS notifications for the root,
//! runs the startup reconciliation, then classifies every notification on
//! the blocking pool and forwards the resulting [`ChangeEvent`]s to a
//! [`ChangeHandler`]. The returned [`WatchHandle`] stops the loop; the
//! notification subscription is dropped when the loop exits.
//!
//! The subscription is opened before the startup walk so nothing written
//! during the walk is missed. Anything seen twice is harmless: re-hashing an
//! already-recorded file produces no event.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Event, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::detector::{ChangeDetector, ChangeEvent, ChangeHandler, Notification};
use crate::error::SyncError;

/// Running watch loop.
pub struct WatchHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Token that stops the loop when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop watching. Any classification already in progress finishes and
    /// its events are delivered before this returns.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "watch task ended abnormally");
        }
    }

    /// Keep watching until `signal` completes, then stop as
    /// [`stop`](Self::stop) does and return the signal's output.
    ///
    /// If the loop ends first (cancelled elsewhere, or the notification
    /// backend went away) this returns `None` without waiting for `signal`.
    pub async fn stop_on<F: Future>(mut self, signal: F) -> Option<F::Output> {
        let output = tokio::select! {
            output = signal => Some(output),
            result = &mut self.task => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "watch task ended abnormally");
                }
                None
            }
        };
        if output.is_some() {
            self.stop().await;
        }
        output
    }
}

impl ChangeDetector {
    /// Start watching the root, delivering every change to `handler`.
    ///
    /// Returns once the startup reconciliation has been delivered.
    pub async fn start(self, handler: Arc<dyn ChangeHandler>) -> Result<WatchHandle, SyncError> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Receiver gone means the loop is shutting down.
            let _ = raw_tx.send(res);
        })?;
        watcher.watch(self.root(), RecursiveMode::Recursive)?;
        tracing::info!(root = %self.root().display(), "watching folder");

        let startup = {
            let detector = self.clone();
            let handler = handler.clone();
            tokio::task::spawn_blocking(move || {
                let events = detector.reconcile();
                let count = events.len();
                deliver(handler.as_ref(), events);
                count
            })
        };
        match startup.await {
            Ok(count) => tracing::info!(changes = count, "startup reconciliation complete"),
            Err(e) => tracing::error!(error = %e, "startup reconciliation failed"),
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(watch_loop(
            self,
            handler,
            watcher,
            raw_rx,
            cancel.clone(),
        ));

        Ok(WatchHandle { cancel, task })
    }
}

async fn watch_loop(
    detector: ChangeDetector,
    handler: Arc<dyn ChangeHandler>,
    watcher: notify::RecommendedWatcher,
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            msg = raw_rx.recv() => match msg {
                Some(Ok(event)) => {
                    for notification in convert_event(event) {
                        classify(&detector, &handler, notification).await;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "watch backend error");
                }
                None => break,
            },
        }
    }

    drop(watcher);
    tracing::info!(root = %detector.root().display(), "stopped watching folder");
}

async fn classify(
    detector: &ChangeDetector,
    handler: &Arc<dyn ChangeHandler>,
    notification: Notification,
) {
    let detector = detector.clone();
    let handler = handler.clone();
    let result = tokio::task::spawn_blocking(move || {
        let events = detector.handle(notification);
        deliver(handler.as_ref(), events);
    })
    .await;

    if let Err(e) = result {
        tracing::error!(error = %e, "change classification failed");
    }
}

fn deliver(handler: &dyn ChangeHandler, events: Vec<ChangeEvent>) {
    for event in events {
        tracing::debug!(kind = event.kind(), path = %event.path().display(), "change detected");
        handler.on_change(event);
    }
}

/// Reduce a notify event to detector notifications.
///
/// Renames become a remove of the old path plus an upsert of the new one.
/// When the backend cannot say what happened, the path's existence decides.
pub fn convert_event(event: Event) -> Vec<Notification> {
    if event.need_rescan() {
        return vec![Notification::Rescan];
    }

    let by_existence = |path: PathBuf| {
        if path.exists() {
            Notification::Upsert(path)
        } else {
            Notification::Remove(path)
        }
    };

    match event.kind {
        EventKind::Create(_) => event.paths.into_iter().map(Notification::Upsert).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.into_iter().map(Notification::Remove).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.into_iter().map(Notification::Upsert).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            let mut paths = event.paths.into_iter();
            let mut out = Vec::with_capacity(2);
            if let Some(from) = paths.next() {
                out.push(Notification::Remove(from));
            }
            if let Some(to) = paths.next() {
                out.push(Notification::Upsert(to));
            }
            out
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            event.paths.into_iter().map(by_existence).collect()
        }
        EventKind::Modify(_) => event.paths.into_iter().map(Notification::Upsert).collect(),
        EventKind::Remove(_) => event.paths.into_iter().map(Notification::Remove).collect(),
        EventKind::Access(_) => Vec::new(),
        EventKind::Any | EventKind::Other => event.paths.into_iter().map(by_existence).collect(),
    }
}
