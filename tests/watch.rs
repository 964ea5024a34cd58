//! Live watching: OS notifications flowing through the detector, the queue
//! and the reconcile worker into an index.
//!
//! Filesystem notification latency varies by platform, so every assertion
//! polls with a generous deadline instead of sleeping a fixed time.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use docsync::chunk::ChunkParams;
use docsync::config::WatchConfig;
use docsync::detector::{ChangeDetector, ChangeEvent};
use docsync::embedding::NoopProvider;
use docsync::reconcile::{source_key, IndexReconciler};
use docsync::store::memory::InMemoryIndexStore;
use docsync::store::IndexStore;
use docsync::worker::ReconcileWorker;

const DEADLINE: Duration = Duration::from_secs(10);

async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < DEADLINE {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

fn open(root: &Path) -> ChangeDetector {
    ChangeDetector::open(root, &WatchConfig::new(root)).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn startup_and_live_changes_reach_the_handler() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("before.txt"), "written while stopped").unwrap();

    let detector = open(tmp.path());
    let root = detector.root().to_path_buf();
    let seen: Arc<Mutex<Vec<ChangeEvent>>> = Arc::default();
    let handler = {
        let seen = seen.clone();
        move |event: ChangeEvent| seen.lock().unwrap().push(event)
    };

    let handle = detector.clone().start(Arc::new(handler)).await.unwrap();

    // Startup reconciliation is delivered before start returns.
    assert_eq!(
        seen.lock().unwrap().clone(),
        vec![ChangeEvent::Added(root.join("before.txt"))]
    );

    let live = root.join("live.txt");
    fs::write(&live, "hello").unwrap();
    assert!(
        eventually(|| seen
            .lock()
            .unwrap()
            .contains(&ChangeEvent::Added(live.clone())))
        .await,
        "no Added event for {}",
        live.display()
    );

    fs::remove_file(&live).unwrap();
    assert!(
        eventually(|| seen
            .lock()
            .unwrap()
            .contains(&ChangeEvent::Deleted(live.clone())))
        .await,
        "no Deleted event for {}",
        live.display()
    );

    handle.stop().await;
    assert!(detector.digest(&live).is_none());
    assert!(detector.digest(&root.join("before.txt")).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watched_folder_keeps_index_in_sync() {
    let tmp = TempDir::new().unwrap();
    let detector = open(tmp.path());
    let root = detector.root().to_path_buf();

    let store = Arc::new(InMemoryIndexStore::new());
    let reconciler = Arc::new(IndexReconciler::new(
        store.clone(),
        Arc::new(NoopProvider::with_dims(4)),
        ChunkParams::default(),
    ));
    let (sender, worker) = ReconcileWorker::spawn(reconciler, 8);
    let handle = detector.clone().start(Arc::new(sender)).await.unwrap();

    let doc = root.join("notes.md");
    let key = source_key(&doc);
    fs::write(&doc, "# Title\n\nfirst version").unwrap();

    let indexed = |text: &'static str| {
        let store = store.clone();
        let id = format!("{}:0:0", key);
        move || store.get(&id).map(|e| e.text.contains(text)).unwrap_or(false)
    };
    assert!(eventually(indexed("first version")).await);

    fs::write(&doc, "# Title\n\nsecond version").unwrap();
    assert!(eventually(indexed("second version")).await);

    fs::remove_file(&doc).unwrap();
    let gone = {
        let store = store.clone();
        let id = format!("{}:0:0", key);
        move || store.get(&id).is_none()
    };
    assert!(eventually(gone).await);

    handle.stop().await;
    let stats = worker.join().await;
    assert!(stats.applied >= 3);
    assert_eq!(store.count().await.unwrap(), 0);
}
