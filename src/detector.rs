//! Content-hash change detection for one watched folder.
//!
//! The [`ChangeDetector`] owns the authoritative path → digest map and turns
//! two kinds of input into [`ChangeEvent`]s:
//!
//! - **Startup reconciliation** ([`ChangeDetector::reconcile`]): diff the
//!   persisted map against a fresh walk of the folder. This is what catches
//!   changes made while nothing was watching.
//! - **Runtime notifications** ([`ChangeDetector::handle`]): classify a
//!   single filesystem notification by re-hashing the path.
//!
//! Both paths take the same mutex, persist the map before returning, and
//! hand events back only after the lock is released. Files that cannot be
//! read are never recorded and never reported as deleted.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::WatchConfig;
use crate::error::SyncError;
use crate::filter::PathFilter;
use crate::hash_store::HashStore;
use crate::hasher::try_hash_file;

/// One detected change. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Added(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    /// Something under this path changed but the detector cannot say what.
    Unknown(PathBuf),
}

impl ChangeEvent {
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Added(p)
            | ChangeEvent::Modified(p)
            | ChangeEvent::Deleted(p)
            | ChangeEvent::Unknown(p) => p,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Added(_) => "added",
            ChangeEvent::Modified(_) => "modified",
            ChangeEvent::Deleted(_) => "deleted",
            ChangeEvent::Unknown(_) => "unknown",
        }
    }
}

/// Receives detected changes, once per change, in detection order.
pub trait ChangeHandler: Send + Sync {
    fn on_change(&self, event: ChangeEvent);
}

impl<F> ChangeHandler for F
where
    F: Fn(ChangeEvent) + Send + Sync,
{
    fn on_change(&self, event: ChangeEvent) {
        self(event)
    }
}

/// A filesystem notification reduced to what the detector needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The path was created or written.
    Upsert(PathBuf),
    /// The path no longer exists.
    Remove(PathBuf),
    /// The backend dropped events; the whole tree must be re-examined.
    Rescan,
}

/// Change detector for one folder. Cloning shares the same map and lock.
#[derive(Clone)]
pub struct ChangeDetector {
    root: PathBuf,
    filter: Arc<PathFilter>,
    store: Arc<Mutex<HashStore>>,
}

impl ChangeDetector {
    /// Open a detector over `root`, creating the directory if needed and
    /// loading the persisted map (or starting empty).
    pub fn open(root: &Path, watch: &WatchConfig) -> Result<Self, SyncError> {
        let io_err = |source| SyncError::TransientIo {
            path: root.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(root).map_err(io_err)?;
        let root = root.canonicalize().map_err(io_err)?;

        let filter = PathFilter::new(&root, watch)?;
        let store = HashStore::load(root.join(&watch.hash_file));
        tracing::debug!(
            root = %root.display(),
            tracked = store.len(),
            "opened change detector"
        );

        Ok(Self {
            root,
            filter: Arc::new(filter),
            store: Arc::new(Mutex::new(store)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    /// Number of files currently tracked.
    pub fn tracked(&self) -> usize {
        self.lock().len()
    }

    /// Digest recorded for `path`, if tracked.
    pub fn digest(&self, path: &Path) -> Option<String> {
        self.lock().get(path).map(str::to_string)
    }

    fn lock(&self) -> MutexGuard<'_, HashStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Diff the persisted map against the folder as it is now.
    ///
    /// Returns added files, then modified, then deleted, each sorted by
    /// path. The updated map is persisted before this returns.
    pub fn reconcile(&self) -> Vec<ChangeEvent> {
        let mut store = self.lock();
        let events = self.diff_locked(&mut store, &self.root, DiffScope::Everything);
        if !events.is_empty() {
            persist(&store);
        }
        events
    }

    /// Classify one runtime notification.
    pub fn handle(&self, notification: Notification) -> Vec<ChangeEvent> {
        let mut store = self.lock();
        let events = match notification {
            Notification::Upsert(path) => self.upsert_locked(&mut store, &path),
            Notification::Remove(path) => self.remove_locked(&mut store, &path),
            Notification::Rescan => {
                let mut events = self.diff_locked(&mut store, &self.root, DiffScope::Everything);
                events.push(ChangeEvent::Unknown(self.root.clone()));
                events
            }
        };
        if events
            .iter()
            .any(|e| !matches!(e, ChangeEvent::Unknown(_)))
        {
            persist(&store);
        }
        events
    }

    /// Startup-style diff of the files under `dir` against the map.
    ///
    /// With [`DiffScope::Everything`] every recorded path that is not on disk
    /// any more is deleted, including rows left behind by a previous root.
    fn diff_locked(&self, store: &mut HashStore, dir: &Path, scope: DiffScope) -> Vec<ChangeEvent> {
        let mut current: BTreeMap<PathBuf, String> = BTreeMap::new();
        let mut unreadable: BTreeSet<PathBuf> = BTreeSet::new();

        for path in self.filter.walk_files(dir) {
            match try_hash_file(&path) {
                Some(digest) => {
                    current.insert(path, digest);
                }
                None => {
                    unreadable.insert(path);
                }
            }
        }

        let mut added = Vec::new();
        let mut modified = Vec::new();
        for (path, digest) in &current {
            match store.get(path) {
                None => added.push(ChangeEvent::Added(path.clone())),
                Some(old) if old != digest => modified.push(ChangeEvent::Modified(path.clone())),
                Some(_) => {}
            }
        }

        let deleted: Vec<PathBuf> = store
            .entries()
            .keys()
            .filter(|p| scope == DiffScope::Everything || p.starts_with(dir))
            .filter(|p| !current.contains_key(*p) && !unreadable.contains(*p))
            .cloned()
            .collect();

        for path in &deleted {
            store.remove(path);
        }
        for (path, digest) in current {
            store.insert(path, digest);
        }

        let mut events = added;
        events.extend(modified);
        events.extend(deleted.into_iter().map(ChangeEvent::Deleted));
        events
    }

    fn upsert_locked(&self, store: &mut HashStore, path: &Path) -> Vec<ChangeEvent> {
        if self.filter.is_ignored(path) {
            return Vec::new();
        }
        if path.is_dir() {
            // A directory moved in from elsewhere arrives as one event.
            return self.diff_locked(store, path, DiffScope::Subtree);
        }

        let digest = match try_hash_file(path) {
            Some(d) => d,
            None => return Vec::new(),
        };

        match store.insert(path.to_path_buf(), digest.clone()) {
            None => vec![ChangeEvent::Added(path.to_path_buf())],
            Some(old) if old != digest => vec![ChangeEvent::Modified(path.to_path_buf())],
            Some(_) => Vec::new(),
        }
    }

    fn remove_locked(&self, store: &mut HashStore, path: &Path) -> Vec<ChangeEvent> {
        if self.filter.is_ignored(path) {
            return Vec::new();
        }
        if store.remove(path).is_some() {
            return vec![ChangeEvent::Deleted(path.to_path_buf())];
        }

        // Untracked path: either unknown, or a directory whose files are
        // tracked individually.
        let children = store.paths_under(path);
        for child in &children {
            store.remove(child);
        }
        children.into_iter().map(ChangeEvent::Deleted).collect()
    }
}

/// Which recorded paths a diff may report as deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiffScope {
    /// Every path in the map.
    Everything,
    /// Only paths under the walked directory.
    Subtree,
}

fn persist(store: &HashStore) {
    if let Err(e) = store.save() {
        tracing::warn!(error = %e, "failed to persist hash map, keeping in-memory state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn open(dir: &Path) -> ChangeDetector {
        ChangeDetector::open(dir, &WatchConfig::new(dir)).unwrap()
    }

    #[test]
    fn test_open_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("watched");
        let detector = open(&root);
        assert!(root.is_dir());
        assert_eq!(detector.tracked(), 0);
    }

    #[test]
    fn test_upsert_classification() {
        let dir = tempfile::tempdir().unwrap();
        let detector = open(dir.path());
        let path = detector.root().join("a.txt");

        fs::write(&path, "hello").unwrap();
        assert_eq!(
            detector.handle(Notification::Upsert(path.clone())),
            vec![ChangeEvent::Added(path.clone())]
        );

        fs::write(&path, "hello").unwrap();
        assert!(detector.handle(Notification::Upsert(path.clone())).is_empty());

        fs::write(&path, "hello world").unwrap();
        assert_eq!(
            detector.handle(Notification::Upsert(path.clone())),
            vec![ChangeEvent::Modified(path.clone())]
        );
    }

    #[test]
    fn test_remove_untracked_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let detector = open(dir.path());
        let path = detector.root().join("never-seen.txt");
        assert!(detector.handle(Notification::Remove(path)).is_empty());
    }

    #[test]
    fn test_remove_directory_deletes_children() {
        let dir = tempfile::tempdir().unwrap();
        let detector = open(dir.path());
        let sub = detector.root().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("a.txt"), "a").unwrap();
        fs::write(sub.join("b.txt"), "b").unwrap();
        assert_eq!(detector.reconcile().len(), 2);

        fs::remove_dir_all(&sub).unwrap();
        let events = detector.handle(Notification::Remove(sub.clone()));
        assert_eq!(
            events,
            vec![
                ChangeEvent::Deleted(sub.join("a.txt")),
                ChangeEvent::Deleted(sub.join("b.txt")),
            ]
        );
        assert_eq!(detector.tracked(), 0);
    }

    #[test]
    fn test_directory_moved_in_reports_its_files() {
        let dir = tempfile::tempdir().unwrap();
        let detector = open(dir.path());
        let sub = detector.root().join("incoming");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("x.md"), "x").unwrap();

        let events = detector.handle(Notification::Upsert(sub.clone()));
        assert_eq!(events, vec![ChangeEvent::Added(sub.join("x.md"))]);
    }

    #[test]
    fn test_ignored_names_produce_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let detector = open(dir.path());
        let root = detector.root().to_path_buf();
        for name in ["file_hashes.csv", "file_hashes.csv.tmp", "x.tmp", "~$doc.docx"] {
            let p = root.join(name);
            fs::write(&p, "data").unwrap();
            assert!(detector.handle(Notification::Upsert(p)).is_empty(), "{}", name);
        }
        assert!(detector.reconcile().is_empty());
    }

    #[test]
    fn test_rescan_emits_diff_then_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let detector = open(dir.path());
        let path = detector.root().join("a.txt");
        fs::write(&path, "a").unwrap();

        let events = detector.handle(Notification::Rescan);
        assert_eq!(
            events,
            vec![
                ChangeEvent::Added(path),
                ChangeEvent::Unknown(detector.root().to_path_buf()),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_tracked_file_is_not_deleted() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let detector = open(dir.path());
        let path = detector.root().join("locked.txt");
        fs::write(&path, "secret").unwrap();
        assert_eq!(detector.reconcile().len(), 1);

        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();
        // Root can read anything; only assert when the file really is unreadable.
        if fs::read(&path).is_err() {
            assert!(detector.reconcile().is_empty());
            assert!(detector.digest(&path).is_some());
        }
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
    }
}
