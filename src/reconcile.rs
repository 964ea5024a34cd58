//! Index reconciliation: apply folder changes to the vector index.
//!
//! | Scan type | Effect |
//! |-----------|--------|
//! | `full` | load every document under a folder and insert chunks whose ids are absent; never deletes |
//! | `modify` | keep one source's unchanged entries, delete the rest, insert its missing chunks |
//! | `remove` | delete every entry of one source |
//! | `reset` | drop the whole index |
//!
//! Chunk ids are deterministic (`source:page:local_index`), so running
//! `full` twice over an unchanged folder inserts nothing the second time,
//! and `modify` on an unchanged file embeds nothing.
//!
//! Sources are identified by their absolute, symlink-resolved path. A file
//! that no longer exists is resolved through its parent directory.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use docsync_core::chunk::{chunk_segments, ChunkParams};
use docsync_core::models::{DocumentChunk, EntryMetadata, IndexEntry};
use docsync_core::store::IndexStore;

use crate::config::{Config, WatchConfig};
use crate::embedding::{EmbeddingProvider, NoopProvider, ProviderRegistry};
use crate::error::SyncError;
use crate::filter::PathFilter;
use crate::loader::DocumentLoader;
use crate::sqlite_store::SqliteIndexStore;

/// Which reconciliation to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    Full,
    Modify,
    Remove,
    Reset,
}

impl ScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanType::Full => "full",
            ScanType::Modify => "modify",
            ScanType::Remove => "remove",
            ScanType::Reset => "reset",
        }
    }

    fn needs_embedder(&self) -> bool {
        matches!(self, ScanType::Full | ScanType::Modify)
    }
}

impl FromStr for ScanType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(ScanType::Full),
            "modify" => Ok(ScanType::Modify),
            "remove" => Ok(ScanType::Remove),
            "reset" => Ok(ScanType::Reset),
            other => Err(SyncError::InvalidScanType(other.to_string())),
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one reconciliation did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub chunks: usize,
    pub inserted: usize,
    pub deleted: usize,
    /// Entries produced with different chunking parameters (`full` only).
    pub stale_entries: usize,
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "files loaded: {}, skipped: {}, chunks: {}, inserted: {}, deleted: {}",
            self.files_loaded, self.files_skipped, self.chunks, self.inserted, self.deleted
        )
    }
}

/// Applies scans to an [`IndexStore`].
///
/// Operations run sequentially; the store is expected to serialize its own
/// writes.
pub struct IndexReconciler {
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    loader: DocumentLoader,
    params: ChunkParams,
    batch_size: usize,
    watch: Option<WatchConfig>,
}

impl IndexReconciler {
    pub fn new(
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        params: ChunkParams,
    ) -> Self {
        Self {
            store,
            embedder,
            loader: DocumentLoader::new(),
            params,
            batch_size: 64,
            watch: None,
        }
    }

    /// Embed at most `n` chunks per provider call.
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n.max(1);
        self
    }

    /// Apply these filter settings when walking a folder in `full`.
    pub fn with_watch_config(mut self, watch: WatchConfig) -> Self {
        self.watch = Some(watch);
        self
    }

    pub fn params(&self) -> &ChunkParams {
        &self.params
    }

    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.store
    }

    /// Run one scan. `path` is a folder for `full`, a file for `modify` and
    /// `remove`, and ignored for `reset`.
    pub async fn apply(&self, scan: ScanType, path: &Path) -> Result<ReconcileReport, SyncError> {
        let report = match scan {
            ScanType::Full => self.full(path).await?,
            ScanType::Modify => self.modify(path).await?,
            ScanType::Remove => self.remove(path).await?,
            ScanType::Reset => {
                self.reset().await?;
                ReconcileReport::default()
            }
        };
        tracing::info!(
            scan = %scan,
            path = %path.display(),
            inserted = report.inserted,
            deleted = report.deleted,
            skipped = report.files_skipped,
            "reconciliation complete"
        );
        Ok(report)
    }

    /// Drop every entry. Irreversible; no confirmation at this layer.
    pub async fn reset(&self) -> Result<(), SyncError> {
        self.store.reset().await.map_err(SyncError::index)?;
        tracing::warn!("index reset");
        Ok(())
    }

    /// Load every document under `dir` and insert the chunks not yet
    /// indexed. Per-file load failures are logged and skipped.
    pub async fn full(&self, dir: &Path) -> Result<ReconcileReport, SyncError> {
        if !dir.is_dir() {
            return Err(SyncError::TransientIo {
                path: dir.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "full scan expects a directory",
                ),
            });
        }

        let watch = self
            .watch
            .clone()
            .unwrap_or_else(|| WatchConfig::new(dir));
        let filter = PathFilter::new(dir, &watch)?;

        let mut report = ReconcileReport::default();
        let mut chunks = Vec::new();
        for path in filter.walk_files(dir) {
            match self.load_chunks(&path) {
                Ok(mut doc_chunks) => {
                    report.files_loaded += 1;
                    chunks.append(&mut doc_chunks);
                }
                Err(e @ SyncError::UnsupportedFormat(_)) => {
                    tracing::debug!(error = %e, "skipping file");
                    report.files_skipped += 1;
                }
                Err(e) if e.is_per_file() => {
                    tracing::warn!(error = %e, "skipping file");
                    report.files_skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        report.chunks = chunks.len();

        let entries = self.store.list_entries().await.map_err(SyncError::index)?;
        let fingerprint = self.params.fingerprint();
        report.stale_entries = entries
            .iter()
            .filter(|e| e.metadata.chunking != fingerprint)
            .count();
        if report.stale_entries > 0 {
            tracing::warn!(
                stale = report.stale_entries,
                current = %fingerprint,
                "index holds entries built with other chunking parameters; run reset then full to rebuild"
            );
        }

        let existing: HashSet<String> = entries.into_iter().map(|e| e.id).collect();
        report.inserted = self.insert_absent(chunks, &existing).await?;
        Ok(report)
    }

    /// Bring one document's entries in line with its current chunks.
    ///
    /// Entries whose id, text and chunking fingerprint all match a fresh
    /// chunk are kept as they are; every other entry of the source is
    /// deleted and the missing chunks are embedded and inserted.
    pub async fn modify(&self, path: &Path) -> Result<ReconcileReport, SyncError> {
        let chunks = self.load_chunks(path)?;
        let source = source_key(path);

        let mut report = ReconcileReport {
            files_loaded: 1,
            chunks: chunks.len(),
            ..Default::default()
        };

        let fingerprint = self.params.fingerprint();
        let outdated: Vec<String> = {
            let current: HashMap<&str, &str> = chunks
                .iter()
                .map(|c| (c.id.as_str(), c.text.as_str()))
                .collect();
            self.store
                .chunks_for_source(&source)
                .await
                .map_err(SyncError::index)?
                .into_iter()
                .filter(|stored| {
                    stored.chunking != fingerprint
                        || current.get(stored.id.as_str()) != Some(&stored.text.as_str())
                })
                .map(|stored| stored.id)
                .collect()
        };
        if !outdated.is_empty() {
            self.store.delete(&outdated).await.map_err(SyncError::index)?;
            tracing::debug!(source = %source, deleted = outdated.len(), "deleted outdated entries");
        }
        report.deleted = outdated.len();

        // Fetched after the delete so replaced ids are not mistaken for
        // existing ones.
        let existing = self.store.existing_ids().await.map_err(SyncError::index)?;
        report.inserted = self.insert_absent(chunks, &existing).await?;
        Ok(report)
    }

    /// Delete every entry of one document.
    pub async fn remove(&self, path: &Path) -> Result<ReconcileReport, SyncError> {
        let source = source_key(path);
        let deleted = self.delete_source(&source).await?;
        Ok(ReconcileReport {
            deleted,
            ..Default::default()
        })
    }

    fn load_chunks(&self, path: &Path) -> Result<Vec<DocumentChunk>, SyncError> {
        let segments = self.loader.load(path)?;
        Ok(chunk_segments(&source_key(path), &segments, &self.params))
    }

    async fn delete_source(&self, source: &str) -> Result<usize, SyncError> {
        let ids = self
            .store
            .ids_for_source(source)
            .await
            .map_err(SyncError::index)?;
        if !ids.is_empty() {
            self.store.delete(&ids).await.map_err(SyncError::index)?;
            tracing::debug!(source, deleted = ids.len(), "deleted entries");
        }
        Ok(ids.len())
    }

    /// Embed and insert the chunks whose ids are not in `existing`.
    async fn insert_absent(
        &self,
        chunks: Vec<DocumentChunk>,
        existing: &HashSet<String>,
    ) -> Result<usize, SyncError> {
        let mut seen = HashSet::new();
        let fresh: Vec<DocumentChunk> = chunks
            .into_iter()
            .filter(|c| !existing.contains(&c.id) && seen.insert(c.id.clone()))
            .collect();

        let fingerprint = self.params.fingerprint();
        let mut inserted = 0;
        for batch in fresh.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .map_err(SyncError::embedding)?;
            if vectors.len() != batch.len() {
                return Err(SyncError::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            let dims = self.embedder.dims();
            if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
                return Err(SyncError::Embedding(format!(
                    "provider {} returned a {}-dimensional vector, expected {}",
                    self.embedder.model_name(),
                    bad.len(),
                    dims
                )));
            }

            let entries: Vec<IndexEntry> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, embedding)| IndexEntry {
                    id: chunk.id.clone(),
                    text: chunk.text.clone(),
                    embedding,
                    metadata: EntryMetadata {
                        source: chunk.source.clone(),
                        page: chunk.page,
                        chunking: fingerprint.clone(),
                    },
                })
                .collect();
            self.store
                .add_documents(&entries)
                .await
                .map_err(SyncError::index)?;
            inserted += entries.len();
        }
        Ok(inserted)
    }
}

/// Absolute, symlink-resolved path used as an entry's `source`.
pub fn source_key(path: &Path) -> String {
    resolve_path(path).to_string_lossy().into_owned()
}

fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(p) = path.canonicalize() {
        return p;
    }
    // Deleted files: resolve the directory that held them.
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        if let Ok(p) = parent.canonicalize() {
            return p.join(name);
        }
    }
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Reconciler entry point.
///
/// `scan_type` is validated before anything else happens, so an unknown
/// scan type leaves the index untouched. The embedding provider is only
/// created for scans that embed.
pub async fn run(
    config: &Config,
    index_path: &Path,
    data_path: &Path,
    profile: Option<&str>,
    scan_type: &str,
) -> Result<ReconcileReport, SyncError> {
    let scan: ScanType = scan_type.parse()?;

    let embedder: Arc<dyn EmbeddingProvider> = if scan.needs_embedder() {
        let profile = config
            .embedding
            .resolve(profile)
            .map_err(|e| SyncError::Config(e.to_string()))?;
        ProviderRegistry::with_builtins().create(profile)?
    } else {
        Arc::new(NoopProvider::with_dims(0))
    };

    let store = SqliteIndexStore::open(index_path)
        .await
        .map_err(SyncError::index)?;

    IndexReconciler::new(Arc::new(store), embedder, config.chunking)
        .with_batch_size(config.embedding.batch_size)
        .with_watch_config(config.watch.clone())
        .apply(scan, data_path)
        .await
}
