//! Storage abstraction for the vector index.
//!
//! The [`IndexStore`] trait is the narrow surface the reconciler needs:
//! list what is there, add entries, delete by id, and wipe everything.
//! The SQLite backend lives in the app crate; [`memory::InMemoryIndexStore`]
//! backs tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{IndexEntry, StoredChunk, StoredEntry};

/// Abstract vector index backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`existing_ids`](IndexStore::existing_ids) | All ids currently stored |
/// | [`list_entries`](IndexStore::list_entries) | Ids plus metadata |
/// | [`ids_for_source`](IndexStore::ids_for_source) | Ids whose metadata source matches |
/// | [`chunks_for_source`](IndexStore::chunks_for_source) | Id, text and fingerprint of one source's entries |
/// | [`add_documents`](IndexStore::add_documents) | Insert new entries |
/// | [`delete`](IndexStore::delete) | Remove entries by id |
/// | [`reset`](IndexStore::reset) | Drop every entry |
/// | [`count`](IndexStore::count) | Number of entries |
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn existing_ids(&self) -> Result<HashSet<String>>;

    async fn list_entries(&self) -> Result<Vec<StoredEntry>>;

    /// Ids of every entry whose `metadata.source` equals `source`.
    async fn ids_for_source(&self, source: &str) -> Result<Vec<String>> {
        Ok(self
            .list_entries()
            .await?
            .into_iter()
            .filter(|e| e.metadata.source == source)
            .map(|e| e.id)
            .collect())
    }

    /// Id, text and chunking fingerprint of every entry of `source`, in id
    /// order.
    async fn chunks_for_source(&self, source: &str) -> Result<Vec<StoredChunk>>;

    /// Insert entries. Callers only pass ids not already present.
    async fn add_documents(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Delete entries by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    async fn reset(&self) -> Result<()>;

    async fn count(&self) -> Result<usize>;
}
