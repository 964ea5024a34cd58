//! In-memory [`IndexStore`] implementation for tests.
//!
//! Entries live in a `BTreeMap` keyed by id behind `std::sync::RwLock`, so
//! listings come back in id order.

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{IndexEntry, StoredChunk, StoredEntry};

use super::IndexStore;

/// In-memory vector index.
pub struct InMemoryIndexStore {
    entries: RwLock<BTreeMap<String, IndexEntry>>,
}

impl InMemoryIndexStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Snapshot of a stored entry, text and vector included.
    pub fn get(&self, id: &str) -> Option<IndexEntry> {
        self.entries.read().unwrap().get(id).cloned()
    }
}

impl Default for InMemoryIndexStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn existing_ids(&self) -> Result<HashSet<String>> {
        Ok(self.entries.read().unwrap().keys().cloned().collect())
    }

    async fn list_entries(&self) -> Result<Vec<StoredEntry>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .values()
            .map(|e| StoredEntry {
                id: e.id.clone(),
                metadata: e.metadata.clone(),
            })
            .collect())
    }

    async fn chunks_for_source(&self, source: &str) -> Result<Vec<StoredChunk>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .values()
            .filter(|e| e.metadata.source == source)
            .map(|e| StoredChunk {
                id: e.id.clone(),
                text: e.text.clone(),
                chunking: e.metadata.chunking.clone(),
            })
            .collect())
    }

    async fn add_documents(&self, new: &[IndexEntry]) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        for e in new {
            entries.insert(e.id.clone(), e.clone());
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        for id in ids {
            entries.remove(id);
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.entries.write().unwrap().clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().unwrap().len())
    }
}
