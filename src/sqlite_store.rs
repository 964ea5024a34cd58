//! SQLite-backed [`IndexStore`] implementation.
//!
//! One row per chunk in `index_entries`; the embedding is a little-endian
//! f32 BLOB. Multi-row writes run in a single transaction.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use docsync_core::embedding::{blob_to_vec, vec_to_blob};
use docsync_core::models::{EntryMetadata, IndexEntry, StoredChunk, StoredEntry};
use docsync_core::store::IndexStore;

use crate::{db, migrate};

pub struct SqliteIndexStore {
    pool: SqlitePool,
}

impl SqliteIndexStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `path` and make sure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Text and vector of one entry.
    pub async fn get(&self, id: &str) -> Result<Option<IndexEntry>> {
        let row = sqlx::query(
            "SELECT id, source, page, chunking, text, embedding FROM index_entries WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            IndexEntry {
                id: row.get("id"),
                text: row.get("text"),
                embedding: blob_to_vec(&blob),
                metadata: metadata_from_row(&row),
            }
        }))
    }

    /// Entry counts grouped by chunking fingerprint.
    pub async fn chunking_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT chunking, COUNT(*) AS n FROM index_entries GROUP BY chunking ORDER BY chunking",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<String, _>("chunking"), r.get::<i64, _>("n")))
            .collect())
    }

    /// Unix timestamp of the most recent insert.
    pub async fn last_indexed_at(&self) -> Result<Option<i64>> {
        let ts: Option<i64> = sqlx::query_scalar("SELECT MAX(created_at) FROM index_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(ts)
    }

    /// Number of distinct sources.
    pub async fn source_count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT source) FROM index_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

fn metadata_from_row(row: &sqlx::sqlite::SqliteRow) -> EntryMetadata {
    let page: i64 = row.get("page");
    EntryMetadata {
        source: row.get("source"),
        page: page as u32,
        chunking: row.get("chunking"),
    }
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn existing_ids(&self) -> Result<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM index_entries")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn list_entries(&self) -> Result<Vec<StoredEntry>> {
        let rows = sqlx::query("SELECT id, source, page, chunking FROM index_entries ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| StoredEntry {
                id: row.get("id"),
                metadata: metadata_from_row(row),
            })
            .collect())
    }

    async fn ids_for_source(&self, source: &str) -> Result<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM index_entries WHERE source = ? ORDER BY id")
                .bind(source)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }

    async fn chunks_for_source(&self, source: &str) -> Result<Vec<StoredChunk>> {
        let rows = sqlx::query(
            "SELECT id, text, chunking FROM index_entries WHERE source = ? ORDER BY id",
        )
        .bind(source)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| StoredChunk {
                id: row.get("id"),
                text: row.get("text"),
                chunking: row.get("chunking"),
            })
            .collect())
    }

    async fn add_documents(&self, entries: &[IndexEntry]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO index_entries (id, source, page, chunking, text, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&entry.id)
            .bind(&entry.metadata.source)
            .bind(entry.metadata.page as i64)
            .bind(&entry.metadata.chunking)
            .bind(&entry.text)
            .bind(vec_to_blob(&entry.embedding))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM index_entries WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        migrate::drop_schema(&self.pool).await?;
        migrate::run_migrations(&self.pool).await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}
