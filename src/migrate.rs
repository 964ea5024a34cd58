use anyhow::Result;
use sqlx::SqlitePool;

/// Create the index schema. Safe to run repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_entries (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            page INTEGER NOT NULL,
            chunking TEXT NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_index_entries_source ON index_entries(source)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Drop the index schema entirely.
pub async fn drop_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DROP INDEX IF EXISTS idx_index_entries_source")
        .execute(pool)
        .await?;
    sqlx::query("DROP TABLE IF EXISTS index_entries")
        .execute(pool)
        .await?;
    Ok(())
}
