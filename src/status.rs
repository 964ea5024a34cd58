//! Index and watch-state overview for `docsync status`.
//!
//! Shows what is indexed (entries, sources, chunking fingerprints) next to
//! what the change detector tracks, so drift between the two is visible.

use anyhow::Result;

use docsync_core::store::IndexStore;

use crate::config::Config;
use crate::hash_store::HashStore;
use crate::sqlite_store::SqliteIndexStore;

/// Run the status command: query the index and hash map and print a summary.
pub async fn run_status(config: &Config) -> Result<()> {
    let store = SqliteIndexStore::open(&config.index.path).await?;

    let entries = store.count().await?;
    let sources = store.source_count().await?;
    let fingerprints = store.chunking_counts().await?;
    let last_indexed = store.last_indexed_at().await?;

    let index_size = std::fs::metadata(&config.index.path)
        .map(|m| m.len())
        .unwrap_or(0);

    let hash_file = config.watch.root.join(&config.watch.hash_file);
    let tracked = HashStore::load(&hash_file).len();

    let current = config.chunking.fingerprint();

    println!("docsync status");
    println!("==============");
    println!();
    println!("  Index:       {}", config.index.path.display());
    println!("  Size:        {}", format_bytes(index_size));
    println!("  Entries:     {}", entries);
    println!("  Sources:     {}", sources);
    println!(
        "  Last write:  {}",
        match last_indexed {
            Some(ts) => format_ts_relative(ts),
            None => "never".to_string(),
        }
    );
    println!();
    println!("  Watch root:  {}", config.watch.root.display());
    println!("  Tracked:     {} files", tracked);
    println!("  Chunking:    {}", current);

    if !fingerprints.is_empty() {
        println!();
        println!("  By chunking:");
        println!("  {:<28} {:>8}", "FINGERPRINT", "ENTRIES");
        println!("  {}", "-".repeat(38));
        for (fingerprint, n) in &fingerprints {
            let marker = if *fingerprint == current { "" } else { "  (stale)" };
            println!("  {:<28} {:>8}{}", fingerprint, n, marker);
        }
    }

    println!();

    store.pool().close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_ts_relative_recent() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
    }
}
