//! Which paths under the watched root are documents.
//!
//! Excluded: the reserved hash file and its `.tmp` staging sibling, names
//! ending in an ignored suffix (editor temp files), names starting with an
//! ignored prefix (Office lock files), and paths matching an exclude glob
//! relative to the root.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::WatchConfig;
use crate::error::SyncError;
use crate::hash_store::temp_path;

#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    reserved: Vec<String>,
    ignore_suffixes: Vec<String>,
    ignore_prefixes: Vec<String>,
    excludes: GlobSet,
}

impl PathFilter {
    pub fn new(root: impl Into<PathBuf>, watch: &WatchConfig) -> Result<Self, SyncError> {
        let hash_file = PathBuf::from(&watch.hash_file);
        let reserved = vec![
            watch.hash_file.clone(),
            temp_path(&hash_file).to_string_lossy().into_owned(),
        ];

        Ok(Self {
            root: root.into(),
            reserved,
            ignore_suffixes: watch.ignore_suffixes.clone(),
            ignore_prefixes: watch.ignore_prefixes.clone(),
            excludes: build_globset(&watch.exclude_globs)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True when `path` must never be tracked or indexed.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let name = match path.file_name() {
            Some(n) => n.to_string_lossy(),
            None => return false,
        };

        if self.reserved.iter().any(|r| *r == name) {
            return true;
        }
        if self.ignore_suffixes.iter().any(|s| name.ends_with(s.as_str())) {
            return true;
        }
        if self.ignore_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            return true;
        }

        match path.strip_prefix(&self.root) {
            Ok(relative) => self.excludes.is_match(relative),
            Err(_) => false,
        }
    }

    /// Every non-ignored regular file under `dir`, sorted by path.
    ///
    /// Entries that cannot be read while walking are logged and skipped.
    pub fn walk_files(&self, dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if self.is_ignored(entry.path()) {
                continue;
            }
            files.push(entry.into_path());
        }
        files.sort();
        files
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, SyncError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| SyncError::Config(format!("invalid exclude glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| SyncError::Config(e.to_string()))
}
