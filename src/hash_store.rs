//! Persisted path → digest map.
//!
//! On disk the map is one `path,hexdigest` row per line, sorted by path. A
//! path containing `,`, `"` or a line break is wrapped in double quotes with
//! embedded quotes doubled, so the file stays readable by ordinary CSV
//! tools. Paths are written as their raw bytes, so names that are not valid
//! UTF-8 survive a restart on Unix. Each row is decoded on its own; rows
//! that do not split into exactly a path and a hex digest are skipped.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::SyncError;

/// Path → SHA-256 hex digest of every tracked file.
#[derive(Debug, Clone, Default)]
pub struct HashStore {
    file: PathBuf,
    entries: BTreeMap<PathBuf, String>,
}

impl HashStore {
    /// An empty store that will persist to `file`.
    pub fn empty(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the map persisted at `file`. A missing or unreadable file yields
    /// an empty map.
    pub fn load(file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        let entries = match fs::read(&file) {
            Ok(content) => parse_rows(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                let err = SyncError::Persistence {
                    path: file.clone(),
                    source: e,
                };
                tracing::warn!(error = %err, "starting with an empty hash map");
                BTreeMap::new()
            }
        };
        Self { file, entries }
    }

    /// Write the map to `<file>.tmp`, then rename it over `file`.
    pub fn save(&self) -> Result<(), SyncError> {
        let tmp = temp_path(&self.file);
        let persist_err = |source: io::Error| SyncError::Persistence {
            path: self.file.clone(),
            source,
        };

        fs::write(&tmp, render_rows(&self.entries)).map_err(persist_err)?;
        fs::rename(&tmp, &self.file).map_err(persist_err)?;
        Ok(())
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Record a digest, returning the previous one.
    pub fn insert(&mut self, path: PathBuf, digest: String) -> Option<String> {
        self.entries.insert(path, digest)
    }

    pub fn remove(&mut self, path: &Path) -> Option<String> {
        self.entries.remove(path)
    }

    /// Tracked paths strictly under `dir`.
    pub fn paths_under(&self, dir: &Path) -> Vec<PathBuf> {
        self.entries
            .keys()
            .filter(|p| p.starts_with(dir) && p.as_path() != dir)
            .cloned()
            .collect()
    }

    pub fn entries(&self) -> &BTreeMap<PathBuf, String> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `<file>.tmp`, the staging file used by [`HashStore::save`].
pub fn temp_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn render_rows(entries: &BTreeMap<PathBuf, String>) -> Vec<u8> {
    let mut out = Vec::new();
    for (path, digest) in entries {
        let Some(bytes) = path_bytes(path) else {
            tracing::warn!(path = %path.display(), "path is not representable, not persisting it");
            continue;
        };
        quote_field(&bytes, &mut out);
        out.push(b',');
        out.extend_from_slice(digest.as_bytes());
        out.push(b'\n');
    }
    out
}

fn quote_field(field: &[u8], out: &mut Vec<u8>) {
    if !field.iter().any(|b| matches!(b, b',' | b'"' | b'\n' | b'\r')) {
        out.extend_from_slice(field);
        return;
    }
    out.push(b'"');
    for &b in field {
        if b == b'"' {
            out.push(b'"');
        }
        out.push(b);
    }
    out.push(b'"');
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Option<Cow<'_, [u8]>> {
    use std::os::unix::ffi::OsStrExt;
    Some(Cow::Borrowed(path.as_os_str().as_bytes()))
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Option<Cow<'_, [u8]>> {
    path.to_str().map(|s| Cow::Borrowed(s.as_bytes()))
}

#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
    use std::os::unix::ffi::OsStringExt;
    Some(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
    String::from_utf8(bytes).ok().map(PathBuf::from)
}

/// Decode every row on its own, so one bad row never costs the others.
fn parse_rows(content: &[u8]) -> BTreeMap<PathBuf, String> {
    let mut entries = BTreeMap::new();
    for record in split_records(content) {
        match parse_record(&record) {
            Some((path, digest)) => {
                entries.insert(path, digest);
            }
            None => {
                if !record.iter().all(u8::is_ascii_whitespace) {
                    tracing::debug!(
                        row = %String::from_utf8_lossy(&record),
                        "skipping malformed hash row"
                    );
                }
            }
        }
    }
    entries
}

/// Split on line breaks that are not inside a quoted field.
fn split_records(content: &[u8]) -> Vec<Vec<u8>> {
    let mut records = Vec::new();
    let mut current = Vec::new();
    let mut in_quotes = false;

    for &b in content {
        match b {
            b'"' => {
                in_quotes = !in_quotes;
                current.push(b);
            }
            b'\n' if !in_quotes => {
                records.push(std::mem::take(&mut current));
            }
            b'\r' if !in_quotes => {}
            _ => current.push(b),
        }
    }
    if !current.is_empty() {
        records.push(current);
    }
    records
}

fn parse_record(record: &[u8]) -> Option<(PathBuf, String)> {
    let fields = split_fields(record)?;
    if fields.len() != 2 {
        return None;
    }
    let mut it = fields.into_iter();
    let path = it.next()?;
    let digest = it.next()?;
    if path.is_empty() || digest.is_empty() || !digest.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let digest = String::from_utf8(digest).ok()?;
    Some((path_from_bytes(path)?, digest))
}

/// CSV field split for one record. Returns `None` on an unterminated quote.
fn split_fields(record: &[u8]) -> Option<Vec<Vec<u8>>> {
    let mut fields = Vec::new();
    let mut field = Vec::new();
    let mut bytes = record.iter().copied().peekable();
    let mut in_quotes = false;

    while let Some(b) = bytes.next() {
        if in_quotes {
            if b == b'"' {
                if bytes.peek() == Some(&b'"') {
                    field.push(b'"');
                    bytes.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(b);
            }
        } else {
            match b {
                b'"' if field.is_empty() => in_quotes = true,
                b',' => fields.push(std::mem::take(&mut field)),
                _ => field.push(b),
            }
        }
    }
    if in_quotes {
        return None;
    }
    fields.push(field);
    Some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST_A: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    const DIGEST_B: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HashStore::load(dir.path().join("file_hashes.csv"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file_hashes.csv");
        let mut store = HashStore::empty(&file);
        store.insert(dir.path().join("a.txt"), DIGEST_A.to_string());
        store.insert(dir.path().join("odd, \"name\".txt"), DIGEST_B.to_string());
        store.save().unwrap();

        assert!(!temp_path(&file).exists());
        let reloaded = HashStore::load(&file);
        assert_eq!(reloaded.entries(), store.entries());
    }

    #[test]
    fn test_quoted_rows_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file_hashes.csv");
        let mut store = HashStore::empty(&file);
        store.insert(PathBuf::from("/w/a,b.txt"), DIGEST_A.to_string());
        store.save().unwrap();

        let content = fs::read_to_string(&file).unwrap();
        assert_eq!(content, format!("\"/w/a,b.txt\",{}\n", DIGEST_A));
    }

    #[test]
    fn test_malformed_rows_skipped() {
        let content = format!(
            "/w/a.txt,{a}\n/w/b.txt\n/w/c.txt,{a},extra\n/w/d.txt,not-hex\n\n/w/e.txt,{b}\r\n",
            a = DIGEST_A,
            b = DIGEST_B
        );
        let entries = parse_rows(content.as_bytes());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.get(Path::new("/w/a.txt")).unwrap(), DIGEST_A);
        assert_eq!(entries.get(Path::new("/w/e.txt")).unwrap(), DIGEST_B);
    }

    #[test]
    fn test_invalid_utf8_digest_skips_only_that_row() {
        let mut content = format!("/w/a.txt,{}\n", DIGEST_A).into_bytes();
        content.extend_from_slice(b"/w/b.txt,\xff\xfe\n");
        content.extend_from_slice(format!("/w/c.txt,{}\n", DIGEST_B).as_bytes());

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file_hashes.csv");
        fs::write(&file, content).unwrap();

        let store = HashStore::load(&file);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(Path::new("/w/a.txt")), Some(DIGEST_A));
        assert_eq!(store.get(Path::new("/w/c.txt")), Some(DIGEST_B));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_survives_reload() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file_hashes.csv");
        let odd = dir.path().join(OsStr::from_bytes(b"caf\xe9, menu.txt"));
        let mut store = HashStore::empty(&file);
        store.insert(odd.clone(), DIGEST_A.to_string());
        store.insert(dir.path().join("plain.txt"), DIGEST_B.to_string());
        store.save().unwrap();

        let reloaded = HashStore::load(&file);
        assert_eq!(reloaded.get(&odd), Some(DIGEST_A));
        assert_eq!(reloaded.entries(), store.entries());
    }

    #[test]
    fn test_paths_under() {
        let mut store = HashStore::empty("/w/file_hashes.csv");
        store.insert(PathBuf::from("/w/sub/a.txt"), DIGEST_A.to_string());
        store.insert(PathBuf::from("/w/sub/deep/b.txt"), DIGEST_A.to_string());
        store.insert(PathBuf::from("/w/subway.txt"), DIGEST_A.to_string());
        let under = store.paths_under(Path::new("/w/sub"));
        assert_eq!(
            under,
            vec![
                PathBuf::from("/w/sub/a.txt"),
                PathBuf::from("/w/sub/deep/b.txt")
            ]
        );
    }

    #[test]
    fn test_save_into_missing_dir_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = HashStore::empty(dir.path().join("nope").join("file_hashes.csv"));
        assert!(matches!(store.save(), Err(SyncError::Persistence { .. })));
    }
}
