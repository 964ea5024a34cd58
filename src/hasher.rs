//! SHA-256 content digests.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::SyncError;

const READ_BUF_BYTES: usize = 64 * 1024;

/// Hex-encoded SHA-256 of a file's bytes, streamed in fixed-size blocks.
pub fn hash_file(path: &Path) -> Result<String, SyncError> {
    let io_err = |source: io::Error| SyncError::TransientIo {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_BYTES];
    loop {
        let n = file.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Like [`hash_file`] but degrades to `None` when the file cannot be read.
///
/// A file that vanished since it was discovered is logged at `debug`; any
/// other read failure at `warn`.
pub fn try_hash_file(path: &Path) -> Option<String> {
    match hash_file(path) {
        Ok(digest) => Some(digest),
        Err(SyncError::TransientIo { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "file vanished before hashing");
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot hash file, treating as unchanged");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_of(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            digest_of(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let body = "x".repeat(200_000);
        std::fs::write(&path, &body).unwrap();
        assert_eq!(hash_file(&path).unwrap(), digest_of(body.as_bytes()));
    }

    #[test]
    fn test_missing_file_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        assert!(matches!(
            hash_file(&path),
            Err(SyncError::TransientIo { .. })
        ));
        assert_eq!(try_hash_file(&path), None);
    }

    #[test]
    fn test_directory_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(try_hash_file(dir.path()), None);
    }
}
