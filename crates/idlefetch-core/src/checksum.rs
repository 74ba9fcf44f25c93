//! SHA-256 integrity verification of assembled artifacts.
//!
//! Digests are computed after the last chunk lands, never inline with the
//! transfer, so hashing never holds up a network read.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

const BUF_SIZE: usize = 64 * 1024;

/// Digest of zero bytes, used when a completed transfer produced no artifact.
pub const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Compute SHA-256 of a file and return the digest as lowercase hex.
/// Reads in chunks to keep memory use bounded; suitable for large files.
pub fn sha256_path(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// [`sha256_path`] on the blocking pool.
pub async fn sha256_file(path: PathBuf) -> std::io::Result<String> {
    tokio::task::spawn_blocking(move || {
        sha256_path(&path).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("{e:#}")))
    })
    .await
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
}

/// Compare an expected hex digest (any case, surrounding whitespace ignored) with a computed one.
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn sha256_path_empty_file() {
        let f = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(sha256_path(f.path()).unwrap(), EMPTY_SHA256);
    }

    #[test]
    fn sha256_path_known_content() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello\n").unwrap();
        f.flush().unwrap();
        assert_eq!(
            sha256_path(f.path()).unwrap(),
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
    }

    #[tokio::test]
    async fn sha256_file_off_executor() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello\n").unwrap();
        f.flush().unwrap();
        let digest = sha256_file(f.path().to_path_buf()).await.unwrap();
        assert!(digest.starts_with("5891b5b5"));
    }

    #[tokio::test]
    async fn sha256_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(sha256_file(dir.path().join("nope")).await.is_err());
    }

    #[test]
    fn digest_comparison_ignores_case_and_whitespace() {
        assert!(digests_match(" ABCDEF\n", "abcdef"));
        assert!(!digests_match("abcdef", "abcdee"));
    }
}
