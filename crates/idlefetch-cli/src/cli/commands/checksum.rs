//! `idlefetch checksum`: hash stored content, or any file, and optionally verify it.

use anyhow::{bail, Context, Result};
use idlefetch_core::checksum;
use idlefetch_core::config::PrefetchConfig;
use idlefetch_core::StorageRoot;
use std::path::PathBuf;

/// `target` is an existing file path or a cache key in the configured storage dir.
pub async fn run_checksum(cfg: &PrefetchConfig, target: &str, expect: Option<&str>) -> Result<()> {
    let path = resolve(cfg, target).await?;
    let digest = checksum::sha256_file(path.clone())
        .await
        .with_context(|| format!("hash {}", path.display()))?;
    println!("{}  {}", digest, path.display());

    if let Some(expected) = expect {
        if !checksum::digests_match(expected, &digest) {
            bail!("sha256 mismatch for {target}: expected {}", expected.trim());
        }
        println!("{target}: OK");
    }
    Ok(())
}

async fn resolve(cfg: &PrefetchConfig, target: &str) -> Result<PathBuf> {
    let as_path = PathBuf::from(target);
    if tokio::fs::metadata(&as_path)
        .await
        .map_or(false, |m| m.is_file())
    {
        return Ok(as_path);
    }
    let storage = StorageRoot::new(cfg.storage_dir()?);
    match storage.locate(target, None).await? {
        Some(path) => Ok(path),
        None => bail!("{target:?} is neither a file nor a stored cache key"),
    }
}
