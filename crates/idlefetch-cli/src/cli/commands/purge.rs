//! `idlefetch purge`: drop fragment-table content for a key.

use anyhow::Result;
use idlefetch_core::config::PrefetchConfig;
use idlefetch_core::StorageRoot;

/// Streaming files are left alone; only the fragment table and its assembled artifact go.
pub async fn run_purge(cfg: &PrefetchConfig, key: &str) -> Result<()> {
    let storage = StorageRoot::new(cfg.storage_dir()?);
    storage.purge_fragments(key).await?;
    tracing::info!(key, "purged fragment content");
    println!("Purged {key}.");
    Ok(())
}
