//! `idlefetch locate`: print where stored content lives.

use anyhow::{bail, Context, Result};
use idlefetch_core::config::PrefetchConfig;
use idlefetch_core::StorageRoot;
use url::Url;

pub async fn run_locate(cfg: &PrefetchConfig, key: &str) -> Result<()> {
    let storage = StorageRoot::new(cfg.storage_dir()?);
    let Some(path) = storage.locate(key, None).await? else {
        bail!("nothing stored for key {key:?}");
    };
    let path = tokio::fs::canonicalize(&path)
        .await
        .with_context(|| format!("resolve {}", path.display()))?;
    let url = Url::from_file_path(&path)
        .map_err(|_| anyhow::anyhow!("not an absolute path: {}", path.display()))?;
    println!("{url}");
    Ok(())
}
