//! Fragment-table backend: byte ranges stored as `(key, start)` records.
//!
//! The store tracks a contiguity watermark: the length of the prefix fully
//! covered by records chained from offset 0. Only writes at the watermark are
//! accepted, so the table never holds a gap in front of stored data.

mod db;

pub use db::FragmentDb;

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use super::{ChunkStore, Purgeable, StoreError, StoreKind};

/// Fragment-table store for one cache key.
#[derive(Debug)]
pub struct FragmentStore {
    db: FragmentDb,
    key: String,
    assembled_path: PathBuf,
    watermark: u64,
}

impl FragmentStore {
    /// Open `key`, computing the watermark and dropping records past the first gap or overlap.
    pub async fn open(
        db: FragmentDb,
        key: &str,
        assembled_path: PathBuf,
    ) -> Result<Self, StoreError> {
        let spans = db.list_spans(key).await?;
        let (watermark, first_stale) = contiguous_prefix(&spans);
        if let Some(stale_from) = first_stale {
            let removed = db.delete_from(key, stale_from).await?;
            tracing::warn!(
                key,
                watermark,
                removed,
                "dropped fragments beyond a gap in the stored prefix"
            );
        }
        Ok(Self {
            db,
            key: key.to_string(),
            assembled_path,
            watermark,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Length of the contiguous prefix stored so far.
    pub fn watermark(&self) -> u64 {
        self.watermark
    }
}

/// Watermark of sorted `(start, len)` spans, and the start of the first record outside the chain.
fn contiguous_prefix(spans: &[(u64, u64)]) -> (u64, Option<u64>) {
    let mut watermark = 0u64;
    for &(start, len) in spans {
        if start != watermark {
            return (watermark, Some(start));
        }
        watermark += len;
    }
    (watermark, None)
}

#[async_trait]
impl ChunkStore for FragmentStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Fragments
    }

    async fn write_chunk(&mut self, offset: u64, data: &[u8]) -> Result<(), StoreError> {
        if offset != self.watermark {
            return Err(StoreError::NonContiguous {
                expected: self.watermark,
                offset,
            });
        }
        if data.is_empty() {
            return Ok(());
        }
        self.db.put_fragment(&self.key, offset, data).await?;
        self.watermark += data.len() as u64;
        Ok(())
    }

    async fn size(&mut self) -> Result<u64, StoreError> {
        Ok(self.watermark)
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        // Every put is its own committed transaction.
        Ok(())
    }

    async fn assemble(&mut self) -> Result<Option<PathBuf>, StoreError> {
        let spans = self.db.list_spans(&self.key).await?;
        if spans.is_empty() {
            return Ok(None);
        }
        if let Some(parent) = self.assembled_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut out = tokio::fs::File::create(&self.assembled_path).await?;
        let mut next = 0u64;
        for (start, _) in spans {
            if start != next || next >= self.watermark {
                break;
            }
            let Some(data) = self.db.fragment_data(&self.key, start).await? else {
                break;
            };
            out.write_all(&data).await?;
            next += data.len() as u64;
        }
        out.flush().await?;
        out.sync_all().await?;
        Ok(Some(self.assembled_path.clone()))
    }

    fn purgeable(&mut self) -> Option<&mut dyn Purgeable> {
        Some(self)
    }
}

#[async_trait]
impl Purgeable for FragmentStore {
    async fn purge(&mut self) -> Result<(), StoreError> {
        let removed = self.db.purge(&self.key).await?;
        self.watermark = 0;
        match tokio::fs::remove_file(&self.assembled_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::debug!(key = %self.key, removed, "purged fragments");
        Ok(())
    }
}
