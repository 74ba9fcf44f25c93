//! Durable chunk storage.
//!
//! Two backends sit behind [`ChunkStore`]: a streaming file per cache key
//! ([`FileStore`]) and a SQLite fragment table ([`FragmentStore`]). The
//! streaming backend is preferred and the table is the fallback whenever the
//! file cannot be opened. Backend-specific operations are optional
//! capabilities ([`Seekable`], [`Purgeable`]).

mod error;
mod file;
mod fragments;

pub use error::StoreError;
pub use file::FileStore;
pub use fragments::{FragmentDb, FragmentStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::url_model::cache_file_name;

const FILES_DIR: &str = "files";
const ASSEMBLED_DIR: &str = "assembled";
const FRAGMENTS_DB: &str = "fragments.db";

/// Which backend a request would like to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorePreference {
    /// Streaming file, falling back to the fragment table if it cannot be opened.
    #[default]
    Streaming,
    /// Fragment table only.
    Fragments,
}

impl FromStr for StorePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "streaming" => Ok(StorePreference::Streaming),
            "fragments" => Ok(StorePreference::Fragments),
            other => Err(format!("unknown store `{other}` (expected streaming or fragments)")),
        }
    }
}

/// Backend actually in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Streaming,
    Fragments,
}

impl StoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Streaming => "streaming",
            StoreKind::Fragments => "fragments",
        }
    }
}

/// Write-through storage for one resource.
///
/// After writes covering `[0, n)` and a `close`, `size` reports `n` and
/// `assemble` yields exactly those bytes.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Write `data` at `offset`.
    async fn write_chunk(&mut self, offset: u64, data: &[u8]) -> Result<(), StoreError>;

    /// Length of the stored contiguous prefix.
    async fn size(&mut self) -> Result<u64, StoreError>;

    /// Flush everything written so far to durable storage.
    async fn close(&mut self) -> Result<(), StoreError>;

    /// Path of a file holding the stored prefix, or `None` if nothing is stored.
    async fn assemble(&mut self) -> Result<Option<PathBuf>, StoreError>;

    fn seekable(&mut self) -> Option<&mut dyn Seekable> {
        None
    }

    fn purgeable(&mut self) -> Option<&mut dyn Purgeable> {
        None
    }
}

/// Cursor-based writes (streaming backend).
#[async_trait]
pub trait Seekable: Send {
    async fn seek(&mut self, pos: u64) -> Result<(), StoreError>;
    async fn write(&mut self, data: &[u8]) -> Result<(), StoreError>;
}

/// Deletion of all stored content for the key (fragment backend).
#[async_trait]
pub trait Purgeable: Send {
    async fn purge(&mut self) -> Result<(), StoreError>;
}

/// Root directory holding every backend's data:
///
/// - `files/<key>`: streaming backend
/// - `fragments.db`: fragment table
/// - `assembled/<key>`: fragment table contents materialized for reading
#[derive(Debug, Clone)]
pub struct StorageRoot {
    dir: PathBuf,
    fragments: Arc<OnceCell<FragmentDb>>,
}

impl StorageRoot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fragments: Arc::new(OnceCell::new()),
        }
    }

    /// `~/.local/share/idlefetch`.
    pub fn default_dir() -> Result<PathBuf, StoreError> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("idlefetch")
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(xdg_dirs.get_data_home())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Streaming backend file for `key`.
    pub fn file_path(&self, key: &str) -> PathBuf {
        self.dir.join(FILES_DIR).join(cache_file_name(key))
    }

    /// Where the fragment table assembles `key`.
    pub fn assembled_path(&self, key: &str) -> PathBuf {
        self.dir.join(ASSEMBLED_DIR).join(cache_file_name(key))
    }

    /// Shared fragment table, opened on first use.
    pub async fn fragment_db(&self) -> Result<FragmentDb, StoreError> {
        let db = self
            .fragments
            .get_or_try_init(|| FragmentDb::open_at(self.dir.join(FRAGMENTS_DB)))
            .await?;
        Ok(db.clone())
    }

    /// Open a store for `key`, falling back from streaming to fragments on any failure.
    pub async fn open(
        &self,
        key: &str,
        preference: StorePreference,
    ) -> Result<Box<dyn ChunkStore>, StoreError> {
        match preference {
            StorePreference::Streaming => match FileStore::open(self.file_path(key)).await {
                Ok(store) => Ok(Box::new(store)),
                Err(e) => {
                    tracing::debug!(key, error = %e, "streaming store unavailable, using fragment table");
                    self.open_kind(key, StoreKind::Fragments).await
                }
            },
            StorePreference::Fragments => self.open_kind(key, StoreKind::Fragments).await,
        }
    }

    /// Open exactly the `kind` backend for `key`.
    pub async fn open_kind(
        &self,
        key: &str,
        kind: StoreKind,
    ) -> Result<Box<dyn ChunkStore>, StoreError> {
        match kind {
            StoreKind::Streaming => Ok(Box::new(FileStore::open(self.file_path(key)).await?)),
            StoreKind::Fragments => {
                let db = self.fragment_db().await?;
                let store = FragmentStore::open(db, key, self.assembled_path(key)).await?;
                Ok(Box::new(store))
            }
        }
    }

    /// Path of the stored content for `key`, assembling fragments if needed.
    ///
    /// `hint` is the backend the content was written with, if known.
    pub async fn locate(
        &self,
        key: &str,
        hint: Option<StoreKind>,
    ) -> Result<Option<PathBuf>, StoreError> {
        if hint != Some(StoreKind::Fragments) {
            let path = self.file_path(key);
            if let Ok(meta) = tokio::fs::metadata(&path).await {
                if meta.is_file() && meta.len() > 0 {
                    return Ok(Some(path));
                }
            }
            if hint == Some(StoreKind::Streaming) {
                return Ok(None);
            }
        }
        let mut store = self.open_kind(key, StoreKind::Fragments).await?;
        store.assemble().await
    }

    /// Delete fragment-table content for `key`.
    pub async fn purge_fragments(&self, key: &str) -> Result<(), StoreError> {
        let mut store = self.open_kind(key, StoreKind::Fragments).await?;
        match store.purgeable() {
            Some(p) => p.purge().await,
            None => Ok(()),
        }
    }
}
