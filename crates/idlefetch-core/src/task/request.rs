use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::status::{ProgressCallback, StatusCallback, StatusEvent};
use crate::admission::AdmissionFlags;
use crate::store::StorePreference;
use crate::url_model::cache_key_from_url;

/// What to prefetch and how. Immutable once a task is built from it.
#[derive(Clone)]
pub struct PrefetchRequest {
    pub url: String,
    /// Storage key; defaults to the last path segment of `url`.
    pub cache_key: Option<String>,
    /// Fixed chunk size in bytes; adaptive when `None`.
    pub chunk_size: Option<u64>,
    /// Idle gap required before each chunk; the context default when `None`.
    pub min_idle: Option<Duration>,
    pub admission: AdmissionFlags,
    /// Expected SHA-256 of the complete resource, hex.
    pub integrity_sha256: Option<String>,
    pub store: StorePreference,
    pub on_progress: Option<ProgressCallback>,
    pub on_status: Option<StatusCallback>,
}

impl PrefetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cache_key: None,
            chunk_size: None,
            min_idle: None,
            admission: AdmissionFlags::default(),
            integrity_sha256: None,
            store: StorePreference::default(),
            on_progress: None,
            on_status: None,
        }
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = Some(bytes);
        self
    }

    pub fn with_min_idle(mut self, gap: Duration) -> Self {
        self.min_idle = Some(gap);
        self
    }

    pub fn with_admission(mut self, flags: AdmissionFlags) -> Self {
        self.admission = flags;
        self
    }

    pub fn with_sha256(mut self, hex: impl Into<String>) -> Self {
        self.integrity_sha256 = Some(hex.into());
        self
    }

    pub fn with_store(mut self, store: StorePreference) -> Self {
        self.store = store;
        self
    }

    /// Called with `(downloaded, total)` after every stored block.
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(u64, Option<u64>) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn on_status<F>(mut self, f: F) -> Self
    where
        F: Fn(&StatusEvent) + Send + Sync + 'static,
    {
        self.on_status = Some(Arc::new(f));
        self
    }

    /// Explicit cache key if set and non-empty, otherwise derived from the URL.
    pub fn resolved_cache_key(&self) -> String {
        match self.cache_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => cache_key_from_url(&self.url),
        }
    }
}

impl fmt::Debug for PrefetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefetchRequest")
            .field("url", &self.url)
            .field("cache_key", &self.cache_key)
            .field("chunk_size", &self.chunk_size)
            .field("min_idle", &self.min_idle)
            .field("admission", &self.admission)
            .field("integrity_sha256", &self.integrity_sha256)
            .field("store", &self.store)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_status", &self.on_status.is_some())
            .finish()
    }
}
