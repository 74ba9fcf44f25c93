use crate::fetch::FetchError;
use crate::store::StoreError;

/// Failure reported by a prefetch task.
#[derive(Debug, thiserror::Error)]
pub enum PrefetchError {
    #[error("request URL is empty")]
    EmptyUrl,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Assembled content does not hash to the expected digest. Content is kept.
    #[error("integrity check failed: expected sha256 {expected}, got {actual}")]
    Integrity { expected: String, actual: String },
    #[error("giving up after {attempts} consecutive failed attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<PrefetchError>,
    },
}
