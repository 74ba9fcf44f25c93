/// Failure of a chunk store operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("fragment table: {0}")]
    Database(#[from] sqlx::Error),
    /// A fragment write did not start at the end of the stored prefix.
    #[error("non-contiguous write at offset {offset}, stored prefix ends at {expected}")]
    NonContiguous { expected: u64, offset: u64 },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
