/// Failure of a probe or range request.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Curl reported an error (timeout, connection, etc.).
    #[error("curl: {0}")]
    Curl(#[from] curl::Error),
    /// Response had a status the caller cannot use.
    #[error("HTTP {0}")]
    Http(u32),
    /// The transfer was cancelled through its abort token.
    #[error("transfer aborted")]
    Aborted,
    /// The blocking transfer thread failed before producing a response.
    #[error("transfer worker: {0}")]
    Worker(String),
    /// Any other transport-level failure.
    #[error("transport: {0}")]
    Transport(String),
}
