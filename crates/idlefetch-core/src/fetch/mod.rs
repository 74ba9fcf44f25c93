//! HTTP range fetching.
//!
//! The engine talks to the network through the [`Transport`] trait: a size
//! probe and an abortable range GET whose body arrives as a stream of blocks.
//! [`CurlTransport`] implements it on libcurl, running each blocking transfer
//! on Tokio's blocking pool.

mod body;
mod curl_transport;
mod error;
mod head;
mod parse;

pub use body::{BodySender, BodyStream};
pub use curl_transport::CurlTransport;
pub use error::FetchError;
pub use head::{probe, HeadResult};
pub use parse::{parse_content_range, parse_status_line};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::range::ByteRange;

/// Parsed `Content-Range` header: `bytes a-b/T`, `bytes a-b/*` or `bytes */T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// Inclusive span actually returned, absent for `bytes */T`.
    pub span: Option<(u64, u64)>,
    /// Complete length of the resource, absent for `*`.
    pub total: Option<u64>,
}

/// Response to a range request; headers are available before the body is read.
#[derive(Debug)]
pub struct RangeResponse {
    pub status: u32,
    pub content_range: Option<ContentRange>,
    pub body: BodyStream,
}

/// Network capability used by prefetch tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Size of the resource, if the server reports one.
    async fn probe_size(&self, url: &str) -> Result<Option<u64>, FetchError>;

    /// GET `range` of `url` at low priority. Cancelling `abort` ends the
    /// transfer; the body then yields [`FetchError::Aborted`] or simply ends.
    async fn fetch_range(
        &self,
        url: &str,
        range: ByteRange,
        abort: CancellationToken,
    ) -> Result<RangeResponse, FetchError>;
}
