//! In-memory [`Transport`] serving one body, with scripted failures.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use idlefetch_core::fetch::{BodyStream, ContentRange, FetchError, RangeResponse, Transport};
use idlefetch_core::range::ByteRange;

#[derive(Debug, Clone)]
pub struct MemoryOptions {
    /// Report the size on probe.
    pub probe_size: bool,
    /// Honor ranges with 206; otherwise always 200 with the whole body.
    pub ranges: bool,
    /// Body block size.
    pub block: usize,
    /// Fail this many range requests before serving.
    pub fail_first: u32,
    /// Answer the failing requests with this status instead of a transport error.
    pub status_override: Option<u32>,
    /// Send `Content-Range: bytes a-b/*`, leaving the total unknown.
    pub hide_total: bool,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            probe_size: true,
            ranges: true,
            block: 16,
            fail_first: 0,
            status_override: None,
            hide_total: false,
        }
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    body: Vec<u8>,
    opts: MemoryOptions,
    probes: AtomicU32,
    failures_left: AtomicU32,
    ranges: Mutex<Vec<ByteRange>>,
}

impl MemoryTransport {
    pub fn new(body: Vec<u8>) -> Arc<Self> {
        Self::with_options(body, MemoryOptions::default())
    }

    pub fn with_options(body: Vec<u8>, opts: MemoryOptions) -> Arc<Self> {
        Arc::new(Self {
            body,
            failures_left: AtomicU32::new(opts.fail_first),
            opts,
            probes: AtomicU32::new(0),
            ranges: Mutex::new(Vec::new()),
        })
    }

    pub fn probes(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn ranges(&self) -> Vec<ByteRange> {
        self.ranges.lock().unwrap().clone()
    }

    /// Number of range requests plus probes.
    pub fn calls(&self) -> usize {
        self.probes() as usize + self.ranges().len()
    }

    fn blocks(&self, bytes: &[u8]) -> BodyStream {
        BodyStream::from_blocks(
            bytes
                .chunks(self.opts.block.max(1))
                .map(<[u8]>::to_vec)
                .collect(),
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn probe_size(&self, _url: &str) -> Result<Option<u64>, FetchError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(self.opts.probe_size.then_some(self.body.len() as u64))
    }

    async fn fetch_range(
        &self,
        _url: &str,
        range: ByteRange,
        _abort: CancellationToken,
    ) -> Result<RangeResponse, FetchError> {
        self.ranges.lock().unwrap().push(range);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return match self.opts.status_override {
                Some(status) => Ok(RangeResponse {
                    status,
                    content_range: None,
                    body: BodyStream::from_blocks(Vec::new()),
                }),
                None => Err(FetchError::Transport("connection reset".into())),
            };
        }

        let total = self.body.len() as u64;
        let advertised = (!self.opts.hide_total).then_some(total);
        if !self.opts.ranges {
            return Ok(RangeResponse {
                status: 200,
                content_range: None,
                body: self.blocks(&self.body),
            });
        }
        if range.start >= total {
            return Ok(RangeResponse {
                status: 416,
                content_range: Some(ContentRange {
                    span: None,
                    total: advertised,
                }),
                body: BodyStream::from_blocks(Vec::new()),
            });
        }
        let end = range.end.min(total - 1);
        Ok(RangeResponse {
            status: 206,
            content_range: Some(ContentRange {
                span: Some((range.start, end)),
                total: advertised,
            }),
            body: self.blocks(&self.body[range.start as usize..=end as usize]),
        })
    }
}
