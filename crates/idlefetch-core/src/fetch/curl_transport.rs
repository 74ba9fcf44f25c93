//! libcurl-backed [`Transport`].

use async_trait::async_trait;
use std::cell::RefCell;
use std::str;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::body::{BodySender, BodyStream};
use super::head;
use super::parse::{self, ResponseHead};
use super::{FetchError, RangeResponse, Transport};
use crate::range::ByteRange;

/// Blocks buffered between the curl thread and the consumer.
const BODY_QUEUE: usize = 16;

/// RFC 9218 hint: lowest urgency, incremental delivery.
const PRIORITY_HEADER: &str = "Priority: u=7, i";

/// Connection settings shared by probes and range requests.
#[derive(Debug, Clone)]
pub(crate) struct CurlSettings {
    pub connect_timeout: Duration,
    pub probe_timeout: Duration,
    /// Abort if throughput stays below `low_speed_limit` bytes/s for `low_speed_time`.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
}

impl Default for CurlSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(30),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
        }
    }
}

/// Transport using one blocking curl easy handle per request on the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct CurlTransport {
    settings: CurlSettings,
}

impl CurlTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Transport for CurlTransport {
    async fn probe_size(&self, url: &str) -> Result<Option<u64>, FetchError> {
        let url = url.to_string();
        let settings = self.settings.clone();
        let head = tokio::task::spawn_blocking(move || head::probe_with(&url, &settings))
            .await
            .map_err(|e| FetchError::Worker(e.to_string()))??;
        Ok(head.content_length)
    }

    async fn fetch_range(
        &self,
        url: &str,
        range: ByteRange,
        abort: CancellationToken,
    ) -> Result<RangeResponse, FetchError> {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body) = BodyStream::channel(BODY_QUEUE);
        let url = url.to_string();
        let settings = self.settings.clone();
        let worker = tokio::task::spawn_blocking(move || {
            range_get(&settings, &url, range, &abort, head_tx, body_tx)
        });

        match head_rx.await {
            Ok(head) => Ok(RangeResponse {
                status: head.status,
                content_range: head.content_range,
                body,
            }),
            // The worker gave up before any response arrived.
            Err(_) => match worker.await {
                Ok(Err(e)) => Err(e),
                Ok(Ok(())) => Err(FetchError::Worker("no response received".into())),
                Err(e) => Err(FetchError::Worker(e.to_string())),
            },
        }
    }
}

/// Runs one range GET to completion on the current (blocking) thread.
///
/// The response head goes to `head_tx` before the first body block. Errors
/// after that point are delivered in-band through `body_tx`; errors before it
/// are returned.
fn range_get(
    settings: &CurlSettings,
    url: &str,
    range: ByteRange,
    abort: &CancellationToken,
    head_tx: oneshot::Sender<ResponseHead>,
    body_tx: BodySender,
) -> Result<(), FetchError> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.connect_timeout(settings.connect_timeout)?;
    easy.low_speed_limit(settings.low_speed_limit)?;
    easy.low_speed_time(settings.low_speed_time)?;
    easy.range(&range.curl_value())?;
    easy.progress(true)?;

    let mut list = curl::easy::List::new();
    list.append(PRIORITY_HEADER)?;
    easy.http_headers(list)?;

    let lines: RefCell<Vec<String>> = RefCell::new(Vec::new());
    let head_tx = RefCell::new(Some(head_tx));
    let receiver_gone = RefCell::new(false);

    let send_head = |fallback_status: u32| {
        if let Some(tx) = head_tx.borrow_mut().take() {
            let head = parse::parse_response_head(&lines.borrow()).unwrap_or(ResponseHead {
                status: fallback_status,
                content_range: None,
            });
            let _ = tx.send(head);
        }
    };

    let performed = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                let line = s.trim_end();
                if line.starts_with("HTTP/") {
                    lines.borrow_mut().clear();
                }
                lines.borrow_mut().push(line.to_string());
            }
            true
        })?;
        transfer.write_function(|data| {
            if abort.is_cancelled() {
                return Ok(0);
            }
            send_head(0);
            if body_tx.blocking_send(Ok(data.to_vec())).is_err() {
                *receiver_gone.borrow_mut() = true;
                return Ok(0);
            }
            Ok(data.len())
        })?;
        transfer.progress_function(|_, _, _, _| !abort.is_cancelled())?;
        transfer.perform()
    };

    let head_pending = head_tx.borrow().is_some();
    match performed {
        Ok(()) => {
            // Empty bodies never reach the write callback.
            let status = easy.response_code().unwrap_or(0);
            send_head(status);
            Ok(())
        }
        Err(e) => {
            let err = if abort.is_cancelled() || *receiver_gone.borrow() || e.is_aborted_by_callback() {
                FetchError::Aborted
            } else {
                FetchError::Curl(e)
            };
            if head_pending {
                Err(err)
            } else {
                let _ = body_tx.blocking_send(Err(err));
                Ok(())
            }
        }
    }
}
