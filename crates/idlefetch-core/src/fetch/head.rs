//! HEAD size probe.

use std::str;

use super::curl_transport::CurlSettings;
use super::parse;
use super::FetchError;

/// Result of a HEAD request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadResult {
    /// Total size in bytes, if `Content-Length` is present.
    pub content_length: Option<u64>,
    /// True if server sent `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
}

/// Performs a HEAD request and returns parsed metadata.
///
/// Follows redirects. Runs in the current thread; call from `spawn_blocking`
/// if used from async code.
pub fn probe(url: &str) -> Result<HeadResult, FetchError> {
    probe_with(url, &CurlSettings::default())
}

pub(crate) fn probe_with(url: &str, settings: &CurlSettings) -> Result<HeadResult, FetchError> {
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.nobody(true)?;
    easy.follow_location(true)?;
    easy.connect_timeout(settings.connect_timeout)?;
    easy.timeout(settings.probe_timeout)?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(FetchError::Http(code));
    }

    Ok(parse::parse_headers(&headers))
}
