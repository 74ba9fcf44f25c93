//! Parse HTTP response header lines.

use super::head::HeadResult;
use super::ContentRange;

/// Status line and range metadata of one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResponseHead {
    pub status: u32,
    pub content_range: Option<ContentRange>,
}

/// Status code from an `HTTP/x.y NNN reason` line.
pub fn parse_status_line(line: &str) -> Option<u32> {
    let mut parts = line.trim().split_whitespace();
    let proto = parts.next()?;
    if !proto.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

/// Parse a `Content-Range` value such as `bytes 0-99/1000`.
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let value = value.trim();
    let rest = value
        .get(..6)
        .filter(|unit| unit.eq_ignore_ascii_case("bytes "))
        .map(|_| value[6..].trim())?;
    let (span, total) = rest.split_once('/')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse::<u64>().ok()?),
    };
    let span = match span.trim() {
        "*" => None,
        s => {
            let (a, b) = s.split_once('-')?;
            let start = a.trim().parse::<u64>().ok()?;
            let end = b.trim().parse::<u64>().ok()?;
            if end < start {
                return None;
            }
            Some((start, end))
        }
    };
    if span.is_none() && total.is_none() {
        return None;
    }
    Some(ContentRange { span, total })
}

fn header<'a>(line: &'a str, wanted: &str) -> Option<&'a str> {
    let (name, value) = line.split_once(':')?;
    name.trim()
        .eq_ignore_ascii_case(wanted)
        .then(|| value.trim())
}

/// Status and `Content-Range` of the last response in `lines`.
///
/// Redirects produce several header blocks; callers clear `lines` whenever a
/// new status line arrives, but a stale block is tolerated here too.
pub(crate) fn parse_response_head(lines: &[String]) -> Option<ResponseHead> {
    let mut head: Option<ResponseHead> = None;
    for line in lines {
        if let Some(status) = parse_status_line(line) {
            head = Some(ResponseHead {
                status,
                content_range: None,
            });
            continue;
        }
        if let (Some(h), Some(value)) = (head.as_mut(), header(line, "content-range")) {
            h.content_range = parse_content_range(value);
        }
    }
    head
}

/// Parse collected HEAD response lines into a [`HeadResult`].
pub(crate) fn parse_headers(lines: &[String]) -> HeadResult {
    let mut content_length = None;
    let mut accept_ranges = false;

    for line in lines {
        if parse_status_line(line).is_some() {
            content_length = None;
            accept_ranges = false;
            continue;
        }
        if let Some(value) = header(line, "content-length") {
            if let Ok(n) = value.parse::<u64>() {
                content_length = Some(n);
            }
        }
        if let Some(value) = header(line, "accept-ranges") {
            accept_ranges = value.eq_ignore_ascii_case("bytes");
        }
    }

    HeadResult {
        content_length,
        accept_ranges,
    }
}
