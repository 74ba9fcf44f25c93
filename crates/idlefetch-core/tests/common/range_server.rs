//! Minimal HTTP/1.1 server for curl transport tests.
//!
//! Serves one static body at every path. HEAD reports the length; GET honors
//! a single `Range: bytes=a-b` with 206, answers past-the-end ranges with 416
//! and can be told to ignore ranges altogether. Every request line and its
//! `Range`/`Priority` headers are recorded.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405.
    pub head_allowed: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
        }
    }
}

/// What the server saw for one request.
#[derive(Debug, Clone, Default)]
pub struct Seen {
    pub method: String,
    pub range: Option<String>,
    pub priority: Option<String>,
}

pub struct RangeServer {
    pub url: String,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl RangeServer {
    pub fn requests(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

/// Serve `body` from a background thread until the process exits.
pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let log = Arc::clone(&log);
            thread::spawn(move || handle(stream, &body, opts, &log));
        }
    });
    RangeServer {
        url: format!("http://127.0.0.1:{}/blob.bin", port),
        seen,
    }
}

fn handle(mut stream: TcpStream, body: &[u8], opts: RangeServerOptions, log: &Mutex<Vec<Seen>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let seen = parse_request(request);
    log.lock().unwrap().push(seen.clone());
    let total = body.len() as u64;

    match seen.method.as_str() {
        "HEAD" if opts.head_allowed => {
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\n\r\n",
                total
            );
            let _ = stream.write_all(response.as_bytes());
        }
        "GET" => {
            let range = seen.range.as_deref().and_then(parse_range);
            let (status, content_range, slice) = match range {
                Some((start, _)) if opts.support_ranges && start >= total => (
                    "416 Range Not Satisfiable",
                    Some(format!("bytes */{}", total)),
                    &body[0..0],
                ),
                Some((start, end)) if opts.support_ranges => {
                    let end = end.min(total - 1);
                    (
                        "206 Partial Content",
                        Some(format!("bytes {}-{}/{}", start, end, total)),
                        &body[start as usize..=end as usize],
                    )
                }
                _ => ("200 OK", None, body),
            };
            let mut head = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\n", status, slice.len());
            if let Some(cr) = content_range {
                head.push_str(&format!("Content-Range: {}\r\n", cr));
            }
            head.push_str("\r\n");
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(slice);
        }
        _ => {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        }
    }
}

fn parse_request(request: &str) -> Seen {
    let mut seen = Seen::default();
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if seen.method.is_empty() {
            seen.method = line.split_whitespace().next().unwrap_or("").to_ascii_uppercase();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = Some(value.trim().to_string());
            match name.trim().to_ascii_lowercase().as_str() {
                "range" => seen.range = value,
                "priority" => seen.priority = value,
                _ => {}
            }
        }
    }
    seen
}

/// `bytes=a-b` or `bytes=a-`, as (start, end inclusive).
fn parse_range(value: &str) -> Option<(u64, u64)> {
    let spec = value.strip_prefix("bytes=")?;
    let (a, b) = spec.split_once('-')?;
    let start = a.trim().parse().ok()?;
    let end = match b.trim() {
        "" => u64::MAX,
        b => b.parse().ok()?,
    };
    Some((start, end))
}
