//! Cache keys and on-disk names derived from URLs.
//!
//! A request's cache key defaults to the last path segment of its URL. Keys
//! are turned into Linux-safe file names before they touch the filesystem.

mod path;
mod sanitize;

pub use path::filename_from_url_path;
pub use sanitize::sanitize_file_name;

/// Key used when the URL has no usable path segment.
pub const DEFAULT_CACHE_KEY: &str = "prefetch.bin";

/// Default cache key for `url`: its last path segment.
///
/// Accepts relative locators too; query strings and fragments are ignored.
///
/// # Examples
///
/// - `cache_key_from_url("https://example.com/models/weights.bin")` → `"weights.bin"`
/// - `cache_key_from_url("https://example.com/")` → `"prefetch.bin"`
pub fn cache_key_from_url(url: &str) -> String {
    if let Some(segment) = filename_from_url_path(url) {
        return segment;
    }
    if url::Url::parse(url).is_ok() {
        return DEFAULT_CACHE_KEY.to_string();
    }
    let path = url.split(['?', '#']).next().unwrap_or("");
    match path.rsplit('/').next() {
        Some(seg) if !seg.is_empty() && seg != "." && seg != ".." => seg.to_string(),
        _ => DEFAULT_CACHE_KEY.to_string(),
    }
}

/// File name used to store `key` on disk.
pub fn cache_file_name(key: &str) -> String {
    let sanitized = sanitize_file_name(key);
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        DEFAULT_CACHE_KEY.to_string()
    } else {
        sanitized
    }
}
