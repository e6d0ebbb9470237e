//! Helper functions shared by the deduplicator, the publisher and logging.
//!
//! - URL normalization for the seen set
//! - Stable partition keys for the message queue
//! - String truncation for log fields

use sha1::{Digest, Sha1};
use url::Url;

/// Normalize a story URL into the key used by the seen set.
///
/// Surrounding whitespace is removed. URLs that parse are re-serialized in
/// canonical form (lower-cased scheme and host) with any fragment dropped;
/// anything else is kept as trimmed text so it can still be deduplicated.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(normalize_url(" HTTPS://Example.com/a#top "), "https://example.com/a");
/// assert_eq!(normalize_url("not a url"), "not a url");
/// ```
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

/// Derive the message-queue key for a normalized URL.
///
/// Lowercase hex SHA-1 of the UTF-8 bytes. The same URL always maps to the
/// same key, across runs as well as within one.
pub fn partition_key(normalized_url: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(normalized_url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at `max` bytes (backing off to a char boundary) and
/// get a `"…(+N bytes)"` suffix.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}
