//! The per-URL bookkeeping row owned exclusively by the crawl record store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::frontier::derive_domain;

/// Per-URL metadata: last fetch time, conditional-request state, and the
/// recrawl schedule. At most one active row exists per URL; `upsert` is
/// idempotent under retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRecord {
    pub url: String,
    pub url_hash: String,
    pub domain: String,
    pub first_crawled_at: DateTime<Utc>,
    pub last_crawled_at: DateTime<Utc>,
    pub crawl_count: u64,
    pub status: String,
    pub last_status_code: Option<u16>,
    pub recrawl_interval_hours: i64,
    pub next_crawl_at: DateTime<Utc>,
    pub content_size: Option<u64>,
    pub requires_js: bool,
    pub is_dynamic: bool,
    pub link_depth: u32,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

/// `sha2`-backed digest used both as the CRS primary key and in the
/// `{domain}/{job_id}/{uuid}.html` storage-key convention documented in §4.5.
pub fn url_hash(url: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    hex_encode(hasher.finalize().as_slice())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

impl CrawlRecord {
    /// Builds the first row for a URL that was just fetched successfully.
    pub fn first_seen(url: &Url, link_depth: u32) -> Self {
        let now = Utc::now();
        Self {
            url: url.to_string(),
            url_hash: url_hash(url),
            domain: derive_domain(url),
            first_crawled_at: now,
            last_crawled_at: now,
            crawl_count: 0,
            status: "ok".to_string(),
            last_status_code: None,
            recrawl_interval_hours: 24,
            next_crawl_at: now,
            content_size: None,
            requires_js: false,
            is_dynamic: false,
            link_depth,
            last_modified: None,
            etag: None,
        }
    }

    /// `recrawl_interval_hours` selection from §4.5 step 9: 6 if dynamic,
    /// 12 if rendered with JS, else 24.
    pub fn recrawl_interval_for(is_dynamic: bool, rendered_with_js: bool) -> i64 {
        if is_dynamic {
            6
        } else if rendered_with_js {
            12
        } else {
            24
        }
    }

    /// Applies a successful fetch to this row in place, recomputing
    /// `next_crawl_at` from the new `last_crawled_at`.
    #[allow(clippy::too_many_arguments)]
    pub fn record_success(
        &mut self,
        status_code: u16,
        content_size: u64,
        requires_js: bool,
        is_dynamic: bool,
        rendered_with_js: bool,
        etag: Option<String>,
        last_modified: Option<String>,
    ) {
        let now = Utc::now();
        self.last_crawled_at = now;
        self.crawl_count += 1;
        self.status = "ok".to_string();
        self.last_status_code = Some(status_code);
        self.content_size = Some(content_size);
        self.requires_js = requires_js;
        self.is_dynamic = is_dynamic;
        if etag.is_some() {
            self.etag = etag;
        }
        if last_modified.is_some() {
            self.last_modified = last_modified;
        }
        self.recrawl_interval_hours = Self::recrawl_interval_for(is_dynamic, rendered_with_js);
        self.next_crawl_at = now + Duration::hours(self.recrawl_interval_hours);
    }

    /// `304 Not Modified`: only the freshness timestamp moves forward.
    pub fn record_not_modified(&mut self) {
        let now = Utc::now();
        self.last_crawled_at = now;
        self.status = "not_modified".to_string();
        self.last_status_code = Some(304);
        self.next_crawl_at = now + Duration::hours(self.recrawl_interval_hours);
    }

    pub fn due_for_recrawl(&self, now: DateTime<Utc>) -> bool {
        self.next_crawl_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recrawl_interval_prefers_dynamic_over_js() {
        assert_eq!(CrawlRecord::recrawl_interval_for(true, true), 6);
        assert_eq!(CrawlRecord::recrawl_interval_for(true, false), 6);
        assert_eq!(CrawlRecord::recrawl_interval_for(false, true), 12);
        assert_eq!(CrawlRecord::recrawl_interval_for(false, false), 24);
    }

    #[test]
    fn url_hash_is_64_hex_chars() {
        let url = Url::parse("https://example.com/").unwrap();
        let hash = url_hash(&url);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn record_success_recomputes_next_crawl_at() {
        let url = Url::parse("https://example.com/").unwrap();
        let mut record = CrawlRecord::first_seen(&url, 0);
        record.record_success(200, 1024, false, false, false, None, None);
        assert_eq!(record.recrawl_interval_hours, 24);
        assert_eq!(
            record.next_crawl_at,
            record.last_crawled_at + Duration::hours(24)
        );
    }
}
