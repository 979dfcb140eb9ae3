//! The frontier: URLs waiting to be fetched.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A tagged-variant value for the free-form metadata side-channel carried by
/// [`FrontierURL`] and [`crate::parse::ParseTask`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    Number(i64),
    Bool(bool),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Lowest priority value that still sits in the normal lane.
pub const DEFAULT_PRIORITY: u8 = 5;
/// Priority at or above which `enqueue_frontier` routes to the priority lane.
pub const PRIORITY_LANE_THRESHOLD: u8 = 8;
/// Default retry budget for a freshly seeded or discovered URL.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A URL scheduled to be fetched by a crawl worker.
///
/// Equality/dedup key is `(url, job_id)` for in-flight uniqueness only; the
/// engine does not globally deduplicate across time (a URL may legitimately
/// be re-enqueued once its recrawl interval has elapsed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierURL {
    pub url: Url,
    pub source_url: Option<Url>,
    pub job_id: String,
    priority: u8,
    pub depth: u32,
    pub link_depth: u32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub requires_js: bool,
    pub is_dynamic: bool,
    pub content_size_estimate: Option<u64>,
    domain: String,
    pub metadata: HashMap<String, MetadataValue>,
    pub tags: Vec<String>,
}

impl FrontierURL {
    /// Creates a new frontier entry at depth 0, scheduled immediately.
    pub fn new(url: Url, job_id: impl Into<String>) -> Self {
        let domain = derive_domain(&url);
        let now = Utc::now();
        Self {
            url,
            source_url: None,
            job_id: job_id.into(),
            priority: DEFAULT_PRIORITY,
            depth: 0,
            link_depth: 0,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            scheduled_at: now,
            created_at: now,
            requires_js: false,
            is_dynamic: false,
            content_size_estimate: None,
            domain,
            metadata: HashMap::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 10);
        self
    }

    pub fn with_source(mut self, source_url: Url) -> Self {
        self.source_url = Some(source_url);
        self
    }

    pub fn with_depth(mut self, depth: u32, link_depth: u32) -> Self {
        self.depth = depth;
        self.link_depth = link_depth;
        self
    }

    pub fn with_requires_js(mut self, requires_js: bool) -> Self {
        self.requires_js = requires_js;
        self
    }

    pub fn with_is_dynamic(mut self, is_dynamic: bool) -> Self {
        self.is_dynamic = is_dynamic;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Priority clamped to `[1, 10]` at construction time; exposed read-only
    /// so callers cannot violate the invariant after the fact.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn is_priority_lane(&self) -> bool {
        self.priority >= PRIORITY_LANE_THRESHOLD
    }

    /// Host component of `url`, always derived, never free-form.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn mark_scheduled_at(&mut self, at: DateTime<Utc>) {
        self.scheduled_at = at;
    }

    pub fn is_ready(&self) -> bool {
        self.scheduled_at <= Utc::now()
    }

    /// Bumps `retry_count`, returning `true` if the retry budget is now
    /// exhausted (caller should dead-letter rather than retry again).
    pub fn record_failure(&mut self) -> bool {
        self.retry_count += 1;
        self.retry_count > self.max_retries
    }
}

pub(crate) fn derive_domain(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn priority_is_clamped() {
        let f = FrontierURL::new(url("https://example.com/"), "job-1").with_priority(20);
        assert_eq!(f.priority(), 10);
        let f = FrontierURL::new(url("https://example.com/"), "job-1").with_priority(0);
        assert_eq!(f.priority(), 1);
    }

    #[test]
    fn priority_lane_threshold() {
        let f = FrontierURL::new(url("https://example.com/"), "job-1").with_priority(8);
        assert!(f.is_priority_lane());
        let f = FrontierURL::new(url("https://example.com/"), "job-1").with_priority(7);
        assert!(!f.is_priority_lane());
    }

    #[test]
    fn domain_is_derived_lowercase() {
        let f = FrontierURL::new(url("https://Example.COM/path"), "job-1");
        assert_eq!(f.domain(), "example.com");
    }

    #[test]
    fn record_failure_exhausts_after_max_retries() {
        let mut f = FrontierURL::new(url("https://example.com/"), "job-1").with_max_retries(2);
        assert!(!f.record_failure());
        assert!(!f.record_failure());
        assert!(f.record_failure());
    }
}
