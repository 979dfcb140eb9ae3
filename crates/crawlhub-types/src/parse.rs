//! Units of work handed from a crawl worker to a parse worker.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::frontier::{derive_domain, MetadataValue, DEFAULT_MAX_RETRIES};

/// Content types routed through the OCR path instead of the HTML parser.
const OCR_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/tiff",
    "image/bmp",
    "application/pdf",
];

/// A stored raw body that needs link extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseTask {
    pub task_id: Uuid,
    pub url: Url,
    pub raw_id: String,
    pub storage_location: String,
    pub content_type: String,
    priority: u8,
    pub retry_count: u32,
    pub max_retries: u32,
    pub requires_ocr: bool,
    pub metadata: HashMap<String, MetadataValue>,
    pub created_at: DateTime<Utc>,
}

impl ParseTask {
    pub fn new(
        url: Url,
        raw_id: impl Into<String>,
        storage_location: impl Into<String>,
        content_type: impl Into<String>,
        priority: u8,
    ) -> Self {
        let content_type = content_type.into();
        let requires_ocr = content_type.starts_with("image/")
            || OCR_CONTENT_TYPES.contains(&content_type.as_str());
        Self {
            task_id: Uuid::new_v4(),
            url,
            raw_id: raw_id.into(),
            storage_location: storage_location.into(),
            content_type,
            priority: priority.clamp(1, 10),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            requires_ocr,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Priority inherited by URLs this task's parse step discovers:
    /// decremented by one, floored at 1.
    pub fn child_priority(&self) -> u8 {
        self.priority.saturating_sub(1).max(1)
    }

    pub fn domain(&self) -> String {
        derive_domain(&self.url)
    }

    pub fn job_id(&self) -> Option<&str> {
        match self.metadata.get("job_id") {
            Some(MetadataValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn link_depth(&self) -> u32 {
        match self.metadata.get("link_depth") {
            Some(MetadataValue::Number(n)) => (*n).max(0) as u32,
            _ => 0,
        }
    }

    pub fn record_failure(&mut self) -> bool {
        self.retry_count += 1;
        self.retry_count > self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn image_content_type_requires_ocr() {
        let t = ParseTask::new(url("https://example.com/a.png"), "raw-1", "loc", "image/png", 5);
        assert!(t.requires_ocr);
    }

    #[test]
    fn html_content_type_does_not_require_ocr() {
        let t = ParseTask::new(url("https://example.com/"), "raw-1", "loc", "text/html", 5);
        assert!(!t.requires_ocr);
    }

    #[test]
    fn child_priority_is_decremented_and_floored() {
        let t = ParseTask::new(url("https://example.com/"), "raw-1", "loc", "text/html", 1);
        assert_eq!(t.child_priority(), 1);
        let t = ParseTask::new(url("https://example.com/"), "raw-1", "loc", "text/html", 5);
        assert_eq!(t.child_priority(), 4);
    }
}
