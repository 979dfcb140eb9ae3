//! The blob store: a narrow external collaborator (§6) for raw fetched
//! bodies. `store` is idempotent from the caller's perspective — callers
//! never retry a failed store, they fall through to the failure path
//! instead.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RawRecord {
    pub content: Vec<u8>,
    pub content_type: String,
}

/// `{domain}/{job_id}/{uuid}.html`-shaped key, independent of `raw_id`
/// (the opaque handle `store` hands back) so backends can choose their own
/// object layout while still exposing a human-auditable path.
pub fn storage_key(domain: &str, job_id: &str, content_type: &str) -> String {
    let ext = if content_type.starts_with("image/") {
        "bin"
    } else if content_type == "application/pdf" {
        "pdf"
    } else {
        "html"
    };
    format!("{domain}/{job_id}/{}.{ext}", Uuid::new_v4())
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn store(&self, record: RawRecord) -> crawlhub_types::EngineResult<String>;
    async fn retrieve(&self, raw_id: &str) -> Option<RawRecord>;
}

/// Reference implementation backing local runs and tests: an in-memory
/// concurrent map from `raw_id` to body, no eviction.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<String, RawRecord>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn store(&self, record: RawRecord) -> crawlhub_types::EngineResult<String> {
        let raw_id = Uuid::new_v4().to_string();
        self.blobs.insert(raw_id.clone(), record);
        Ok(raw_id)
    }

    async fn retrieve(&self, raw_id: &str) -> Option<RawRecord> {
        self.blobs.get(raw_id).map(|r| r.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_retrieve_is_byte_equal() {
        let store = InMemoryBlobStore::new();
        let record = RawRecord {
            content: b"<html></html>".to_vec(),
            content_type: "text/html".to_string(),
        };
        let raw_id = store.store(record.clone()).await.unwrap();
        let fetched = store.retrieve(&raw_id).await.unwrap();
        assert_eq!(fetched.content, record.content);
        assert_eq!(fetched.content_type, record.content_type);
    }

    #[test]
    fn storage_key_picks_extension_from_content_type() {
        let key = storage_key("example.com", "job-1", "application/pdf");
        assert!(key.starts_with("example.com/job-1/"));
        assert!(key.ends_with(".pdf"));
    }
}
