//! The crawl record store: a narrow external collaborator (§6). The core
//! treats each read/write as an independent transaction and accepts
//! last-write-wins under concurrent updates for the same URL.

use async_trait::async_trait;
use crawlhub_types::CrawlRecord;
use dashmap::DashMap;

#[async_trait]
pub trait CrawlRecordStore: Send + Sync {
    async fn get_by_url_hash(&self, url_hash: &str) -> Option<CrawlRecord>;
    async fn upsert(&self, record: CrawlRecord);
}

/// Reference implementation: a concurrent map keyed by `url_hash`, the same
/// lock-striped `DashMap` pattern the pool registry in this crate family
/// uses for its worker table.
#[derive(Default)]
pub struct InMemoryCrawlRecordStore {
    rows: DashMap<String, CrawlRecord>,
}

impl InMemoryCrawlRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CrawlRecordStore for InMemoryCrawlRecordStore {
    async fn get_by_url_hash(&self, url_hash: &str) -> Option<CrawlRecord> {
        self.rows.get(url_hash).map(|r| r.clone())
    }

    async fn upsert(&self, record: CrawlRecord) {
        self.rows.insert(record.url_hash.clone(), record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = InMemoryCrawlRecordStore::new();
        let url = Url::parse("https://example.com/").unwrap();
        let record = CrawlRecord::first_seen(&url, 0);
        let hash = record.url_hash.clone();

        store.upsert(record).await;
        let fetched = store.get_by_url_hash(&hash).await.unwrap();
        assert_eq!(fetched.url, "https://example.com/");
    }

    #[tokio::test]
    async fn missing_hash_returns_none() {
        let store = InMemoryCrawlRecordStore::new();
        assert!(store.get_by_url_hash("deadbeef").await.is_none());
    }
}
