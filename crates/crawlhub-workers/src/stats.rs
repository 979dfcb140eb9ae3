//! Per-worker atomic counters folded into a [`CrawlerStats`] snapshot on
//! demand, the same running-counter-plus-snapshot split the reference
//! worker metrics collector uses.

use std::sync::atomic::{AtomicU64, Ordering};

use crawlhub_types::CrawlerStats;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct EngineCounters {
    pub urls_crawled: AtomicU64,
    pub urls_failed: AtomicU64,
    pub conditional_requests: AtomicU64,
    pub not_modified_responses: AtomicU64,
    pub large_pages_skipped: AtomicU64,
    pub js_rendered_pages: AtomicU64,
    pub bytes_downloaded: AtomicU64,
    pub parse_tasks_processed: AtomicU64,
    pub parse_tasks_failed: AtomicU64,
    pub frontier_urls_discovered: AtomicU64,
    response_times: RwLock<CrawlerStats>,
}

impl EngineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_crawled(&self, bytes: u64) {
        self.urls_crawled.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.urls_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conditional_request(&self) {
        self.conditional_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_modified(&self) {
        self.not_modified_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_large_skipped(&self) {
        self.large_pages_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_js_rendered(&self) {
        self.js_rendered_pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_processed(&self) {
        self.parse_tasks_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_failed(&self) {
        self.parse_tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frontier_discovered(&self, count: u64) {
        self.frontier_urls_discovered
            .fetch_add(count, Ordering::Relaxed);
    }

    pub async fn record_response_time(&self, sample_ms: f64) {
        let mut running = self.response_times.write().await;
        running.record_response_time(sample_ms);
        running.urls_crawled += 1;
    }

    pub async fn snapshot(&self) -> CrawlerStats {
        let avg = self.response_times.read().await.avg_response_time_ms;
        CrawlerStats {
            urls_crawled: self.urls_crawled.load(Ordering::Relaxed),
            urls_failed: self.urls_failed.load(Ordering::Relaxed),
            conditional_requests: self.conditional_requests.load(Ordering::Relaxed),
            not_modified_responses: self.not_modified_responses.load(Ordering::Relaxed),
            large_pages_skipped: self.large_pages_skipped.load(Ordering::Relaxed),
            js_rendered_pages: self.js_rendered_pages.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            avg_response_time_ms: avg,
            parse_tasks_processed: self.parse_tasks_processed.load(Ordering::Relaxed),
            parse_tasks_failed: self.parse_tasks_failed.load(Ordering::Relaxed),
            frontier_urls_discovered: self.frontier_urls_discovered.load(Ordering::Relaxed),
            queue: Default::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_reflects_recorded_counters() {
        let counters = EngineCounters::new();
        counters.record_crawled(1024);
        counters.record_not_modified();
        counters.record_response_time(100.0).await;

        let snapshot = counters.snapshot().await;
        assert_eq!(snapshot.urls_crawled, 1);
        assert_eq!(snapshot.bytes_downloaded, 1024);
        assert_eq!(snapshot.not_modified_responses, 1);
        assert_eq!(snapshot.avg_response_time_ms, 100.0);
    }
}
