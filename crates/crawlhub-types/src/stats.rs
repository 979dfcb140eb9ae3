//! Serializable counter snapshots exposed by `CrawlSystemSupervisor::stats`.

use serde::{Deserialize, Serialize};

/// Queue depth/error counters for one backend, approximated where the
/// backend cannot report exact counts cheaply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub frontier_normal: u64,
    pub frontier_priority: u64,
    pub parse_normal: u64,
    pub parse_priority: u64,
    pub retry: u64,
    pub dead_letter: u64,
    pub enqueue_errors: u64,
    pub dequeue_errors: u64,
}

/// Aggregate counters from every crawl worker and parse worker, combined
/// with the broker's own [`QueueStats`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlerStats {
    pub urls_crawled: u64,
    pub urls_failed: u64,
    pub conditional_requests: u64,
    pub not_modified_responses: u64,
    pub large_pages_skipped: u64,
    pub js_rendered_pages: u64,
    pub bytes_downloaded: u64,
    pub avg_response_time_ms: f64,
    pub parse_tasks_processed: u64,
    pub parse_tasks_failed: u64,
    pub frontier_urls_discovered: u64,
    pub queue: QueueStats,
}

impl CrawlerStats {
    /// Folds a single fetch's timing into the running average response time.
    pub fn record_response_time(&mut self, sample_ms: f64) {
        let n = self.urls_crawled as f64;
        if n <= 0.0 {
            self.avg_response_time_ms = sample_ms;
        } else {
            self.avg_response_time_ms = (self.avg_response_time_ms * n + sample_ms) / (n + 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_average_converges_to_mean() {
        let mut stats = CrawlerStats::default();
        for sample in [100.0, 200.0, 300.0] {
            stats.record_response_time(sample);
            stats.urls_crawled += 1;
        }
        assert!((stats.avg_response_time_ms - 200.0).abs() < 1e-6);
    }
}
