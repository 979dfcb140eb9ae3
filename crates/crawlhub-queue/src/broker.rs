//! The `QueueBroker` trait every backend variant implements, plus the
//! tagged-enum constructor that replaces runtime duck-typed dispatch with
//! one struct per backend.

use async_trait::async_trait;
use crawlhub_types::{CrawlerStats, FrontierURL, ParseTask, QueueStats};

use crate::in_process::InProcessBroker;
use crate::list_store::{ListStoreBroker, ListStoreConfig};

/// Backend selected at construction time. Each variant owns the
/// configuration its backend needs; `build()` returns a boxed trait object
/// so workers hold `Arc<dyn QueueBroker>` without caring which backend is
/// live behind it.
pub enum BrokerBackend {
    InProcess,
    ListStore(ListStoreConfig),
    Streaming(crate::streaming::StreamingConfig),
    CloudQueue(crate::cloud_queue::CloudQueueConfig),
}

impl BrokerBackend {
    pub async fn build(self) -> Result<std::sync::Arc<dyn QueueBroker>, crawlhub_types::EngineError> {
        Ok(match self {
            BrokerBackend::InProcess => std::sync::Arc::new(InProcessBroker::new()),
            BrokerBackend::ListStore(config) => std::sync::Arc::new(ListStoreBroker::connect(config).await?),
            BrokerBackend::Streaming(config) => std::sync::Arc::new(crate::streaming::StreamingBroker::new(config)),
            BrokerBackend::CloudQueue(config) => std::sync::Arc::new(crate::cloud_queue::CloudQueueBroker::new(config)),
        })
    }
}

/// The single interface every queue backend variant satisfies (§4.1).
///
/// Enqueue failures return `false`/an error rather than retrying
/// in-process — the caller's own dead-letter path handles persistence of
/// failed work, per the "at-least-once, best-effort priority" contract.
#[async_trait]
pub trait QueueBroker: Send + Sync {
    async fn enqueue_frontier(&self, url: FrontierURL) -> bool;
    async fn dequeue_frontier(&self) -> Option<FrontierURL>;
    async fn enqueue_parse(&self, task: ParseTask) -> bool;
    async fn dequeue_parse(&self) -> Option<ParseTask>;
    async fn enqueue_retry(&self, url: FrontierURL, delay_secs: u64) -> bool;
    async fn enqueue_dead(&self, url: FrontierURL, reason: String) -> bool;
    async fn stats(&self) -> QueueStats;
    /// Promotes every retry entry whose `retry_after <= now` back to the
    /// frontier queue; returns how many were moved. Called periodically by
    /// the retry scheduler.
    async fn process_retry(&self) -> usize;
}

/// Umbrella counters a supervisor aggregates across crawl/parse workers
/// alongside whatever `stats()` a broker reports for its own queues.
pub fn merge_queue_stats_into(stats: &mut CrawlerStats, queue: QueueStats) {
    stats.queue = queue;
}
