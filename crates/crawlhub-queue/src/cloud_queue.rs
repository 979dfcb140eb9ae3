//! Cloud-managed queue backend (an SQS/Cloud Tasks-like model).
//!
//! Like `streaming`, no managed-queue client crate appears in the example
//! corpus, so this variant is an in-memory simulation. It models what a
//! managed queue actually gives you that a plain list doesn't: native
//! delay-seconds scheduling on enqueue (so `enqueue_retry` doesn't need its
//! own sweep) and a queue-native dead-letter sink.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crawlhub_types::{
    DeadLetterEntry, FrontierURL, ParseTask, QueueStats, PRIORITY_LANE_THRESHOLD,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::broker::QueueBroker;

#[derive(Debug, Clone)]
pub struct CloudQueueConfig {
    pub queue_prefix: String,
}

impl Default for CloudQueueConfig {
    fn default() -> Self {
        Self {
            queue_prefix: "crawlhub".to_string(),
        }
    }
}

struct DelayedFrontier {
    url: FrontierURL,
    visible_at: DateTime<Utc>,
}

#[derive(Default)]
struct Queues {
    frontier_priority: VecDeque<FrontierURL>,
    frontier_normal: VecDeque<FrontierURL>,
    parse_priority: VecDeque<ParseTask>,
    parse_normal: VecDeque<ParseTask>,
    delayed: Vec<DelayedFrontier>,
    dead: Vec<DeadLetterEntry>,
}

pub struct CloudQueueBroker {
    _config: CloudQueueConfig,
    queues: Mutex<Queues>,
}

impl CloudQueueBroker {
    pub fn new(config: CloudQueueConfig) -> Self {
        Self {
            _config: config,
            queues: Mutex::new(Queues::default()),
        }
    }
}

#[async_trait]
impl QueueBroker for CloudQueueBroker {
    async fn enqueue_frontier(&self, url: FrontierURL) -> bool {
        let mut queues = self.queues.lock().await;
        if url.is_priority_lane() {
            queues.frontier_priority.push_back(url);
        } else {
            queues.frontier_normal.push_back(url);
        }
        true
    }

    async fn dequeue_frontier(&self) -> Option<FrontierURL> {
        let mut queues = self.queues.lock().await;
        queues
            .frontier_priority
            .pop_front()
            .or_else(|| queues.frontier_normal.pop_front())
    }

    async fn enqueue_parse(&self, task: ParseTask) -> bool {
        let mut queues = self.queues.lock().await;
        if task.priority() >= PRIORITY_LANE_THRESHOLD {
            queues.parse_priority.push_back(task);
        } else {
            queues.parse_normal.push_back(task);
        }
        true
    }

    async fn dequeue_parse(&self) -> Option<ParseTask> {
        let mut queues = self.queues.lock().await;
        queues
            .parse_priority
            .pop_front()
            .or_else(|| queues.parse_normal.pop_front())
    }

    /// Uses the queue's native delay-seconds visibility mechanism: the
    /// message sits invisible until `visible_at` rather than living in a
    /// caller-managed sorted set.
    async fn enqueue_retry(&self, url: FrontierURL, delay_secs: u64) -> bool {
        let mut queues = self.queues.lock().await;
        queues.delayed.push(DelayedFrontier {
            url,
            visible_at: Utc::now() + chrono::Duration::seconds(delay_secs as i64),
        });
        true
    }

    async fn enqueue_dead(&self, url: FrontierURL, reason: String) -> bool {
        let mut queues = self.queues.lock().await;
        queues.dead.push(DeadLetterEntry::new(url, reason));
        true
    }

    async fn stats(&self) -> QueueStats {
        let queues = self.queues.lock().await;
        QueueStats {
            frontier_normal: queues.frontier_normal.len() as u64,
            frontier_priority: queues.frontier_priority.len() as u64,
            parse_normal: queues.parse_normal.len() as u64,
            parse_priority: queues.parse_priority.len() as u64,
            retry: queues.delayed.len() as u64,
            dead_letter: queues.dead.len() as u64,
            enqueue_errors: 0,
            dequeue_errors: 0,
        }
    }

    async fn process_retry(&self) -> usize {
        let now = Utc::now();
        let mut queues = self.queues.lock().await;
        let (ready, pending): (Vec<_>, Vec<_>) = queues
            .delayed
            .drain(..)
            .partition(|d| d.visible_at <= now);
        queues.delayed = pending;

        let moved = ready.len();
        for entry in ready {
            if entry.url.is_priority_lane() {
                queues.frontier_priority.push_back(entry.url);
            } else {
                queues.frontier_normal.push_back(entry.url);
            }
        }
        debug!(moved, "delayed messages became visible");
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn url(s: &str) -> FrontierURL {
        FrontierURL::new(Url::parse(s).unwrap(), "job-1")
    }

    #[tokio::test]
    async fn zero_delay_retry_is_immediately_visible() {
        let broker = CloudQueueBroker::new(CloudQueueConfig::default());
        broker.enqueue_retry(url("https://example.com/"), 0).await;
        assert_eq!(broker.process_retry().await, 1);
        assert!(broker.dequeue_frontier().await.is_some());
    }

    #[tokio::test]
    async fn future_delay_stays_invisible_until_processed() {
        let broker = CloudQueueBroker::new(CloudQueueConfig::default());
        broker
            .enqueue_retry(url("https://example.com/"), 3600)
            .await;
        assert_eq!(broker.process_retry().await, 0);
        assert!(broker.dequeue_frontier().await.is_none());
    }
}
