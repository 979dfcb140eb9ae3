//! In-process backend: two sequences per logical queue (priority + normal),
//! a sorted retry list, and an append-only dead list. No persistence.

use std::collections::VecDeque;

use async_trait::async_trait;
use crawlhub_types::{
    DeadLetterEntry, FrontierURL, ParseTask, QueueStats, RetryEntry, PRIORITY_LANE_THRESHOLD,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::broker::QueueBroker;

#[derive(Default)]
struct Queues {
    frontier_priority: VecDeque<FrontierURL>,
    frontier_normal: VecDeque<FrontierURL>,
    parse_priority: VecDeque<ParseTask>,
    parse_normal: VecDeque<ParseTask>,
    retry: Vec<RetryEntry>,
    dead: Vec<DeadLetterEntry>,
}

/// `Arc`-free: the broker itself is cheap to clone-share via `Arc<dyn
/// QueueBroker>` at the call site, so the struct just owns a single lock.
pub struct InProcessBroker {
    queues: Mutex<Queues>,
}

impl InProcessBroker {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(Queues::default()),
        }
    }
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBroker for InProcessBroker {
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

    async fn enqueue_retry(&self, url: FrontierURL, delay_secs: u64) -> bool {
        let mut queues = self.queues.lock().await;
        queues.retry.push(RetryEntry::new(url, delay_secs));
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
            retry: queues.retry.len() as u64,
            dead_letter: queues.dead.len() as u64,
            enqueue_errors: 0,
            dequeue_errors: 0,
        }
    }

    async fn process_retry(&self) -> usize {
        let now = chrono::Utc::now();
        let mut queues = self.queues.lock().await;
        let (ready, pending): (Vec<_>, Vec<_>) = queues.retry.drain(..).partition(|e| e.is_ready(now));
        queues.retry = pending;

        let moved = ready.len();
        for entry in ready {
            if entry.url.is_priority_lane() {
                queues.frontier_priority.push_back(entry.url);
            } else {
                queues.frontier_normal.push_back(entry.url);
            }
        }
        debug!(moved, "promoted retry entries to frontier");
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
    async fn priority_lane_drains_before_normal() {
        let broker = InProcessBroker::new();
        broker.enqueue_frontier(url("https://a.example.com/")).await;
        broker
            .enqueue_frontier(url("https://b.example.com/").with_priority(9))
            .await;

        let first = broker.dequeue_frontier().await.unwrap();
        assert_eq!(first.domain(), "b.example.com");
    }

    #[tokio::test]
    async fn retry_entries_promote_only_once_ready() {
        let broker = InProcessBroker::new();
        broker.enqueue_retry(url("https://example.com/"), 0).await;
        let moved = broker.process_retry().await;
        assert_eq!(moved, 1);
        assert!(broker.dequeue_frontier().await.is_some());
    }

    #[tokio::test]
    async fn dead_letter_is_append_only_and_counted_in_stats() {
        let broker = InProcessBroker::new();
        broker
            .enqueue_dead(url("https://example.com/"), "exceeded retries".to_string())
            .await;
        let stats = broker.stats().await;
        assert_eq!(stats.dead_letter, 1);
    }
}
