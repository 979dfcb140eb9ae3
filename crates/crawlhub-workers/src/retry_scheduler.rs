//! The retry scheduler (§4.7): a single background task that promotes
//! ready retry entries back onto the frontier every 30 seconds. Reuses the
//! reference scheduler's atomic-flag-plus-spawned-loop shape, without the
//! cron/persistence machinery that loop also carries — there is exactly one
//! job here, not a table of user-defined ones.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crawlhub_queue::QueueBroker;
use tracing::{debug, info};

const TICK_INTERVAL: Duration = Duration::from_secs(30);

pub struct RetryScheduler {
    queue: Arc<dyn QueueBroker>,
    running: AtomicBool,
}

impl RetryScheduler {
    pub fn new(queue: Arc<dyn QueueBroker>) -> Self {
        Self {
            queue,
            running: AtomicBool::new(false),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub async fn run(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        info!("retry scheduler started");

        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            let moved = self.queue.process_retry().await;
            if moved > 0 {
                debug!(moved, "promoted retry entries to frontier");
            }
        }

        info!("retry scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crawlhub_types::{FrontierURL, ParseTask, QueueStats};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingBroker {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QueueBroker for CountingBroker {
        async fn enqueue_frontier(&self, _url: FrontierURL) -> bool {
            true
        }
        async fn dequeue_frontier(&self) -> Option<FrontierURL> {
            None
        }
        async fn enqueue_parse(&self, _task: ParseTask) -> bool {
            true
        }
        async fn dequeue_parse(&self) -> Option<ParseTask> {
            None
        }
        async fn enqueue_retry(&self, _url: FrontierURL, _delay_secs: u64) -> bool {
            true
        }
        async fn enqueue_dead(&self, _url: FrontierURL, _reason: String) -> bool {
            true
        }
        async fn stats(&self) -> QueueStats {
            QueueStats::default()
        }
        async fn process_retry(&self) -> usize {
            self.calls.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_process_retry_on_the_configured_interval() {
        let broker = Arc::new(CountingBroker::default());
        let scheduler = Arc::new(RetryScheduler::new(broker.clone()));
        let handle = tokio::spawn(scheduler.clone().run());

        tokio::time::advance(TICK_INTERVAL * 3).await;
        tokio::task::yield_now().await;

        scheduler.stop();
        handle.abort();

        assert!(broker.calls.load(Ordering::SeqCst) >= 2);
    }
}
