//! The crawl worker (§4.5): pulls a `FrontierURL`, fetches it, and hands the
//! raw body off to a parse task. Mirrors the reference worker pool's
//! poll-loop-plus-semaphore shape, but the unit of concurrency here is a
//! single frontier URL rather than a generic job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crawlhub_fetch::fetch::{js_heuristic, ConditionalHeaders, FetchClient, FetchOutcome};
use crawlhub_headless::HeadlessRendererPool;
use crawlhub_queue::QueueBroker;
use crawlhub_types::{record::url_hash, CrawlRecord, EngineError, FrontierURL};
use crawlhub_utils::{DnsCache, SharedRateLimiter};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use crate::blob_store::{storage_key, BlobStore, RawRecord};
use crate::record_store::CrawlRecordStore;
use crate::stats::EngineCounters;

/// Polling backoff applied when the frontier queue comes back empty.
const EMPTY_POLL_DELAY: Duration = Duration::from_millis(200);

pub struct CrawlWorker {
    pub id: String,
    queue: Arc<dyn QueueBroker>,
    record_store: Arc<dyn CrawlRecordStore>,
    blob_store: Arc<dyn BlobStore>,
    dns_cache: Arc<DnsCache>,
    rate_limiter: SharedRateLimiter,
    fetch_client: FetchClient,
    headless: Option<Arc<HeadlessRendererPool>>,
    counters: Arc<EngineCounters>,
    in_flight: Arc<Semaphore>,
    running: AtomicBool,
}

impl CrawlWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        queue: Arc<dyn QueueBroker>,
        record_store: Arc<dyn CrawlRecordStore>,
        blob_store: Arc<dyn BlobStore>,
        dns_cache: Arc<DnsCache>,
        rate_limiter: SharedRateLimiter,
        fetch_client: FetchClient,
        headless: Option<Arc<HeadlessRendererPool>>,
        counters: Arc<EngineCounters>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            record_store,
            blob_store,
            dns_cache,
            rate_limiter,
            fetch_client,
            headless,
            counters,
            in_flight: Arc::new(Semaphore::new(max_concurrent.max(1))),
            running: AtomicBool::new(false),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Runs the poll loop until `stop()` is called, spawning up to
    /// `max_concurrent` concurrent fetches at a time (§5).
    pub async fn run(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        info!(worker_id = %self.id, "crawl worker started");

        while self.running.load(Ordering::SeqCst) {
            let Some(frontier_url) = self.queue.dequeue_frontier().await else {
                tokio::time::sleep(EMPTY_POLL_DELAY).await;
                continue;
            };

            let permit = match self.in_flight.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let worker = self.clone();
            tokio::spawn(async move {
                worker.process(frontier_url).await;
                drop(permit);
            });
        }

        info!(worker_id = %self.id, "crawl worker stopped");
    }

    #[instrument(skip(self, frontier_url), fields(url = %frontier_url.url, worker_id = %self.id))]
    async fn process(&self, mut frontier_url: FrontierURL) {
        let hash = url_hash(&frontier_url.url);
        let existing = self.record_store.get_by_url_hash(&hash).await;

        if let Some(record) = &existing {
            if !record.due_for_recrawl(chrono::Utc::now()) {
                debug!("not due for recrawl, dropping");
                return;
            }
        }

        self.dns_cache.resolve(frontier_url.domain()).await;
        self.rate_limiter.acquire(frontier_url.domain()).await;

        match self.fetch(&frontier_url, existing.as_ref()).await {
            Ok(Some((body, rendered_with_js))) => {
                self.on_success(&frontier_url, &hash, existing, body, rendered_with_js)
                    .await;
            }
            Ok(None) => {
                // 304 Not Modified: only the freshness timestamp moves.
                self.counters.record_not_modified();
                if let Some(mut record) = existing {
                    record.record_not_modified();
                    self.record_store.upsert(record).await;
                }
            }
            Err(err) => {
                self.on_failure(frontier_url, err).await;
            }
        }
    }

    /// Returns `Ok(Some((body, rendered_with_js)))` on a fetched body,
    /// `Ok(None)` on a `304`, and `Err` for anything retryable/fatal.
    /// Oversize bodies are reported as `Permanent` so the failure path
    /// dead-letters them without retrying (§4.5 step 6).
    async fn fetch(
        &self,
        frontier_url: &FrontierURL,
        existing: Option<&CrawlRecord>,
    ) -> Result<Option<(FetchedContent, bool)>, EngineError> {
        let conditional = ConditionalHeaders {
            etag: existing.and_then(|r| r.etag.clone()),
            last_modified: existing.and_then(|r| r.last_modified.clone()),
        };
        if conditional.etag.is_some() || conditional.last_modified.is_some() {
            self.counters.record_conditional_request();
        }

        let wants_js = frontier_url.requires_js || js_heuristic(frontier_url.url.as_str());

        if wants_js {
            if let Some(headless) = &self.headless {
                let selector = crawlhub_headless::selector_for_host(frontier_url.domain());
                let rendered = headless.render(frontier_url.url.as_str(), selector).await?;
                self.counters.record_js_rendered();
                return Ok(Some((
                    FetchedContent {
                        status: rendered.status,
                        final_url: rendered.final_url,
                        content_type: "text/html".to_string(),
                        etag: None,
                        last_modified: None,
                        is_dynamic: true,
                        bytes: rendered.content.into_bytes(),
                    },
                    true,
                )));
            }
            warn!("requires_js set but no headless pool configured, falling back to plain fetch");
        }

        match self.fetch_client.fetch(frontier_url.url.as_str(), &conditional).await? {
            FetchOutcome::NotModified => Ok(None),
            FetchOutcome::TooLarge => {
                self.counters.record_large_skipped();
                Err(EngineError::permanent(format!(
                    "{} exceeded max content size",
                    frontier_url.url
                )))
            }
            FetchOutcome::Body(body) => Ok(Some((
                FetchedContent {
                    status: body.status.as_u16(),
                    final_url: body.final_url,
                    content_type: body.content_type,
                    etag: body.etag,
                    last_modified: body.last_modified,
                    is_dynamic: body.is_dynamic,
                    bytes: body.bytes.to_vec(),
                },
                false,
            ))),
        }
    }

    async fn on_success(
        &self,
        frontier_url: &FrontierURL,
        hash: &str,
        existing: Option<CrawlRecord>,
        body: FetchedContent,
        rendered_with_js: bool,
    ) {
        let byte_len = body.bytes.len() as u64;
        let job_id = frontier_url.job_id.clone();
        let raw_id = match self
            .blob_store
            .store(RawRecord {
                content: body.bytes,
                content_type: body.content_type.clone(),
            })
            .await
        {
            Ok(raw_id) => raw_id,
            Err(err) => {
                error!(error = %err, "failed to persist raw body");
                self.on_failure(frontier_url.clone(), err).await;
                return;
            }
        };
        let location = storage_key(frontier_url.domain(), &job_id, &body.content_type);

        let task = crawlhub_types::ParseTask::new(
            frontier_url.url.clone(),
            raw_id,
            location,
            body.content_type,
            frontier_url.priority(),
        )
        .with_metadata("job_id", job_id)
        .with_metadata("link_depth", (frontier_url.link_depth + 1) as i64);

        if !self.queue.enqueue_parse(task).await {
            error!("failed to enqueue parse task after successful fetch");
        }

        let mut record = existing.unwrap_or_else(|| CrawlRecord::first_seen(&frontier_url.url, frontier_url.link_depth));
        record.record_success(
            body.status,
            byte_len,
            frontier_url.requires_js,
            body.is_dynamic,
            rendered_with_js,
            body.etag,
            body.last_modified,
        );
        debug_assert_eq!(record.url_hash, hash);
        self.record_store.upsert(record).await;

        self.counters.record_crawled(byte_len);
    }

    async fn on_failure(&self, mut frontier_url: FrontierURL, err: EngineError) {
        self.counters.record_failed();
        warn!(error = %err, "crawl attempt failed");

        if !err.is_retryable() {
            self.queue.enqueue_dead(frontier_url, err.to_string()).await;
            return;
        }

        let exhausted = frontier_url.record_failure();
        if exhausted {
            self.queue.enqueue_dead(frontier_url, err.to_string()).await;
            return;
        }

        let delay = err.retry_delay_seconds(frontier_url.retry_count);
        self.queue.enqueue_retry(frontier_url, delay).await;
    }
}

struct FetchedContent {
    status: u16,
    #[allow(dead_code)]
    final_url: String,
    content_type: String,
    etag: Option<String>,
    last_modified: Option<String>,
    is_dynamic: bool,
    bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::InMemoryBlobStore;
    use crate::record_store::InMemoryCrawlRecordStore;
    use async_trait::async_trait;
    use crawlhub_types::{ParseTask, QueueStats};
    use std::sync::Mutex as StdMutex;
    use url::Url;

    #[derive(Default)]
    struct StubBroker {
        parse_tasks: StdMutex<Vec<ParseTask>>,
        dead: StdMutex<Vec<(FrontierURL, String)>>,
        retried: StdMutex<Vec<(FrontierURL, u64)>>,
    }

    #[async_trait]
    impl QueueBroker for StubBroker {
        async fn enqueue_frontier(&self, _url: FrontierURL) -> bool {
            true
        }
        async fn dequeue_frontier(&self) -> Option<FrontierURL> {
            None
        }
        async fn enqueue_parse(&self, task: ParseTask) -> bool {
            self.parse_tasks.lock().unwrap().push(task);
            true
        }
        async fn dequeue_parse(&self) -> Option<ParseTask> {
            None
        }
        async fn enqueue_retry(&self, url: FrontierURL, delay_secs: u64) -> bool {
            self.retried.lock().unwrap().push((url, delay_secs));
            true
        }
        async fn enqueue_dead(&self, url: FrontierURL, reason: String) -> bool {
            self.dead.lock().unwrap().push((url, reason));
            true
        }
        async fn stats(&self) -> QueueStats {
            QueueStats::default()
        }
        async fn process_retry(&self) -> usize {
            0
        }
    }

    fn worker(broker: Arc<StubBroker>) -> CrawlWorker {
        CrawlWorker::new(
            "test-worker",
            broker,
            Arc::new(InMemoryCrawlRecordStore::new()),
            Arc::new(InMemoryBlobStore::new()),
            Arc::new(DnsCache::new(300)),
            SharedRateLimiter::new(crawlhub_utils::RateLimiterConfig {
                requests_per_second: 1000,
                burst_size: 1000,
                jitter_secs: 0.0,
                per_domain: true,
            }),
            FetchClient::with_default_user_agent(1024).unwrap(),
            None,
            Arc::new(EngineCounters::new()),
            4,
        )
    }

    #[tokio::test]
    async fn permanent_failure_goes_straight_to_dead_letter() {
        let broker = Arc::new(StubBroker::default());
        let cw = worker(broker.clone());
        let url = FrontierURL::new(Url::parse("https://example.invalid/").unwrap(), "job-1");

        cw.on_failure(url, EngineError::permanent("bad request")).await;

        assert_eq!(broker.dead.lock().unwrap().len(), 1);
        assert!(broker.retried.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transient_failure_retries_until_budget_exhausted() {
        let broker = Arc::new(StubBroker::default());
        let cw = worker(broker.clone());
        let mut url = FrontierURL::new(Url::parse("https://example.invalid/").unwrap(), "job-1")
            .with_max_retries(2);

        for _ in 0..2 {
            cw.on_failure(url.clone(), EngineError::transient("timeout")).await;
            url = broker.retried.lock().unwrap().pop().unwrap().0;
        }
        cw.on_failure(url, EngineError::transient("timeout")).await;

        assert_eq!(broker.retried.lock().unwrap().len(), 2);
        assert_eq!(broker.dead.lock().unwrap().len(), 1);
    }
}
