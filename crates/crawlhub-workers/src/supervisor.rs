//! The crawl system supervisor (§4.8): wires together the broker, the crawl
//! and parse worker pools, and the retry scheduler, and exposes the
//! construct/start/add_seed_urls/stats/stop surface the binary entry point
//! drives. Grounded in the reference worker service's construct-then-auto-
//! start shape, generalized from one job queue to the frontier/parse split.

use std::sync::Arc;

use crawlhub_fetch::fetch::{FetchClient, FetchTimeouts};
use crawlhub_headless::{BrowserPoolConfig, HeadlessRendererPool, RenderTimeouts};
use crawlhub_queue::{merge_queue_stats_into, QueueBroker};
use crawlhub_types::{CrawlerStats, EngineError, FrontierURL};
use crawlhub_utils::{DnsCache, RateLimiterBuilder, SharedRateLimiter};
use tracing::{info, warn};
use url::Url;

use crate::blob_store::{BlobStore, InMemoryBlobStore};
use crate::config::EngineConfig;
use crate::crawl_worker::CrawlWorker;
use crate::ocr::{OcrEngine, SubstringScanOcr};
use crate::parse_worker::ParseWorker;
use crate::record_store::{CrawlRecordStore, InMemoryCrawlRecordStore};
use crate::retry_scheduler::RetryScheduler;
use crate::stats::EngineCounters;

pub struct CrawlSystemSupervisor {
    queue: Arc<dyn QueueBroker>,
    crawl_workers: Vec<Arc<CrawlWorker>>,
    parse_workers: Vec<Arc<ParseWorker>>,
    retry_scheduler: Arc<RetryScheduler>,
    crawl_counters: Arc<EngineCounters>,
    parse_counters: Arc<EngineCounters>,
    tasks: tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl CrawlSystemSupervisor {
    pub async fn build(config: &EngineConfig) -> Result<Self, EngineError> {
        let queue = config.broker_backend().build().await?;
        let record_store: Arc<dyn CrawlRecordStore> = Arc::new(InMemoryCrawlRecordStore::new());
        let blob_store: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
        let ocr: Arc<dyn OcrEngine> = Arc::new(SubstringScanOcr);
        let dns_cache = Arc::new(DnsCache::new(config.dns_cache_ttl_secs));
        let rate_limiter: SharedRateLimiter = RateLimiterBuilder::new(config.requests_per_second)
            .burst_size(config.burst_size)
            .jitter_secs(config.jitter_factor)
            .per_domain(config.per_domain_rate_limit)
            .build();

        let headless = if config.enable_js_rendering {
            match HeadlessRendererPool::new(
                BrowserPoolConfig {
                    max_pool_size: config.max_browsers,
                    ..Default::default()
                },
                spider_chrome::BrowserConfig::builder().build().map_err(|e| {
                    EngineError::config(format!("failed to build headless browser config: {e}"))
                })?,
                RenderTimeouts {
                    navigation: std::time::Duration::from_secs(config.page_timeout_secs),
                    ..Default::default()
                },
            )
            .await
            {
                Ok(pool) => Some(Arc::new(pool)),
                Err(e) => {
                    warn!(error = %e, "failed to start headless renderer pool, continuing without JS rendering");
                    None
                }
            }
        } else {
            None
        };

        let crawl_counters = Arc::new(EngineCounters::new());
        let parse_counters = Arc::new(EngineCounters::new());

        let mut crawl_workers = Vec::with_capacity(config.num_crawl_workers);
        for i in 0..config.num_crawl_workers {
            let fetch_client = FetchClient::new(
                &config.user_agent,
                FetchTimeouts::default(),
                config.max_content_size as usize,
            )?;
            crawl_workers.push(Arc::new(CrawlWorker::new(
                format!("crawl-worker-{i}"),
                queue.clone(),
                record_store.clone(),
                blob_store.clone(),
                dns_cache.clone(),
                rate_limiter.clone(),
                fetch_client,
                headless.clone(),
                crawl_counters.clone(),
                config.max_concurrent,
            )));
        }

        let mut parse_workers = Vec::with_capacity(config.num_parse_workers);
        for i in 0..config.num_parse_workers {
            parse_workers.push(Arc::new(ParseWorker::new(
                format!("parse-worker-{i}"),
                queue.clone(),
                blob_store.clone(),
                ocr.clone(),
                parse_counters.clone(),
                config.max_concurrent,
            )));
        }

        let retry_scheduler = Arc::new(RetryScheduler::new(queue.clone()));

        Ok(Self {
            queue,
            crawl_workers,
            parse_workers,
            retry_scheduler,
            crawl_counters,
            parse_counters,
            tasks: tokio::sync::Mutex::new(Vec::new()),
        })
    }

    /// Spawns every crawl worker, parse worker, and the retry scheduler.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        for cw in &self.crawl_workers {
            tasks.push(tokio::spawn(cw.clone().run()));
        }
        for pw in &self.parse_workers {
            tasks.push(tokio::spawn(pw.clone().run()));
        }
        tasks.push(tokio::spawn(self.retry_scheduler.clone().run()));
        info!(
            crawl_workers = self.crawl_workers.len(),
            parse_workers = self.parse_workers.len(),
            "crawl system started"
        );
    }

    /// Enqueues `urls` as seed `FrontierURL`s at depth 0, tagged
    /// `seed_url` and `job_id:{job_id}` (§4.8).
    pub async fn add_seed_urls(
        &self,
        urls: &[Url],
        job_id: impl Into<String>,
        priority: u8,
        requires_js: bool,
        is_dynamic: bool,
    ) -> usize {
        let job_id = job_id.into();
        let mut accepted = 0;
        for url in urls {
            let frontier_url = FrontierURL::new(url.clone(), job_id.clone())
                .with_priority(priority)
                .with_depth(0, 0)
                .with_requires_js(requires_js)
                .with_is_dynamic(is_dynamic)
                .with_tag("seed_url")
                .with_tag(format!("job_id:{job_id}"))
                .with_tag(format!("priority:{priority}"))
                .with_tag("link_depth:0");

            if self.queue.enqueue_frontier(frontier_url).await {
                accepted += 1;
            }
        }
        accepted
    }

    pub async fn stats(&self) -> CrawlerStats {
        let crawl = self.crawl_counters.snapshot().await;
        let parse = self.parse_counters.snapshot().await;
        let mut merged = CrawlerStats {
            urls_crawled: crawl.urls_crawled,
            urls_failed: crawl.urls_failed,
            conditional_requests: crawl.conditional_requests,
            not_modified_responses: crawl.not_modified_responses,
            large_pages_skipped: crawl.large_pages_skipped,
            js_rendered_pages: crawl.js_rendered_pages,
            bytes_downloaded: crawl.bytes_downloaded,
            avg_response_time_ms: crawl.avg_response_time_ms,
            parse_tasks_processed: parse.parse_tasks_processed,
            parse_tasks_failed: parse.parse_tasks_failed,
            frontier_urls_discovered: parse.frontier_urls_discovered,
            queue: Default::default(),
        };
        merge_queue_stats_into(&mut merged, self.queue.stats().await);
        merged
    }

    /// Signals every worker and the retry scheduler to stop, then awaits
    /// their poll loops exiting.
    pub async fn stop(&self) {
        for cw in &self.crawl_workers {
            cw.stop();
        }
        for pw in &self.parse_workers {
            pw.stop();
        }
        self.retry_scheduler.stop();

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        info!("crawl system stopped");
    }
}
