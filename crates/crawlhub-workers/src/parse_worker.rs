//! The parse worker (§4.6): loads a raw body, extracts outbound links
//! (HTML) or scans for them (OCR path), and re-enqueues discovered URLs as
//! fresh `FrontierURL`s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crawlhub_queue::QueueBroker;
use crawlhub_types::{EngineError, FrontierURL, ParseTask};
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::blob_store::BlobStore;
use crate::ocr::OcrEngine;
use crate::stats::EngineCounters;

const EMPTY_POLL_DELAY: Duration = Duration::from_millis(200);

/// File extensions never worth enqueuing as a fresh crawl frontier entry.
const EXCLUDED_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".rar", ".tar", ".gz",
    ".exe", ".dmg", ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".svg", ".ico", ".mp3", ".mp4",
    ".avi", ".mov", ".wmv", ".flv", ".css", ".js", ".xml", ".rss", ".woff", ".woff2", ".ttf",
    ".eot",
];

pub struct ParseWorker {
    pub id: String,
    queue: Arc<dyn QueueBroker>,
    blob_store: Arc<dyn BlobStore>,
    ocr: Arc<dyn OcrEngine>,
    counters: Arc<EngineCounters>,
    in_flight: Arc<Semaphore>,
    running: AtomicBool,
}

impl ParseWorker {
    pub fn new(
        id: impl Into<String>,
        queue: Arc<dyn QueueBroker>,
        blob_store: Arc<dyn BlobStore>,
        ocr: Arc<dyn OcrEngine>,
        counters: Arc<EngineCounters>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            blob_store,
            ocr,
            counters,
            in_flight: Arc::new(Semaphore::new(max_concurrent.max(1))),
            running: AtomicBool::new(false),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub async fn run(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        info!(worker_id = %self.id, "parse worker started");

        while self.running.load(Ordering::SeqCst) {
            let Some(task) = self.queue.dequeue_parse().await else {
                tokio::time::sleep(EMPTY_POLL_DELAY).await;
                continue;
            };

            let permit = match self.in_flight.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let worker = self.clone();
            tokio::spawn(async move {
                worker.process(task).await;
                drop(permit);
            });
        }

        info!(worker_id = %self.id, "parse worker stopped");
    }

    #[instrument(skip(self, task), fields(url = %task.url, worker_id = %self.id))]
    async fn process(&self, mut task: ParseTask) {
        match self.extract_links(&task).await {
            Ok(links) => {
                let discovered = self.enqueue_discovered(&task, links).await;
                self.counters.record_parse_processed();
                self.counters.record_frontier_discovered(discovered as u64);
            }
            Err(err) => {
                warn!(error = %err, "parse attempt failed");
                self.counters.record_parse_failed();
                if !err.is_retryable() || task.record_failure() {
                    // Parse failures are never delayed-retried: the raw body
                    // is already durable, so a repeat attempt is immediate.
                    self.queue.enqueue_dead(
                        FrontierURL::new(task.url.clone(), task.job_id().unwrap_or("unknown").to_string()),
                        err.to_string(),
                    )
                    .await;
                } else {
                    self.queue.enqueue_parse(task).await;
                }
            }
        }
    }

    async fn extract_links(&self, task: &ParseTask) -> Result<Vec<String>, EngineError> {
        let raw = self
            .blob_store
            .retrieve(&task.raw_id)
            .await
            .ok_or_else(|| EngineError::storage(format!("raw body {} not found", task.raw_id)))?;

        if task.requires_ocr {
            let text = self.ocr.extract_text(&raw.content)?;
            return Ok(text.lines().map(|s| s.to_string()).collect());
        }

        let html = String::from_utf8_lossy(&raw.content);
        Ok(extract_hrefs(&html))
    }

    async fn enqueue_discovered(&self, task: &ParseTask, links: Vec<String>) -> usize {
        let mut discovered = 0;
        let child_priority = task.child_priority();
        let link_depth = task.link_depth() + 1;
        let job_id = task.job_id().unwrap_or("unknown").to_string();

        for link in links {
            let Some(absolute) = resolve_link(&task.url, &link) else {
                continue;
            };
            if is_excluded(&absolute) {
                debug!(url = %absolute, "skipping excluded extension");
                continue;
            }

            let frontier_url = FrontierURL::new(absolute, job_id.clone())
                .with_priority(child_priority)
                .with_source(task.url.clone())
                .with_depth(0, link_depth)
                .with_tag("discovered")
                .with_tag(format!("discovered_from:{}", task.url))
                .with_tag(format!("link_depth:{link_depth}"));

            if self.queue.enqueue_frontier(frontier_url).await {
                discovered += 1;
            }
        }

        discovered
    }
}

/// Collects (i) anchor hrefs, (ii) form actions, and (iii) for an `<img>`
/// whose parent is an anchor, that anchor's href (§4.6 step 2).
fn extract_hrefs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut hrefs = Vec::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        hrefs.extend(
            document
                .select(&selector)
                .filter_map(|el| el.value().attr("href"))
                .map(|s| s.to_string()),
        );
    }
    if let Ok(selector) = Selector::parse("form[action]") {
        hrefs.extend(
            document
                .select(&selector)
                .filter_map(|el| el.value().attr("action"))
                .map(|s| s.to_string()),
        );
    }
    if let Ok(selector) = Selector::parse("img") {
        for img in document.select(&selector) {
            let Some(parent) = img.parent().and_then(scraper::ElementRef::wrap) else {
                continue;
            };
            if parent.value().name() == "a" {
                if let Some(href) = parent.value().attr("href") {
                    hrefs.push(href.to_string());
                }
            }
        }
    }

    hrefs
}

fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    base.join(href).ok().filter(|u| matches!(u.scheme(), "http" | "https"))
}

fn is_excluded(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    EXCLUDED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::{InMemoryBlobStore, RawRecord};
    use crate::ocr::SubstringScanOcr;
    use async_trait::async_trait;
    use crawlhub_types::QueueStats;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct StubBroker {
        frontier: StdMutex<Vec<FrontierURL>>,
    }

    #[async_trait]
    impl QueueBroker for StubBroker {
        async fn enqueue_frontier(&self, url: FrontierURL) -> bool {
            self.frontier.lock().unwrap().push(url);
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
            0
        }
    }

    #[tokio::test]
    async fn html_task_discovers_absolute_links_and_skips_excluded_extensions() {
        let blob_store = Arc::new(InMemoryBlobStore::new());
        let raw_id = blob_store
            .store(RawRecord {
                content: br#"<a href="/about">About</a><a href="style.css">CSS</a>"#.to_vec(),
                content_type: "text/html".to_string(),
            })
            .await
            .unwrap();

        let broker = Arc::new(StubBroker::default());
        let worker = ParseWorker::new(
            "test-parser",
            broker.clone(),
            blob_store.clone(),
            Arc::new(SubstringScanOcr),
            Arc::new(EngineCounters::new()),
            4,
        );

        let task = ParseTask::new(
            Url::parse("https://example.com/page").unwrap(),
            raw_id,
            "example.com/job-1/x.html",
            "text/html",
            5,
        )
        .with_metadata("job_id", "job-1")
        .with_metadata("link_depth", 0i64);

        worker.process(task).await;

        let frontier = broker.frontier.lock().unwrap();
        assert_eq!(frontier.len(), 1);
        assert_eq!(frontier[0].url.as_str(), "https://example.com/about");
        assert!(frontier[0]
            .tags
            .contains(&"discovered_from:https://example.com/page".to_string()));
        assert!(frontier[0].tags.contains(&"link_depth:1".to_string()));
    }

    #[test]
    fn extract_hrefs_collects_anchors_forms_and_anchor_wrapped_images() {
        let html = r#"
            <a href="/about">About</a>
            <form action="/submit"></form>
            <a href="/gallery"><img src="/thumb.png"></a>
            <img src="/standalone.png">
        "#;
        let hrefs = extract_hrefs(html);
        assert!(hrefs.contains(&"/about".to_string()));
        assert!(hrefs.contains(&"/submit".to_string()));
        assert_eq!(hrefs.iter().filter(|h| *h == "/gallery").count(), 2);
        assert!(!hrefs.contains(&"/standalone.png".to_string()));
    }

    #[test]
    fn excluded_extensions_cover_documents_archives_and_media() {
        let url = |s: &str| Url::parse(s).unwrap();
        assert!(is_excluded(&url("https://example.com/report.pdf")));
        assert!(is_excluded(&url("https://example.com/sheet.xlsx")));
        assert!(is_excluded(&url("https://example.com/archive.rar")));
        assert!(is_excluded(&url("https://example.com/photo.jpeg")));
        assert!(is_excluded(&url("https://example.com/feed.rss")));
        assert!(!is_excluded(&url("https://example.com/about")));
    }

    #[tokio::test]
    async fn ocr_task_extracts_urls_from_scanned_text() {
        let blob_store = Arc::new(InMemoryBlobStore::new());
        let raw_id = blob_store
            .store(RawRecord {
                content: b"contact us at https://example.com/contact".to_vec(),
                content_type: "image/png".to_string(),
            })
            .await
            .unwrap();

        let broker = Arc::new(StubBroker::default());
        let worker = ParseWorker::new(
            "test-parser",
            broker.clone(),
            blob_store.clone(),
            Arc::new(SubstringScanOcr),
            Arc::new(EngineCounters::new()),
            4,
        );

        let task = ParseTask::new(
            Url::parse("https://example.com/scan.png").unwrap(),
            raw_id,
            "example.com/job-1/x.bin",
            "image/png",
            5,
        )
        .with_metadata("job_id", "job-1")
        .with_metadata("link_depth", 0i64);

        worker.process(task).await;

        let frontier = broker.frontier.lock().unwrap();
        assert_eq!(frontier.len(), 1);
        assert_eq!(frontier[0].url.as_str(), "https://example.com/contact");
    }
}
