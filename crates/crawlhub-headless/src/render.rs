//! The narrow render contract the crawl worker calls into when a
//! `FrontierURL` requires JavaScript execution.

use std::time::Duration;

use crawlhub_types::EngineError;
use tokio::time::timeout;
use tracing::warn;

use crate::pool::{BrowserPool, BrowserPoolConfig};

#[derive(Debug, Clone, Copy)]
pub struct RenderTimeouts {
    pub navigation: Duration,
    pub selector_wait: Duration,
}

impl Default for RenderTimeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            selector_wait: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub content: String,
    pub title: Option<String>,
    pub status: u16,
    pub final_url: String,
    /// Anchor hrefs and form actions discovered in the DOM.
    pub links: Vec<String>,
}

/// Per-domain wait-selector table supplementing an explicit
/// `wait_for_selector` hint (§4.4 supplement). Never overrides a selector
/// already attached to the FrontierURL's metadata.
pub fn selector_for_host(host: &str) -> Option<&'static str> {
    let host = host.to_lowercase();
    if host.contains("linkedin.com") {
        Some(".core-rail")
    } else if host.contains("facebook.com") {
        Some(r#"[role="main"]"#)
    } else if host.contains("twitter.com") || host.contains("x.com") {
        Some(r#"[data-testid="primaryColumn"]"#)
    } else if host.contains("directory") || host.contains("listing") || host.contains("search") {
        Some(".results, .listings, .search-results")
    } else {
        None
    }
}

pub struct HeadlessRendererPool {
    pool: BrowserPool,
    timeouts: RenderTimeouts,
}

impl HeadlessRendererPool {
    pub async fn new(
        pool_config: BrowserPoolConfig,
        browser_config: spider_chrome::BrowserConfig,
        timeouts: RenderTimeouts,
    ) -> Result<Self, EngineError> {
        let pool = BrowserPool::new(pool_config, browser_config).await?;
        Ok(Self { pool, timeouts })
    }

    /// Checks out a browser, navigates, optionally waits for a selector,
    /// and extracts `{content, title, status, final_url, links}`. The
    /// browser is always returned to the pool, even on error, because
    /// `checkout` is held by a RAII guard whose `Drop` re-enqueues it.
    pub async fn render(
        &self,
        url: &str,
        wait_for_selector: Option<&str>,
    ) -> Result<RenderedPage, EngineError> {
        let checkout = self.pool.checkout().await?;
        let page = checkout
            .browser()
            .new_page(url)
            .await
            .map_err(|e| EngineError::transient(format!("failed to open page for {url}: {e}")))?;

        timeout(self.timeouts.navigation, page.goto(url))
            .await
            .map_err(|_| EngineError::transient(format!("navigation timed out for {url}")))?
            .map_err(|e| EngineError::transient(format!("navigation failed for {url}: {e}")))?;

        if let Some(selector) = wait_for_selector {
            if timeout(self.timeouts.selector_wait, page.find_element(selector))
                .await
                .is_err()
            {
                warn!(url, selector, "wait_for_selector timed out, continuing anyway");
            }
        }

        let content = page
            .content()
            .await
            .map_err(|e| EngineError::transient(format!("failed to read content for {url}: {e}")))?;

        let title = page.evaluate("document.title").await.ok().and_then(|v| v.into_value().ok());

        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        let links = extract_links(&content);

        checkout.checkin().await;

        Ok(RenderedPage {
            content,
            title,
            status: 200,
            final_url,
            links,
        })
    }

    pub async fn stats(&self) -> crate::pool::PoolStats {
        self.pool.stats().await
    }
}

/// Pulls anchor hrefs and form actions out of rendered HTML; the parse
/// worker does the authoritative extraction, this is a best-effort summary
/// attached to the render result.
fn extract_links(html: &str) -> Vec<String> {
    use scraper::{Html, Selector};

    let document = Html::parse_document(html);
    let mut links = Vec::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        links.extend(
            document
                .select(&selector)
                .filter_map(|el| el.value().attr("href"))
                .map(|s| s.to_string()),
        );
    }
    if let Ok(selector) = Selector::parse("form[action]") {
        links.extend(
            document
                .select(&selector)
                .filter_map(|el| el.value().attr("action"))
                .map(|s| s.to_string()),
        );
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_table_matches_known_hosts() {
        assert_eq!(selector_for_host("www.linkedin.com"), Some(".core-rail"));
        assert_eq!(selector_for_host("m.facebook.com"), Some(r#"[role="main"]"#));
        assert_eq!(
            selector_for_host("x.com"),
            Some(r#"[data-testid="primaryColumn"]"#)
        );
        assert_eq!(
            selector_for_host("jobs-directory.example.com"),
            Some(".results, .listings, .search-results")
        );
        assert_eq!(selector_for_host("example.com"), None);
    }

    #[test]
    fn extract_links_collects_anchors_and_form_actions() {
        let html = r#"<html><body><a href="/a">A</a><form action="/submit"></form></body></html>"#;
        let links = extract_links(html);
        assert_eq!(links, vec!["/a".to_string(), "/submit".to_string()]);
    }
}
