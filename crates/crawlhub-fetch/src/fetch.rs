//! HTTP fetch path for the crawl worker: conditional GETs, size-capped
//! streaming, and the dynamic-content heuristic.

use std::time::Duration;

use bytes::Bytes;
use crawlhub_types::EngineError;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};

/// Default outbound identity, overridable via `EngineConfig`.
pub const DEFAULT_USER_AGENT: &str = "BusinessIntelCrawler/1.0";

const CHUNK_SIZE_HINT: usize = 8 * 1024;

const DYNAMIC_KEYWORDS: &[&str] = &[
    "csrf",
    "nonce",
    "timestamp",
    "session",
    "real-time",
    "live",
    "updated",
    "current",
    "now",
];

/// Network timeouts for the plain-HTTP fetch path (§4.5 step 5).
#[derive(Debug, Clone, Copy)]
pub struct FetchTimeouts {
    pub connect: Duration,
    pub read: Duration,
    pub total: Duration,
}

impl Default for FetchTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(30),
            total: Duration::from_secs(60),
        }
    }
}

/// Conditional-request state carried forward from the crawl record store.
#[derive(Debug, Clone, Default)]
pub struct ConditionalHeaders {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl ConditionalHeaders {
    /// Prefers `If-None-Match` over `If-Modified-Since` when both are known,
    /// per §4.5 step 3.
    fn apply(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(etag) = &self.etag {
            builder.header(reqwest::header::IF_NONE_MATCH, etag)
        } else if let Some(last_modified) = &self.last_modified {
            builder.header(reqwest::header::IF_MODIFIED_SINCE, last_modified)
        } else {
            builder
        }
    }
}

/// Outcome of a plain-HTTP fetch, distinct from the headless-render path.
#[derive(Debug)]
pub enum FetchOutcome {
    /// `304 Not Modified` — caller only needs to bump `last_crawled_at`.
    NotModified,
    /// `Content-Length` (or the streamed body) exceeded `max_content_size`.
    TooLarge,
    Body(FetchedBody),
}

#[derive(Debug)]
pub struct FetchedBody {
    pub status: StatusCode,
    pub final_url: String,
    pub content_type: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub is_dynamic: bool,
    pub bytes: Bytes,
}

/// Thin wrapper over a `reqwest::Client` implementing the CW's conditional,
/// size-capped fetch algorithm.
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    timeouts: FetchTimeouts,
    max_content_size: usize,
}

impl FetchClient {
    pub fn new(user_agent: &str, timeouts: FetchTimeouts, max_content_size: usize) -> Result<Self, EngineError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .brotli(true)
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.total)
            .build()
            .map_err(|e| EngineError::config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            timeouts,
            max_content_size,
        })
    }

    pub fn with_default_user_agent(max_content_size: usize) -> Result<Self, EngineError> {
        Self::new(DEFAULT_USER_AGENT, FetchTimeouts::default(), max_content_size)
    }

    /// Performs the GET described in §4.5 steps 3-6: conditional headers,
    /// `304` short-circuit, `Content-Length`/streamed size cap, and the
    /// dynamic-content heuristic.
    #[instrument(skip(self, conditional), fields(url = %url))]
    pub async fn fetch(
        &self,
        url: &str,
        conditional: &ConditionalHeaders,
    ) -> Result<FetchOutcome, EngineError> {
        let builder = conditional.apply(self.client.get(url));
        let response = tokio::time::timeout(self.timeouts.total, builder.send())
            .await
            .map_err(|_| EngineError::transient(format!("total timeout fetching {url}")))?
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        let final_url = response.url().to_string();

        if status == StatusCode::NOT_MODIFIED {
            debug!(url, "not modified");
            return Ok(FetchOutcome::NotModified);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(EngineError::rate_limited(retry_after));
        }

        if status.is_client_error() {
            return Err(EngineError::permanent(format!(
                "{url} returned {status}"
            )));
        }

        if status.is_server_error() {
            return Err(EngineError::transient(format!(
                "{url} returned {status}"
            )));
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_content_size {
                warn!(url, content_length = len, "content-length exceeds cap");
                return Ok(FetchOutcome::TooLarge);
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let cache_control_dynamic = response
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("no-cache") || v.contains("max-age=0"))
            .unwrap_or(false);
        let etag = header_string(&response, reqwest::header::ETAG);
        let last_modified = header_string(&response, reqwest::header::LAST_MODIFIED);

        let body = match self.read_capped(response).await? {
            Some(bytes) => bytes,
            None => return Ok(FetchOutcome::TooLarge),
        };

        let is_dynamic = cache_control_dynamic || body_looks_dynamic(&body);

        Ok(FetchOutcome::Body(FetchedBody {
            status,
            final_url,
            content_type,
            etag,
            last_modified,
            is_dynamic,
            bytes: body,
        }))
    }

    /// Streams the body in `CHUNK_SIZE_HINT` chunks, stopping (and reporting
    /// the cap as exceeded) as soon as the cumulative size would overflow
    /// `max_content_size` — this also catches servers that omit or lie about
    /// `Content-Length`.
    async fn read_capped(&self, response: reqwest::Response) -> Result<Option<Bytes>, EngineError> {
        let mut buf = Vec::with_capacity(CHUNK_SIZE_HINT.min(self.max_content_size));
        let mut stream = response.bytes_stream();

        while let Some(chunk) = tokio::time::timeout(self.timeouts.read, stream.next())
            .await
            .map_err(|_| EngineError::transient("read timeout streaming body"))?
        {
            let chunk = chunk.map_err(|e| classify_transport_error(&e))?;
            buf.extend_from_slice(&chunk);
            if buf.len() > self.max_content_size {
                return Ok(None);
            }
        }

        Ok(Some(Bytes::from(buf)))
    }
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// §4.5 step 6's second clause: at least 2 of the fixed keyword set present
/// in the decoded body (case-insensitive substring match).
fn body_looks_dynamic(body: &[u8]) -> bool {
    let text = String::from_utf8_lossy(body).to_lowercase();
    DYNAMIC_KEYWORDS
        .iter()
        .filter(|kw| text.contains(*kw))
        .count()
        >= 2
}

/// JS-heuristic used to decide whether a URL should go through the headless
/// renderer absent an explicit `requires_js` hint (§4.5 step 4).
pub fn js_heuristic(url: &str) -> bool {
    const KEYWORDS: &[&str] = &[
        "spa", "react", "angular", "vue", "app", "dashboard", "admin", "portal", "ajax", "api",
        "json",
    ];
    let lower = url.to_lowercase();
    KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn classify_transport_error(err: &reqwest::Error) -> EngineError {
    if err.is_timeout() || err.is_connect() {
        EngineError::transient(err.to_string())
    } else if let Some(status) = err.status() {
        if status.is_client_error() {
            EngineError::permanent(err.to_string())
        } else {
            EngineError::transient(err.to_string())
        }
    } else {
        EngineError::transient(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_keywords_require_at_least_two_matches() {
        assert!(!body_looks_dynamic(b"just a csrf token here"));
        assert!(body_looks_dynamic(b"csrf token and a session id"));
    }

    #[test]
    fn js_heuristic_matches_spa_style_paths() {
        assert!(js_heuristic("https://example.com/app/dashboard"));
        assert!(js_heuristic("https://example.com/api/v1/widgets"));
        assert!(!js_heuristic("https://example.com/about-us"));
    }

    #[test]
    fn conditional_headers_prefer_etag_over_last_modified() {
        let headers = ConditionalHeaders {
            etag: Some("\"abc\"".to_string()),
            last_modified: Some("Wed, 01 Jan 2026 00:00:00 GMT".to_string()),
        };
        let client = Client::new();
        let built = headers.apply(client.get("https://example.com")).build().unwrap();
        assert!(built.headers().contains_key(reqwest::header::IF_NONE_MATCH));
        assert!(!built.headers().contains_key(reqwest::header::IF_MODIFIED_SINCE));
    }

    #[tokio::test]
    async fn fetch_client_builds_with_default_user_agent() {
        let client = FetchClient::with_default_user_agent(50 * 1024 * 1024);
        assert!(client.is_ok());
    }
}
