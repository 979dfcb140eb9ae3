//! HTTP fetch layer for the crawl worker.
//!
//! Conditional requests, size-capped streaming, and the dynamic-content
//! heuristic live here; rate limiting and DNS caching live in
//! `crawlhub-utils`, and the headless-render path lives in
//! `crawlhub-headless`.

pub mod fetch;

pub use fetch::{
    js_heuristic, ConditionalHeaders, FetchClient, FetchOutcome, FetchTimeouts, FetchedBody,
    DEFAULT_USER_AGENT,
};
