//! Shared utilities for the crawl & parse engine
//!
//! - **DNS**: TTL-bounded hostname → IPv4 cache with lock-serialized resolution.
//! - **Rate limiting**: per-host token-bucket throttling with jitter.
//!
//! Retry/backoff and error-vocabulary concerns live in `crawlhub-types`
//! (`EngineError::retry_delay_seconds`) since the crawl/parse retry
//! decision is a property of the failure kind, not a standalone policy
//! object — there is no ambient (non-crawl) I/O in this engine that needs
//! a separate retry helper.

pub mod dns;
pub mod rate_limit;

pub use dns::DnsCache;
pub use rate_limit::{RateLimiterBuilder, RateLimiterConfig, SharedRateLimiter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _ = DnsCache::new(300);
        let _ = RateLimiterConfig::default();
    }
}
