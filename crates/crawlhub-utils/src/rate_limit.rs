//! Token-bucket rate limiting using the `governor` crate, partitioned by host.

use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use tracing::debug;

type Bucket = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Configuration shared by every bucket a [`SharedRateLimiter`] creates.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
    /// Uniform random delay added after each acquire, in `[0, jitter_secs]`.
    pub jitter_secs: f64,
    /// When `false`, every host shares a single global bucket.
    pub per_domain: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2,
            burst_size: 4,
            jitter_secs: 0.0,
            per_domain: true,
        }
    }
}

/// Rate limiter builder mirroring the fluent style used across this crate
/// family's configuration types.
pub struct RateLimiterBuilder {
    config: RateLimiterConfig,
}

impl RateLimiterBuilder {
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            config: RateLimiterConfig {
                requests_per_second,
                ..RateLimiterConfig::default()
            },
        }
    }

    pub fn burst_size(mut self, burst_size: u32) -> Self {
        self.config.burst_size = burst_size;
        self
    }

    pub fn jitter_secs(mut self, jitter_secs: f64) -> Self {
        self.config.jitter_secs = jitter_secs;
        self
    }

    pub fn per_domain(mut self, per_domain: bool) -> Self {
        self.config.per_domain = per_domain;
        self
    }

    pub fn build(self) -> SharedRateLimiter {
        SharedRateLimiter::new(self.config)
    }
}

/// A token-bucket limiter with one bucket per host (or a single global
/// bucket when `per_domain` is disabled). Buckets for previously unseen
/// hosts are created lazily, then acquired lock-free thereafter (§5).
#[derive(Clone)]
pub struct SharedRateLimiter {
    config: RateLimiterConfig,
    global: Arc<Bucket>,
    per_host: Arc<DashMap<String, Arc<Bucket>>>,
}

impl SharedRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            global: Arc::new(Self::make_bucket(&config)),
            per_host: Arc::new(DashMap::new()),
            config,
        }
    }

    fn make_bucket(config: &RateLimiterConfig) -> Bucket {
        let rate = NonZeroU32::new(config.requests_per_second.max(1)).unwrap();
        let burst = NonZeroU32::new(config.burst_size.max(1)).unwrap();
        let quota = Quota::per_second(rate).allow_burst(burst);
        RateLimiter::direct(quota)
    }

    fn bucket_for(&self, host: &str) -> Arc<Bucket> {
        if !self.config.per_domain {
            return self.global.clone();
        }
        self.per_host
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Self::make_bucket(&self.config)))
            .clone()
    }

    /// Blocks until a token is available for `host`, then sleeps an
    /// additional uniform random delay in `[0, jitter_secs]`.
    pub async fn acquire(&self, host: &str) {
        let host = host.to_lowercase();
        let bucket = self.bucket_for(&host);
        bucket.until_ready().await;

        if self.config.jitter_secs > 0.0 {
            let jitter = fastrand::f64() * self.config.jitter_secs;
            debug!(host, jitter_secs = jitter, "applying rate-limit jitter");
            tokio::time::sleep(std::time::Duration::from_secs_f64(jitter)).await;
        }
    }

    pub fn known_hosts(&self) -> usize {
        self.per_host.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_creates_a_bucket_per_host() {
        let limiter = RateLimiterBuilder::new(100).burst_size(100).build();
        limiter.acquire("a.example.com").await;
        limiter.acquire("b.example.com").await;
        assert_eq!(limiter.known_hosts(), 2);
    }

    #[tokio::test]
    async fn global_mode_does_not_create_per_host_buckets() {
        let limiter = RateLimiterBuilder::new(100)
            .burst_size(100)
            .per_domain(false)
            .build();
        limiter.acquire("a.example.com").await;
        assert_eq!(limiter.known_hosts(), 0);
    }

    #[tokio::test]
    async fn builder_applies_jitter_without_hanging() {
        let limiter = RateLimiterBuilder::new(1000)
            .burst_size(1000)
            .jitter_secs(0.01)
            .build();
        let start = std::time::Instant::now();
        limiter.acquire("example.com").await;
        assert!(start.elapsed().as_secs_f64() < 1.0);
    }
}
