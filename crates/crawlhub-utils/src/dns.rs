//! Hostname → IPv4 cache with TTL-bounded entries.
//!
//! Concurrent callers for the same host observe at most one outstanding
//! resolution because the whole map sits behind a single lock (§5: "DNS
//! cache: shared across all CWs in a process; single lock around the map").
//! Failures return `None` and are never cached — there is no negative
//! caching in this engine (see SPEC_FULL.md §9, open questions).

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use tokio::net::lookup_host;
use tokio::sync::Mutex;
use tracing::{debug, warn};

struct Entry {
    addr: Ipv4Addr,
    expires_at: Instant,
}

/// TTL-bounded DNS resolution cache.
pub struct DnsCache {
    entries: Mutex<HashMap<String, Entry>>,
    default_ttl: Duration,
}

impl DnsCache {
    /// `default_ttl_secs` is the lifetime assigned to every freshly resolved
    /// entry; there is no per-record TTL negotiation with the resolver.
    pub fn new(default_ttl_secs: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl: Duration::from_secs(default_ttl_secs),
        }
    }

    /// Returns the cached address if still fresh, otherwise resolves,
    /// caches, and returns the result. Returns `None` on resolution failure
    /// without caching anything.
    pub async fn resolve(&self, host: &str) -> Option<Ipv4Addr> {
        let now = Instant::now();
        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(host) {
                if entry.expires_at > now {
                    debug!(host, "dns cache hit");
                    return Some(entry.addr);
                }
            }
        }

        let addr = self.lookup(host).await?;

        let mut entries = self.entries.lock().await;
        entries.insert(
            host.to_string(),
            Entry {
                addr,
                expires_at: Instant::now() + self.default_ttl,
            },
        );
        Some(addr)
    }

    async fn lookup(&self, host: &str) -> Option<Ipv4Addr> {
        let target = format!("{host}:0");
        match lookup_host(target).await {
            Ok(addrs) => addrs.filter_map(ipv4_of).next().or_else(|| {
                warn!(host, "dns resolution returned no IPv4 address");
                None
            }),
            Err(err) => {
                warn!(host, error = %err, "dns resolution failed");
                None
            }
        }
    }

    /// Removes every entry whose TTL has elapsed.
    pub async fn clear_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn ipv4_of(addr: SocketAddr) -> Option<Ipv4Addr> {
    match addr.ip() {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_localhost() {
        let cache = DnsCache::new(300);
        let addr = cache.resolve("localhost").await;
        assert!(addr.is_some());
    }

    #[tokio::test]
    async fn caches_second_lookup() {
        let cache = DnsCache::new(300);
        let first = cache.resolve("localhost").await;
        let second = cache.resolve("localhost").await;
        assert_eq!(first, second);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn unresolvable_host_returns_none_and_is_not_cached() {
        let cache = DnsCache::new(300);
        let addr = cache.resolve("this-host-does-not-resolve.invalid").await;
        assert!(addr.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn clear_expired_removes_stale_entries() {
        let cache = DnsCache::new(0);
        cache.resolve("localhost").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let removed = cache.clear_expired().await;
        assert_eq!(removed, 1);
        assert!(cache.is_empty().await);
    }
}
