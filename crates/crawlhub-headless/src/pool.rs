//! Bounded pool of headless browser instances guarded by a semaphore.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crawlhub_types::EngineError;
use futures::StreamExt;
use spider_chrome::{Browser, BrowserConfig};
use tempfile::TempDir;
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tokio::time::{interval, timeout};
use tracing::{debug, error, warn};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct BrowserPoolConfig {
    pub min_pool_size: usize,
    pub max_pool_size: usize,
    pub initial_pool_size: usize,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub health_check_interval: Duration,
    /// How long `checkout()` waits for a free semaphore permit before
    /// failing with a resource-exhausted error (§4.4).
    pub exhaustion_wait: Duration,
    pub profile_base_dir: Option<std::path::PathBuf>,
}

impl Default for BrowserPoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: 1,
            max_pool_size: 5,
            initial_pool_size: 2,
            idle_timeout: Duration::from_secs(30),
            max_lifetime: Duration::from_secs(300),
            health_check_interval: Duration::from_secs(15),
            exhaustion_wait: Duration::from_secs(10),
            profile_base_dir: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BrowserHealth {
    Healthy,
    Unhealthy,
    Timeout,
}

/// A single launched browser, keeping its profile directory alive for as
/// long as the browser itself lives.
pub struct PooledBrowser {
    pub id: String,
    pub browser: Browser,
    created_at: Instant,
    last_used: Instant,
    handler_task: tokio::task::JoinHandle<()>,
    _profile_dir: TempDir,
}

impl std::fmt::Debug for PooledBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBrowser").field("id", &self.id).finish()
    }
}

impl PooledBrowser {
    /// Each browser gets its own profile directory: Chrome enforces a
    /// SingletonLock per profile regardless of CDP-level concurrency, so
    /// sharing one directory across instances would serialize launches.
    pub async fn launch(
        base_config: &BrowserConfig,
        profile_base_dir: Option<&std::path::Path>,
    ) -> Result<Self, EngineError> {
        let id = Uuid::new_v4().to_string();
        let profile_dir = match profile_base_dir {
            Some(base) => TempDir::new_in(base),
            None => TempDir::new(),
        }
        .map_err(|e| EngineError::transient(format!("failed to create browser profile dir: {e}")))?;

        let mut config = base_config.clone();
        config.user_data_dir = Some(profile_dir.path().to_path_buf());

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| EngineError::transient(format!("failed to launch browser {id}: {e}")))?;

        let browser_id = id.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!(browser_id = %browser_id, error = %e, "browser event error");
                }
            }
        });

        let now = Instant::now();
        Ok(Self {
            id,
            browser,
            created_at: now,
            last_used: now,
            handler_task,
            _profile_dir: profile_dir,
        })
    }

    fn is_expired(&self, max_lifetime: Duration) -> bool {
        self.created_at.elapsed() > max_lifetime
    }

    fn is_idle(&self, idle_timeout: Duration) -> bool {
        self.last_used.elapsed() > idle_timeout
    }

    async fn health_check(&self) -> BrowserHealth {
        match timeout(Duration::from_secs(5), self.browser.pages()).await {
            Ok(Ok(_)) => BrowserHealth::Healthy,
            Ok(Err(e)) => {
                error!(browser_id = %self.id, error = %e, "browser health check failed");
                BrowserHealth::Unhealthy
            }
            Err(_) => {
                error!(browser_id = %self.id, "browser health check timed out");
                BrowserHealth::Timeout
            }
        }
    }

    async fn close(mut self) {
        self.handler_task.abort();
        if let Err(e) = self.browser.close().await {
            warn!(browser_id = %self.id, error = %e, "error closing browser");
        }
    }
}

impl Drop for PooledBrowser {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// Pool-internal shared state, split out so `BrowserCheckout` can hold a
/// cheap handle back to it without borrowing `BrowserPool` itself.
struct Shared {
    available: Mutex<VecDeque<PooledBrowser>>,
    in_use: RwLock<HashMap<String, ()>>,
    semaphore: Arc<Semaphore>,
    config: BrowserPoolConfig,
}

pub struct BrowserPool {
    shared: Arc<Shared>,
    browser_config: BrowserConfig,
    _maintenance_task: tokio::task::JoinHandle<()>,
}

impl BrowserPool {
    pub async fn new(config: BrowserPoolConfig, browser_config: BrowserConfig) -> Result<Self, EngineError> {
        let mut initial = VecDeque::new();
        for attempt in 0..config.initial_pool_size {
            match PooledBrowser::launch(&browser_config, config.profile_base_dir.as_deref()).await {
                Ok(b) => initial.push_back(b),
                Err(e) => warn!(attempt, error = %e, "failed to launch initial browser, continuing"),
            }
        }

        let shared = Arc::new(Shared {
            available: Mutex::new(initial),
            in_use: RwLock::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(config.max_pool_size)),
            config: config.clone(),
        });

        let maintenance_task = {
            let shared = shared.clone();
            let browser_config = browser_config.clone();
            tokio::spawn(async move {
                let mut ticker = interval(shared.config.health_check_interval);
                loop {
                    ticker.tick().await;
                    Self::reap_and_replenish(&shared, &browser_config).await;
                }
            })
        };

        Ok(Self {
            shared,
            browser_config,
            _maintenance_task: maintenance_task,
        })
    }

    async fn reap_and_replenish(shared: &Arc<Shared>, browser_config: &BrowserConfig) {
        let mut available = shared.available.lock().await;
        let mut i = 0;
        while i < available.len() {
            let stale = available[i].is_expired(shared.config.max_lifetime)
                || available[i].is_idle(shared.config.idle_timeout);
            let unhealthy = !stale && available[i].health_check().await != BrowserHealth::Healthy;
            if stale || unhealthy {
                if let Some(browser) = available.remove(i) {
                    debug!(browser_id = %browser.id, "retiring browser instance");
                    browser.close().await;
                }
            } else {
                i += 1;
            }
        }

        while available.len() < shared.config.min_pool_size {
            match PooledBrowser::launch(browser_config, shared.config.profile_base_dir.as_deref()).await {
                Ok(b) => available.push_back(b),
                Err(e) => {
                    warn!(error = %e, "failed to replenish browser pool");
                    break;
                }
            }
        }
    }

    /// Waits up to `exhaustion_wait` for a free slot; fails with a transient
    /// error once exceeded (§4.4: exhaustion is a resource-exhausted error).
    pub async fn checkout(&self) -> Result<BrowserCheckout, EngineError> {
        let permit = timeout(
            self.shared.config.exhaustion_wait,
            self.shared.semaphore.clone().acquire_owned(),
        )
        .await
        .map_err(|_| EngineError::transient("headless pool exhausted: no browser available"))?
        .map_err(|e| EngineError::transient(format!("semaphore closed: {e}")))?;

        let browser = {
            let mut available = self.shared.available.lock().await;
            available.pop_front()
        };

        let browser = match browser {
            Some(b) => b,
            None => PooledBrowser::launch(&self.browser_config, self.shared.config.profile_base_dir.as_deref()).await?,
        };

        let browser_id = browser.id.clone();
        self.shared.in_use.write().await.insert(browser_id.clone(), ());

        Ok(BrowserCheckout {
            browser: Some(browser),
            shared: self.shared.clone(),
            _permit: permit,
        })
    }

    pub async fn stats(&self) -> PoolStats {
        PoolStats {
            available: self.shared.available.lock().await.len(),
            in_use: self.shared.in_use.read().await.len(),
            total_capacity: self.shared.config.max_pool_size,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub available: usize,
    pub in_use: usize,
    pub total_capacity: usize,
}

/// A checked-out browser. Returned to the pool on drop (best-effort) or
/// explicitly via [`BrowserCheckout::checkin`] — every exit path, including
/// errors during rendering, must release it (§4.4).
pub struct BrowserCheckout {
    browser: Option<PooledBrowser>,
    shared: Arc<Shared>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl BrowserCheckout {
    pub fn browser(&self) -> &Browser {
        &self.browser.as_ref().expect("checkout used after checkin").browser
    }

    pub async fn checkin(mut self) {
        if let Some(browser) = self.browser.take() {
            self.shared.in_use.write().await.remove(&browser.id);
            if browser.health_check().await == BrowserHealth::Healthy {
                self.shared.available.lock().await.push_back(browser);
            } else {
                browser.close().await;
            }
        }
    }
}

impl Drop for BrowserCheckout {
    fn drop(&mut self) {
        if let Some(browser) = self.browser.take() {
            let shared = self.shared.clone();
            tokio::spawn(async move {
                shared.in_use.write().await.remove(&browser.id);
                if browser.health_check().await == BrowserHealth::Healthy {
                    shared.available.lock().await.push_back(browser);
                } else {
                    browser.close().await;
                }
            });
        }
    }
}
