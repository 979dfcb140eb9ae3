//! External broker with lists and sorted sets (a Redis-like store).
//!
//! Normal/priority lanes are lists; retry is a sorted set keyed by
//! `retry_after`; dead-letter is a list. `process_retry` scans the sorted
//! set by score `<= now` and pipelines the promotion atomically, mirroring
//! the `ZRANGEBYSCORE` + pipelined `ZREM`/list-push pattern used by the
//! reference job queue this backend is grounded on.

use async_trait::async_trait;
use crawlhub_types::{
    DeadLetterEntry, EngineError, FrontierURL, ParseTask, QueueStats, RetryEntry,
    PRIORITY_LANE_THRESHOLD,
};
use redis::{aio::MultiplexedConnection, AsyncCommands};
use tracing::{debug, warn};

use crate::broker::QueueBroker;

#[derive(Debug, Clone)]
pub struct ListStoreConfig {
    pub redis_url: String,
    pub namespace: String,
}

impl Default for ListStoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1/".to_string(),
            namespace: "crawlhub".to_string(),
        }
    }
}

pub struct ListStoreBroker {
    redis: tokio::sync::Mutex<MultiplexedConnection>,
    namespace: String,
}

impl ListStoreBroker {
    pub async fn connect(config: ListStoreConfig) -> Result<Self, EngineError> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| EngineError::config(format!("invalid redis url: {e}")))?;
        let redis = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| EngineError::broker(format!("failed to connect to redis: {e}")))?;

        Ok(Self {
            redis: tokio::sync::Mutex::new(redis),
            namespace: config.namespace,
        })
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.namespace, suffix)
    }
}

#[async_trait]
impl QueueBroker for ListStoreBroker {
    async fn enqueue_frontier(&self, url: FrontierURL) -> bool {
        let key = if url.is_priority_lane() {
            self.key("frontier:priority")
        } else {
            self.key("frontier:normal")
        };
        let Ok(payload) = serde_json::to_string(&url) else {
            return false;
        };
        let mut conn = self.redis.lock().await;
        match conn.rpush::<_, _, ()>(&key, payload).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "enqueue_frontier failed");
                false
            }
        }
    }

    async fn dequeue_frontier(&self) -> Option<FrontierURL> {
        let mut conn = self.redis.lock().await;
        pop_either(&mut conn, &self.key("frontier:priority"), &self.key("frontier:normal")).await
    }

    async fn enqueue_parse(&self, task: ParseTask) -> bool {
        let key = if task.priority() >= PRIORITY_LANE_THRESHOLD {
            self.key("parse:priority")
        } else {
            self.key("parse:normal")
        };
        let Ok(payload) = serde_json::to_string(&task) else {
            return false;
        };
        let mut conn = self.redis.lock().await;
        match conn.rpush::<_, _, ()>(&key, payload).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "enqueue_parse failed");
                false
            }
        }
    }

    async fn dequeue_parse(&self) -> Option<ParseTask> {
        let mut conn = self.redis.lock().await;
        pop_either(&mut conn, &self.key("parse:priority"), &self.key("parse:normal")).await
    }

    async fn enqueue_retry(&self, url: FrontierURL, delay_secs: u64) -> bool {
        let entry = RetryEntry::new(url, delay_secs);
        let Ok(payload) = serde_json::to_string(&entry) else {
            return false;
        };
        let mut conn = self.redis.lock().await;
        match conn
            .zadd::<_, _, _, ()>(self.key("retry"), payload, entry.retry_after.timestamp())
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "enqueue_retry failed");
                false
            }
        }
    }

    async fn enqueue_dead(&self, url: FrontierURL, reason: String) -> bool {
        let entry = DeadLetterEntry::new(url, reason);
        let Ok(payload) = serde_json::to_string(&entry) else {
            return false;
        };
        let mut conn = self.redis.lock().await;
        match conn.rpush::<_, _, ()>(self.key("dead"), payload).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "enqueue_dead failed");
                false
            }
        }
    }

    async fn stats(&self) -> QueueStats {
        let mut conn = self.redis.lock().await;
        QueueStats {
            frontier_normal: len_of(&mut conn, &self.key("frontier:normal")).await,
            frontier_priority: len_of(&mut conn, &self.key("frontier:priority")).await,
            parse_normal: len_of(&mut conn, &self.key("parse:normal")).await,
            parse_priority: len_of(&mut conn, &self.key("parse:priority")).await,
            retry: zcard_of(&mut conn, &self.key("retry")).await,
            dead_letter: len_of(&mut conn, &self.key("dead")).await,
            enqueue_errors: 0,
            dequeue_errors: 0,
        }
    }

    async fn process_retry(&self) -> usize {
        let now = chrono::Utc::now().timestamp();
        let retry_key = self.key("retry");
        let mut conn = self.redis.lock().await;

        let ready: Vec<String> = match conn.zrangebyscore(&retry_key, 0, now).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "process_retry scan failed");
                return 0;
            }
        };

        let mut moved = 0;
        for payload in ready {
            let Ok(entry) = serde_json::from_str::<RetryEntry>(&payload) else {
                continue;
            };
            let dest = if entry.url.is_priority_lane() {
                self.key("frontier:priority")
            } else {
                self.key("frontier:normal")
            };
            let Ok(frontier_payload) = serde_json::to_string(&entry.url) else {
                continue;
            };

            let mut pipe = redis::pipe();
            pipe.atomic()
                .zrem(&retry_key, &payload)
                .rpush(&dest, frontier_payload);

            if pipe.query_async::<()>(&mut *conn).await.is_ok() {
                moved += 1;
            }
        }

        debug!(moved, "promoted retry entries to frontier");
        moved
    }
}

async fn pop_either<T: serde::de::DeserializeOwned>(
    conn: &mut MultiplexedConnection,
    priority_key: &str,
    normal_key: &str,
) -> Option<T> {
    let payload: Option<String> = conn.lpop(priority_key, None).await.ok().flatten();
    let payload = match payload {
        Some(p) => Some(p),
        None => conn.lpop(normal_key, None).await.ok().flatten(),
    }?;
    serde_json::from_str(&payload).ok()
}

async fn len_of(conn: &mut MultiplexedConnection, key: &str) -> u64 {
    conn.llen(key).await.unwrap_or(0)
}

async fn zcard_of(conn: &mut MultiplexedConnection, key: &str) -> u64 {
    conn.zcard(key).await.unwrap_or(0)
}
