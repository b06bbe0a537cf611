use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{LabelError, Result};

use super::{
    job::LabelTask,
    lease::{DeadLetter, DequeueRequest, LeaseId, TaskLease},
    queue::{DEFAULT_DEAD_LETTER_CAP, QueueDepth, QueueService},
};

/// Lua scripts keeping every multi-key transition atomic.
///
/// Members of the leased set are lease ids; the task payload for each lease
/// lives in the `payloads` hash so a reclaimed task is claimed again under a
/// new id and stale holders cannot touch the new claim.
mod scripts {
    use redis::Script;

    /// Promote due delayed tasks, then pop the oldest ready task into the
    /// leased set under `ARGV[4]`.
    pub fn dequeue() -> Script {
        Script::new(
            r#"
            local ready = KEYS[1]
            local delayed = KEYS[2]
            local leased = KEYS[3]
            local payloads = KEYS[4]
            local now = ARGV[1]
            local expires_at = ARGV[2]
            local batch = tonumber(ARGV[3])
            local lease_id = ARGV[4]

            local due = redis.call('ZRANGEBYSCORE', delayed, '-inf', now, 'LIMIT', 0, batch)
            for _, item in ipairs(due) do
                redis.call('ZREM', delayed, item)
                redis.call('LPUSH', ready, item)
            end

            local raw = redis.call('RPOP', ready)
            if not raw then
                return false
            end
            redis.call('ZADD', leased, expires_at, lease_id)
            redis.call('HSET', payloads, lease_id, raw)
            return raw
            "#,
        )
    }

    pub fn renew() -> Script {
        Script::new(
            r#"
            if redis.call('ZSCORE', KEYS[1], ARGV[1]) then
                redis.call('ZADD', KEYS[1], ARGV[2], ARGV[1])
                return 1
            end
            return 0
            "#,
        )
    }

    pub fn complete() -> Script {
        Script::new(
            r#"
            local removed = redis.call('ZREM', KEYS[1], ARGV[1])
            redis.call('HDEL', KEYS[2], ARGV[1])
            return removed
            "#,
        )
    }

    /// Drop the lease and schedule the next attempt. A lease that was
    /// already reclaimed is left alone so the task is not queued twice.
    pub fn retry() -> Script {
        Script::new(
            r#"
            local leased = KEYS[1]
            local payloads = KEYS[2]
            local delayed = KEYS[3]
            local ready = KEYS[4]

            if redis.call('ZREM', leased, ARGV[1]) == 0 then
                return 0
            end
            redis.call('HDEL', payloads, ARGV[1])
            if ARGV[4] == '1' then
                redis.call('LPUSH', ready, ARGV[2])
            else
                redis.call('ZADD', delayed, ARGV[3], ARGV[2])
            end
            return 1
            "#,
        )
    }

    pub fn dead_letter() -> Script {
        Script::new(
            r#"
            local removed = redis.call('ZREM', KEYS[1], ARGV[1])
            redis.call('HDEL', KEYS[2], ARGV[1])
            redis.call('LPUSH', KEYS[3], ARGV[2])
            redis.call('LTRIM', KEYS[3], 0, tonumber(ARGV[3]) - 1)
            return removed
            "#,
        )
    }

    /// Expired leases go to the consuming end of the ready list so they
    /// are picked up next.
    pub fn reclaim_expired() -> Script {
        Script::new(
            r#"
            local expired = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
            local reclaimed = 0
            for _, lease_id in ipairs(expired) do
                local raw = redis.call('HGET', KEYS[2], lease_id)
                redis.call('ZREM', KEYS[1], lease_id)
                redis.call('HDEL', KEYS[2], lease_id)
                if raw then
                    redis.call('RPUSH', KEYS[3], raw)
                    reclaimed = reclaimed + 1
                end
            end
            return reclaimed
            "#,
        )
    }
}

const PROMOTE_BATCH: usize = 100;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisQueueConfig {
    pub url: String,
    /// Namespace prepended to every key.
    pub prefix: String,
    pub dead_letter_cap: usize,
}

impl Default for RedisQueueConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            prefix: "marquee".to_string(),
            dead_letter_cap: DEFAULT_DEAD_LETTER_CAP,
        }
    }
}

/// Redis key names derived from the configured prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueKeys {
    pub ready: String,
    pub delayed: String,
    pub leased: String,
    pub payloads: String,
    pub dead: String,
}

impl QueueKeys {
    pub fn new(prefix: &str) -> Self {
        Self {
            ready: format!("{prefix}:ready"),
            delayed: format!("{prefix}:delayed"),
            leased: format!("{prefix}:leased"),
            payloads: format!("{prefix}:payloads"),
            dead: format!("{prefix}:dead"),
        }
    }
}

/// Durable queue on Redis lists and sorted sets.
///
/// `ready` is a list (LPUSH in, RPOP out). `delayed` is a sorted set of task
/// payloads scored by due time and `leased` a sorted set of lease ids scored
/// by expiry, both in epoch milliseconds. `payloads` maps lease ids to the
/// leased task. `dead` is a capped list of [`DeadLetter`] records, newest
/// first.
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    keys: QueueKeys,
    dead_letter_cap: usize,
}

impl fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisQueue")
            .field("connection", &"ConnectionManager")
            .field("keys", &self.keys)
            .field("dead_letter_cap", &self.dead_letter_cap)
            .finish()
    }
}

impl RedisQueue {
    pub async fn connect(config: &RedisQueueConfig) -> Result<Self> {
        info!(prefix = %config.prefix, "connecting to Redis task queue");
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            LabelError::Queue(format!("Failed to create Redis client: {e}"))
        })?;
        let conn = ConnectionManager::new(client).await.map_err(|e| {
            LabelError::Queue(format!("Failed to connect to Redis: {e}"))
        })?;

        Ok(Self {
            conn,
            keys: QueueKeys::new(&config.prefix),
            dead_letter_cap: config.dead_letter_cap.max(1),
        })
    }
}

fn epoch_ms(at: chrono::DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

#[async_trait]
impl QueueService for RedisQueue {
    async fn enqueue(&self, task: LabelTask) -> Result<()> {
        let raw = serde_json::to_string(&task)?;
        let mut conn = self.conn.clone();
        redis::cmd("LPUSH")
            .arg(&self.keys.ready)
            .arg(raw)
            .query_async::<i64>(&mut conn)
            .await?;
        debug!(task_id = %task.id, rating_key = %task.rating_key, "enqueued task");
        Ok(())
    }

    async fn dequeue(
        &self,
        request: DequeueRequest,
    ) -> Result<Option<TaskLease>> {
        let now = Utc::now();
        let expires_at = now + request.lease_ttl;
        let lease_id = LeaseId::new();
        let mut conn = self.conn.clone();

        let raw: Option<String> = scripts::dequeue()
            .key(&self.keys.ready)
            .key(&self.keys.delayed)
            .key(&self.keys.leased)
            .key(&self.keys.payloads)
            .arg(epoch_ms(now))
            .arg(epoch_ms(expires_at))
            .arg(PROMOTE_BATCH)
            .arg(lease_id.to_string())
            .invoke_async(&mut conn)
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<LabelTask>(&raw) {
            Ok(task) => Ok(Some(TaskLease::new(
                lease_id,
                task,
                request.worker_id,
                expires_at,
            ))),
            Err(err) => {
                // Unreadable entries would be reclaimed forever; park them.
                warn!(error = %err, "dropping undecodable task payload");
                let entry = serde_json::json!({
                    "raw": raw,
                    "error": err.to_string(),
                    "failed_at": now,
                })
                .to_string();
                scripts::dead_letter()
                    .key(&self.keys.leased)
                    .key(&self.keys.payloads)
                    .key(&self.keys.dead)
                    .arg(lease_id.to_string())
                    .arg(entry)
                    .arg(self.dead_letter_cap)
                    .invoke_async::<i64>(&mut conn)
                    .await?;
                Err(LabelError::Serialization(err))
            }
        }
    }

    async fn renew(
        &self,
        lease: &mut TaskLease,
        extend_by: chrono::Duration,
    ) -> Result<bool> {
        let expires_at = Utc::now() + extend_by;
        let mut conn = self.conn.clone();
        let renewed: i64 = scripts::renew()
            .key(&self.keys.leased)
            .arg(lease.lease_id.to_string())
            .arg(epoch_ms(expires_at))
            .invoke_async(&mut conn)
            .await?;
        if renewed == 1 {
            lease.expires_at = expires_at;
        }
        Ok(renewed == 1)
    }

    async fn complete(&self, lease: &TaskLease) -> Result<()> {
        let mut conn = self.conn.clone();
        let removed: i64 = scripts::complete()
            .key(&self.keys.leased)
            .key(&self.keys.payloads)
            .arg(lease.lease_id.to_string())
            .invoke_async(&mut conn)
            .await?;
        if removed == 0 {
            warn!(task_id = %lease.task.id, "completed a lease that had already expired");
        }
        Ok(())
    }

    async fn retry(&self, lease: &TaskLease, delay: Duration) -> Result<()> {
        let next = serde_json::to_string(&lease.task.next_attempt())?;
        let due = Utc::now()
            + chrono::Duration::from_std(delay)
                .unwrap_or_else(|_| chrono::Duration::days(365));
        let mut conn = self.conn.clone();
        let scheduled: i64 = scripts::retry()
            .key(&self.keys.leased)
            .key(&self.keys.payloads)
            .key(&self.keys.delayed)
            .key(&self.keys.ready)
            .arg(lease.lease_id.to_string())
            .arg(next)
            .arg(epoch_ms(due))
            .arg(if delay.is_zero() { "1" } else { "0" })
            .invoke_async(&mut conn)
            .await?;
        if scheduled == 0 {
            warn!(task_id = %lease.task.id, "lease lost before retry; task was already reclaimed");
        }
        Ok(())
    }

    async fn dead_letter(
        &self,
        lease: &TaskLease,
        error: &LabelError,
    ) -> Result<()> {
        let entry =
            serde_json::to_string(&DeadLetter::new(lease.task.clone(), error))?;
        let mut conn = self.conn.clone();
        scripts::dead_letter()
            .key(&self.keys.leased)
            .key(&self.keys.payloads)
            .key(&self.keys.dead)
            .arg(lease.lease_id.to_string())
            .arg(entry)
            .arg(self.dead_letter_cap)
            .invoke_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn scan_expired_leases(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        let reclaimed: u64 = scripts::reclaim_expired()
            .key(&self.keys.leased)
            .key(&self.keys.payloads)
            .key(&self.keys.ready)
            .arg(epoch_ms(Utc::now()))
            .invoke_async(&mut conn)
            .await?;
        Ok(reclaimed)
    }

    async fn depth(&self) -> Result<QueueDepth> {
        let mut conn = self.conn.clone();
        let (ready, delayed, leased, dead): (usize, usize, usize, usize) =
            redis::pipe()
                .cmd("LLEN")
                .arg(&self.keys.ready)
                .cmd("ZCARD")
                .arg(&self.keys.delayed)
                .cmd("ZCARD")
                .arg(&self.keys.leased)
                .cmd("LLEN")
                .arg(&self.keys.dead)
                .query_async(&mut conn)
                .await?;
        Ok(QueueDepth {
            ready,
            delayed,
            leased,
            dead,
        })
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(&self.keys.dead)
            .arg(0)
            .arg(limit as i64 - 1)
            .query_async(&mut conn)
            .await?;
        // Undecodable tasks are parked in a different shape; skip them here.
        Ok(raw
            .iter()
            .filter_map(|entry| serde_json::from_str(entry).ok())
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_share_prefix() {
        let keys = QueueKeys::new("marquee");
        assert_eq!(keys.ready, "marquee:ready");
        assert_eq!(keys.delayed, "marquee:delayed");
        assert_eq!(keys.leased, "marquee:leased");
        assert_eq!(keys.payloads, "marquee:payloads");
        assert_eq!(keys.dead, "marquee:dead");
    }

    #[test]
    fn default_config_matches_local_broker() {
        let config = RedisQueueConfig::default();
        assert_eq!(config.url, "redis://localhost:6379/0");
        assert_eq!(config.prefix, "marquee");
    }
}
