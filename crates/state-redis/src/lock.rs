//! Redis-backed distributed locking, used to serialize the read-modify-
//! write sequences in the circuit breaker (C5) and token bucket (C3) that
//! the Lua scripts in [`crate::scripts`] don't already make atomic on their
//! own (e.g. the breaker's multi-field state transition).
//!
//! Locks are acquired with `SET key value NX PX milliseconds`: `NX` so only
//! the first caller gets it, `PX` so a crashed holder's lock self-expires
//! instead of deadlocking every other replica.
//!
//! # Guarantees
//!
//! Full mutual exclusion on a single Redis instance. During Sentinel/Cluster
//! failover, replication lag can let two clients briefly believe they hold
//! the same lock — acceptable here because the lock only protects "don't
//! recompute a gate decision twice," not a correctness-critical invariant
//! (the invariants themselves — P3/P4/P5 — hold regardless, since a second
//! write just re-derives the same state transition from the same inputs).

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use redis::Script;

use watchloop_state::error::StateError;
use watchloop_state::lock::{DistributedLock, LockGuard};

use crate::config::RedisConfig;
use crate::scripts;

/// Redis-backed implementation of [`DistributedLock`].
pub struct RedisDistributedLock {
    pool: Pool,
    prefix: String,
}

impl RedisDistributedLock {
    /// # Errors
    ///
    /// Returns [`StateError::Unavailable`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, StateError> {
        let cfg = Config::from_url(config.effective_url());
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| StateError::Unavailable(e.to_string()))?
            .map_err(|e| StateError::Unavailable(e.to_string()))?;

        Ok(Self { pool, prefix: config.prefix.clone() })
    }

    fn lock_key(&self, name: &str) -> String {
        format!("{}:lock:{}", self.prefix, name)
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StateError> {
        self.pool.get().await.map_err(|e| StateError::Unavailable(e.to_string()))
    }
}

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[async_trait]
impl DistributedLock for RedisDistributedLock {
    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<Box<dyn LockGuard>>, StateError> {
        let redis_key = self.lock_key(name);
        let owner = uuid::Uuid::new_v4().to_string();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        let mut conn = self.conn().await?;
        let script = Script::new(scripts::LOCK_ACQUIRE);
        let result: i64 = script
            .key(&redis_key)
            .arg(&owner)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Unavailable(e.to_string()))?;

        if result == 1 {
            Ok(Some(Box::new(RedisLockGuard { pool: self.pool.clone(), redis_key, owner })))
        } else {
            Ok(None)
        }
    }

    async fn acquire(
        &self,
        name: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Box<dyn LockGuard>, StateError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(guard) = self.try_acquire(name, ttl).await? {
                return Ok(guard);
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(StateError::LockTimeout(timeout));
            }

            let remaining = deadline - tokio::time::Instant::now();
            let sleep_dur = LOCK_POLL_INTERVAL.min(remaining);
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// A held distributed lock backed by Redis. Dropping without calling
/// [`release`](LockGuard::release) is safe — the lock self-expires.
pub struct RedisLockGuard {
    pool: Pool,
    redis_key: String,
    owner: String,
}

impl RedisLockGuard {
    async fn conn(&self) -> Result<deadpool_redis::Connection, StateError> {
        self.pool.get().await.map_err(|e| StateError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl LockGuard for RedisLockGuard {
    async fn extend(&self, duration: Duration) -> Result<(), StateError> {
        let ttl_ms = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        let mut conn = self.conn().await?;

        let script = Script::new(scripts::LOCK_EXTEND);
        let result: i64 = script
            .key(&self.redis_key)
            .arg(&self.owner)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Unavailable(e.to_string()))?;

        if result == 1 {
            Ok(())
        } else {
            Err(StateError::LockExpired(format!("lock {} is no longer held by this owner", self.redis_key)))
        }
    }

    async fn release(self: Box<Self>) -> Result<(), StateError> {
        let mut conn = self.conn().await?;

        let script = Script::new(scripts::LOCK_RELEASE);
        let result: i64 = script
            .key(&self.redis_key)
            .arg(&self.owner)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Unavailable(e.to_string()))?;

        if result == 1 {
            Ok(())
        } else {
            Err(StateError::LockExpired(format!(
                "lock {} was not held by this owner at release time",
                self.redis_key
            )))
        }
    }

    async fn is_held(&self) -> Result<bool, StateError> {
        let mut conn = self.conn().await?;
        let current_owner: Option<String> =
            conn.get(&self.redis_key).await.map_err(|e| StateError::Unavailable(e.to_string()))?;

        Ok(current_owner.as_deref() == Some(&self.owner))
    }
}
