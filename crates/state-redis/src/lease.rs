use async_trait::async_trait;
use redis::Script;

use watchloop_state::error::StateError;
use watchloop_state::key::StateKey;
use watchloop_state::lease::{LeaseAcquireResult, LeaseStore};

use crate::config::RedisConfig;
use crate::key_render::render_key;
use crate::scripts;
use deadpool_redis::{Config, Pool, Runtime};

/// Redis-backed implementation of [`LeaseStore`] (C4, §4.4): each key is a
/// sorted set member id → expiry timestamp, pruned on every call so a
/// crashed worker's lease self-releases once its TTL passes.
pub struct RedisLeaseStore {
    pool: Pool,
    prefix: String,
}

impl RedisLeaseStore {
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

    async fn conn(&self) -> Result<deadpool_redis::Connection, StateError> {
        self.pool.get().await.map_err(|e| StateError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn try_acquire(
        &self,
        key: &StateKey,
        lease_id: &str,
        now_ms: i64,
        expires_at_ms: i64,
        max: u64,
    ) -> Result<LeaseAcquireResult, StateError> {
        let redis_key = render_key(&self.prefix, key);
        let mut conn = self.conn().await?;

        let script = Script::new(scripts::LEASE_ACQUIRE);
        let result: Vec<i64> = script
            .key(&redis_key)
            .arg(lease_id)
            .arg(now_ms)
            .arg(expires_at_ms)
            .arg(max)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Unavailable(e.to_string()))?;

        match result.as_slice() {
            [1] => Ok(LeaseAcquireResult::Acquired),
            [0, count] => {
                Ok(LeaseAcquireResult::Denied { current_count: *count as u64, oldest_expiry_ms: None })
            }
            [0, count, oldest] => Ok(LeaseAcquireResult::Denied {
                current_count: *count as u64,
                oldest_expiry_ms: Some(*oldest),
            }),
            _ => Err(StateError::Unavailable("unexpected lease script response".into())),
        }
    }

    async fn release(&self, key: &StateKey, lease_id: &str) -> Result<(), StateError> {
        let redis_key = render_key(&self.prefix, key);
        let mut conn = self.conn().await?;
        let _: i64 = redis::cmd("ZREM")
            .arg(&redis_key)
            .arg(lease_id)
            .query_async(&mut conn)
            .await
            .map_err(|e| StateError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn count(&self, key: &StateKey, now_ms: i64) -> Result<u64, StateError> {
        let redis_key = render_key(&self.prefix, key);
        let mut conn = self.conn().await?;

        let script = Script::new(scripts::LEASE_COUNT);
        let count: i64 = script
            .key(&redis_key)
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Unavailable(e.to_string()))?;

        Ok(count.max(0) as u64)
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;
    use watchloop_core::ids::ProviderId;

    fn test_config() -> RedisConfig {
        RedisConfig {
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            prefix: format!("watchloop-test-{}", uuid::Uuid::new_v4()),
            ..RedisConfig::default()
        }
    }

    #[tokio::test]
    async fn acquire_respects_max() {
        let store = RedisLeaseStore::new(&test_config()).unwrap();
        let key = StateKey::concurrency(&ProviderId::new("brightdata"), Some("etsy.com"));

        let r1 = store.try_acquire(&key, "a", 0, 180_000, 2).await.unwrap();
        assert_eq!(r1, LeaseAcquireResult::Acquired);
        let r2 = store.try_acquire(&key, "b", 0, 180_000, 2).await.unwrap();
        assert_eq!(r2, LeaseAcquireResult::Acquired);
        let r3 = store.try_acquire(&key, "c", 0, 180_000, 2).await.unwrap();
        assert!(matches!(r3, LeaseAcquireResult::Denied { current_count: 2, .. }));
    }
}
