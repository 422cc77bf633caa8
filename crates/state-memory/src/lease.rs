use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;

use watchloop_state::error::StateError;
use watchloop_state::key::StateKey;
use watchloop_state::lease::{LeaseAcquireResult, LeaseStore};

/// In-memory mirror of the Redis lease sorted sets: a `lease_id -> expiry_ms`
/// map per key, pruned of stale members on every call.
#[derive(Default)]
pub struct MemoryLeaseStore {
    sets: DashMap<String, BTreeMap<String, i64>>,
}

impl MemoryLeaseStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn evict_stale(set: &mut BTreeMap<String, i64>, now_ms: i64) {
        set.retain(|_, expires_at_ms| *expires_at_ms > now_ms);
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn try_acquire(
        &self,
        key: &StateKey,
        lease_id: &str,
        now_ms: i64,
        expires_at_ms: i64,
        max: u64,
    ) -> Result<LeaseAcquireResult, StateError> {
        let mut set = self.sets.entry(key.canonical()).or_default();
        Self::evict_stale(&mut set, now_ms);

        if (set.len() as u64) < max {
            set.insert(lease_id.to_owned(), expires_at_ms);
            return Ok(LeaseAcquireResult::Acquired);
        }

        let oldest_expiry_ms = set.values().min().copied();
        Ok(LeaseAcquireResult::Denied { current_count: set.len() as u64, oldest_expiry_ms })
    }

    async fn release(&self, key: &StateKey, lease_id: &str) -> Result<(), StateError> {
        if let Some(mut set) = self.sets.get_mut(&key.canonical()) {
            set.remove(lease_id);
        }
        Ok(())
    }

    async fn count(&self, key: &StateKey, now_ms: i64) -> Result<u64, StateError> {
        let Some(mut set) = self.sets.get_mut(&key.canonical()) else {
            return Ok(0);
        };
        Self::evict_stale(&mut set, now_ms);
        Ok(set.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchloop_core::ids::ProviderId;

    #[tokio::test]
    async fn acquire_respects_max_and_evicts_stale() {
        let store = MemoryLeaseStore::new();
        let key = StateKey::concurrency(&ProviderId::new("brightdata"), Some("etsy.com"));

        assert_eq!(store.try_acquire(&key, "a", 0, 1_000, 2).await.unwrap(), LeaseAcquireResult::Acquired);
        assert_eq!(store.try_acquire(&key, "b", 0, 1_000, 2).await.unwrap(), LeaseAcquireResult::Acquired);

        match store.try_acquire(&key, "c", 0, 1_000, 2).await.unwrap() {
            LeaseAcquireResult::Denied { current_count, .. } => assert_eq!(current_count, 2),
            LeaseAcquireResult::Acquired => panic!("should have been denied"),
        }

        // past both leases' expiry, the set should have drained and admit again
        assert_eq!(store.try_acquire(&key, "c", 2_000, 3_000, 2).await.unwrap(), LeaseAcquireResult::Acquired);
    }

    #[tokio::test]
    async fn release_frees_a_slot() {
        let store = MemoryLeaseStore::new();
        let key = StateKey::concurrency(&ProviderId::new("brightdata"), None);

        store.try_acquire(&key, "a", 0, 1_000, 1).await.unwrap();
        assert_eq!(store.count(&key, 0).await.unwrap(), 1);

        store.release(&key, "a").await.unwrap();
        assert_eq!(store.count(&key, 0).await.unwrap(), 0);
        assert_eq!(store.try_acquire(&key, "b", 0, 1_000, 1).await.unwrap(), LeaseAcquireResult::Acquired);
    }
}
