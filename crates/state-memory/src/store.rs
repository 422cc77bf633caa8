use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;

use watchloop_state::error::StateError;
use watchloop_state::key::StateKey;
use watchloop_state::store::{CasResult, StateStore};

struct Entry {
    value: String,
    version: u64,
    expires_at: Option<SystemTime>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= SystemTime::now())
    }
}

/// Single-process in-memory [`StateStore`], backed by a `DashMap` guarded
/// per-entry (no cross-key locking needed — every operation here touches
/// exactly one key). Used by the worker binary when no Redis is configured,
/// and as the default test double across the workspace (mirrors the source
/// codebase's `*-memory` crates doubling as test harnesses).
#[derive(Default)]
pub struct MemoryStateStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError> {
        let canonical = key.canonical();
        match self.entries.entry(canonical) {
            dashmap::mapref::entry::Entry::Occupied(mut e) if e.get().is_expired() => {
                e.insert(Entry {
                    value: value.to_owned(),
                    version: 1,
                    expires_at: ttl.map(|d| SystemTime::now() + d),
                });
                Ok(true)
            }
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(Entry {
                    value: value.to_owned(),
                    version: 1,
                    expires_at: ttl.map(|d| SystemTime::now() + d),
                });
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        let canonical = key.canonical();
        match self.entries.get(&canonical) {
            Some(e) if !e.is_expired() => Ok(Some(e.value.clone())),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &StateKey, value: &str, ttl: Option<Duration>) -> Result<(), StateError> {
        let canonical = key.canonical();
        let version = self.entries.get(&canonical).map_or(1, |e| e.version + 1);
        self.entries.insert(
            canonical,
            Entry { value: value.to_owned(), version, expires_at: ttl.map(|d| SystemTime::now() + d) },
        );
        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        let canonical = key.canonical();
        Ok(self.entries.remove(&canonical).is_some())
    }

    async fn increment(&self, key: &StateKey, delta: i64, ttl: Option<Duration>) -> Result<i64, StateError> {
        let canonical = key.canonical();
        let mut entry = self.entries.entry(canonical).or_insert_with(|| Entry {
            value: "0".to_owned(),
            version: 1,
            expires_at: ttl.map(|d| SystemTime::now() + d),
        });
        let current: i64 = entry
            .value
            .parse()
            .map_err(|_| StateError::Serialization("counter value is not an integer".into()))?;
        let next = current + delta;
        entry.value = next.to_string();
        if let Some(d) = ttl {
            entry.expires_at = Some(SystemTime::now() + d);
        }
        Ok(next)
    }

    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError> {
        let canonical = key.canonical();
        let mut slot = self.entries.entry(canonical).or_insert_with(|| Entry {
            value: String::new(),
            version: 0,
            expires_at: None,
        });

        if slot.version != expected_version {
            return Ok(CasResult::Conflict {
                current_value: Some(slot.value.clone()),
                current_version: slot.version,
            });
        }

        slot.value = new_value.to_owned();
        slot.version += 1;
        slot.expires_at = ttl.map(|d| SystemTime::now() + d);
        Ok(CasResult::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn conformance_suite_passes() {
        let store = MemoryStateStore::new();
        watchloop_state::testing::run_store_conformance_tests(&store).await.unwrap();
    }

    #[tokio::test]
    async fn check_and_set_after_ttl_expiry_succeeds_again() {
        let store = MemoryStateStore::new();
        let key = StateKey { kind: watchloop_state::KeyKind::RateLimit, id: "expiring".into() };
        store.set(&key, "v1", Some(Duration::from_millis(1))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.get(&key).await.unwrap().is_none());
    }
}
