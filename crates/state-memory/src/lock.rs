//! In-memory distributed locking, for single-process deployments and tests.
//! Mirrors the Redis backend's owner-token semantics (acquire only succeeds
//! if the key is absent or stale, extend/release only succeed for the owner
//! that holds it) without needing a real NX/PX round trip.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;

use watchloop_state::error::StateError;
use watchloop_state::lock::{DistributedLock, LockGuard};

struct Held {
    owner: String,
    expires_at: SystemTime,
}

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// In-memory implementation of [`DistributedLock`].
#[derive(Default)]
pub struct MemoryDistributedLock {
    locks: Arc<DashMap<String, Held>>,
}

impl MemoryDistributedLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DistributedLock for MemoryDistributedLock {
    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<Box<dyn LockGuard>>, StateError> {
        let owner = uuid::Uuid::new_v4().to_string();
        let now = SystemTime::now();

        let acquired = match self.locks.get(name) {
            Some(held) if held.expires_at > now => false,
            _ => true,
        };

        if !acquired {
            return Ok(None);
        }

        self.locks.insert(name.to_owned(), Held { owner: owner.clone(), expires_at: now + ttl });
        Ok(Some(Box::new(MemoryLockGuard { locks: self.locks.clone(), name: name.to_owned(), owner })))
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
            tokio::time::sleep(LOCK_POLL_INTERVAL.min(remaining)).await;
        }
    }
}

/// A held in-memory lock. Dropping without [`release`](LockGuard::release)
/// is safe — a subsequent `try_acquire` will see the stale expiry and win.
pub struct MemoryLockGuard {
    locks: Arc<DashMap<String, Held>>,
    name: String,
    owner: String,
}

#[async_trait]
impl LockGuard for MemoryLockGuard {
    async fn extend(&self, duration: Duration) -> Result<(), StateError> {
        match self.locks.get_mut(&self.name) {
            Some(mut held) if held.owner == self.owner => {
                held.expires_at = SystemTime::now() + duration;
                Ok(())
            }
            _ => Err(StateError::LockExpired(format!("lock {} is no longer held by this owner", self.name))),
        }
    }

    async fn release(self: Box<Self>) -> Result<(), StateError> {
        match self.locks.get(&self.name) {
            Some(held) if held.owner == self.owner => {
                drop(held);
                self.locks.remove(&self.name);
                Ok(())
            }
            _ => Err(StateError::LockExpired(format!(
                "lock {} was not held by this owner at release time",
                self.name
            ))),
        }
    }

    async fn is_held(&self) -> Result<bool, StateError> {
        Ok(self
            .locks
            .get(&self.name)
            .is_some_and(|held| held.owner == self.owner && held.expires_at > SystemTime::now()))
    }
}
