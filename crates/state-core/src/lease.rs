//! Concurrency lease storage (C4, §4.4).
//!
//! Each lease set is a sorted set keyed by provider+hostname (or
//! provider+`__global__`), scored by expiry timestamp. Acquire must
//! atomically evict stale members, read cardinality, and add a new member
//! if under the limit — three steps that have to happen as one operation
//! so two worker replicas can't both observe room for a lease that only
//! one can actually hold.

use async_trait::async_trait;

use crate::error::StateError;
use crate::key::StateKey;

/// Outcome of a lease acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseAcquireResult {
    /// The lease was registered; the caller now holds it until `release` or
    /// its TTL expires.
    Acquired,
    /// The set is at capacity after evicting stale members.
    Denied {
        current_count: u64,
        /// Expiry of the soonest-to-free member, used to compute `waitMs`
        /// per §4.4 ("`waitMs = (oldestExpiry − now) × 1000`" — already in
        /// milliseconds here since we store epoch-ms).
        oldest_expiry_ms: Option<i64>,
    },
}

/// Trait for the concurrency-lease sorted sets behind C4. Implementations
/// must evict members with `score < now_ms` before counting or admitting,
/// exactly once, as part of the same atomic operation.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Evict stale members and try to add `lease_id` scored at
    /// `expires_at_ms`, admitting only if the post-eviction cardinality is
    /// `< max`.
    async fn try_acquire(
        &self,
        key: &StateKey,
        lease_id: &str,
        now_ms: i64,
        expires_at_ms: i64,
        max: u64,
    ) -> Result<LeaseAcquireResult, StateError>;

    /// Remove `lease_id` from the set, if present.
    async fn release(&self, key: &StateKey, lease_id: &str) -> Result<(), StateError>;

    /// Evict stale members and return the current cardinality, without
    /// attempting to add anything. Used for read-only introspection.
    async fn count(&self, key: &StateKey, now_ms: i64) -> Result<u64, StateError>;
}
