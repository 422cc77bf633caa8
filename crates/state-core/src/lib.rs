//! Shared-cache abstractions backing C3 (rate limiter), C4 (concurrency
//! semaphore), and C5 (circuit breaker): a key-value store with atomic
//! check-and-set/increment/compare-and-swap, a sorted-set-like lease store,
//! and a distributed lock, each with in-memory and Redis implementations
//! in sibling crates.

pub mod error;
pub mod key;
pub mod lease;
pub mod lock;
pub mod store;
pub mod testing;

pub use error::StateError;
pub use key::{KeyKind, StateKey};
pub use lease::{LeaseAcquireResult, LeaseStore};
pub use lock::{DistributedLock, LockGuard};
pub use store::{CasResult, StateStore};
