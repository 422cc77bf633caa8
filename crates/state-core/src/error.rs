use thiserror::Error;

/// Errors from the shared-cache state backends (circuit breaker, rate
/// limiter, concurrency semaphore). Every gate component in §4 reads this
/// error to decide whether to fail open or fail closed — see the
/// `is_retryable` classification below and the per-component policy in
/// §4.3/§4.4.
#[derive(Debug, Error)]
pub enum StateError {
    /// The backend (Redis, in-memory map) could not be reached or returned
    /// a transport-level error. This is the variant gate components branch
    /// on for fail-open/fail-closed behavior.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A value stored in the backend could not be deserialized into the
    /// expected shape (`CircuitState`, token bucket hash, lease entry).
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A lock could not be acquired within the requested timeout.
    #[error("lock acquisition timed out after {0:?}")]
    LockTimeout(std::time::Duration),

    /// A lock operation (extend/release) was attempted by a caller that no
    /// longer (or never did) hold the lock, e.g. because its TTL expired.
    #[error("lock no longer held: {0}")]
    LockExpired(String),
}

impl StateError {
    /// Whether the failure is transient infrastructure unavailability
    /// (as opposed to a programming error). Every call site in §4 that
    /// talks about "fail-open" or "fail-closed" behavior is reacting to
    /// this classification on `Unavailable`.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
