/// Errors that can occur during ledger storage operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// An error from the underlying storage backend.
    #[error("storage error: {0}")]
    Storage(String),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Attempted to insert an alert whose `dedupe_key` already exists (P9).
    #[error("duplicate dedupe key: {0}")]
    DuplicateDedupeKey(String),
}
