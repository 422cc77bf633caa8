//! Ledger trait and core types (C7's backing store).
//!
//! Two backends exist: an in-memory one (`watchloop-ledger-memory`, also
//! the default test double) and a Postgres one (`watchloop-ledger-postgres`)
//! for production multi-replica deployments.

pub mod error;
pub mod store;
pub mod testing;

pub use error::LedgerError;
pub use store::Ledger;
