//! In-process ledger backend (no database). See [`MemoryLedger`].

pub mod store;

pub use store::MemoryLedger;
