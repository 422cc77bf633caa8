//! In-process, single-replica implementations of [`watchloop_state::StateStore`],
//! [`watchloop_state::LeaseStore`], and [`watchloop_state::DistributedLock`].
//! Used by the worker binary when no Redis URL is configured, and as the
//! default backend in tests across the workspace.

pub mod lease;
pub mod lock;
pub mod store;

pub use lease::MemoryLeaseStore;
pub use lock::MemoryDistributedLock;
pub use store::MemoryStateStore;
