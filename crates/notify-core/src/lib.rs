//! Notification adapter boundary: the trait every delivery channel
//! implements (`webhook`, `email`, …) and the registry the Alert Dispatch
//! Handler looks channels up in by name.

pub mod adapter;
pub mod registry;

pub use adapter::{NotificationAdapter, NotificationResult};
pub use registry::NotificationRegistry;
