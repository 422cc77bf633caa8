//! SMTP email notification adapter.
//!
//! Implements [`NotificationAdapter`](watchloop_notify::NotificationAdapter),
//! delivering alerts as email through `lettre`'s async SMTP transport.
//! Transport is a separate [`EmailBackend`] trait so a non-SMTP backend
//! could be added later without touching [`EmailAdapter`]'s alert-to-message
//! mapping.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use watchloop_notify_email::{EmailAdapter, EmailConfig};
//!
//! let config = EmailConfig::new("smtp.example.com", "noreply@example.com", "ops@example.com")
//!     .with_credentials("user", "pass");
//! let adapter = EmailAdapter::new(&config).unwrap();
//! ```

pub mod adapter;
pub mod backend;
pub mod config;
pub mod error;
pub mod smtp;

pub use adapter::EmailAdapter;
pub use backend::{EmailBackend, EmailMessage, EmailResult};
pub use config::{EmailConfig, SmtpConfig};
pub use error::EmailError;
