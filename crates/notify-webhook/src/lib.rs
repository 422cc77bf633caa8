//! Generic HTTP webhook notification adapter.
//!
//! Implements [`NotificationAdapter`](watchloop_notify::NotificationAdapter),
//! delivering alerts to any HTTP endpoint with configurable methods,
//! authentication, headers, payload shape, and response validation. Signs
//! the request body with HMAC-SHA256 when [`AuthMethod::HmacSha256`] is
//! configured.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use watchloop_notify_webhook::{WebhookAdapter, WebhookConfig};
//!
//! // Simple POST webhook
//! let config = WebhookConfig::new("https://api.example.com/webhook");
//! let adapter = WebhookAdapter::new(config);
//!
//! // With authentication and custom headers
//! use watchloop_notify_webhook::{AuthMethod, HttpMethod};
//! let config = WebhookConfig::new("https://api.example.com/events")
//!     .with_method(HttpMethod::Put)
//!     .with_auth(AuthMethod::Bearer("token-123".into()))
//!     .with_header("X-Custom", "value")
//!     .with_timeout_secs(15);
//! let adapter = WebhookAdapter::new(config);
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod types;

pub use adapter::WebhookAdapter;
pub use config::{AuthMethod, HttpMethod, PayloadMode, WebhookConfig};
pub use error::WebhookError;
pub use types::WebhookResponse;
