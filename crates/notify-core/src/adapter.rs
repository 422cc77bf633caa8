use async_trait::async_trait;

use watchloop_core::Alert;

/// Outcome of a single delivery attempt through a [`NotificationAdapter`].
///
/// Mirrors the `{ success, messageId?, error? }` shape every channel
/// returns regardless of transport — the Alert Dispatch Handler (C12)
/// branches on `success` alone and only surfaces `error`/`message_id` for
/// logging and retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl NotificationResult {
    pub fn ok(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn ok_without_id() -> Self {
        Self {
            success: true,
            message_id: None,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// A configured delivery channel for alerts.
///
/// Each adapter instance is constructed with its own channel config (a
/// webhook URL and auth method, an SMTP server and from-address, …) — the
/// `send` call itself only ever takes the alert, same as
/// [`FetchProvider`](watchloop_provider::FetchProvider) only ever takes a
/// request once its own config is baked in at construction time.
///
/// Implementations must never panic on delivery failure; a failed send is
/// always a returned [`NotificationResult`], never an `Err` — the dispatch
/// handler's retry bookkeeping depends on always getting a result back.
#[async_trait]
pub trait NotificationAdapter: Send + Sync {
    /// The channel name this adapter answers to in `Alert::channels` /
    /// `AlertDispatchJob::channels` (e.g. `"webhook"`, `"email"`).
    fn channel(&self) -> &'static str;

    async fn send(&self, alert: &Alert) -> NotificationResult;
}
