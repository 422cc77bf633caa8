//! DomainStats: per (workspace, hostname, UTC calendar day) rolling
//! aggregate, upserted by C7 after every attempt.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::classify::Outcome;
use crate::ids::{Hostname, WorkspaceId};

/// Design note (c): the source increments a running average without
/// tracking the sample count, which drifts over a busy day. This keeps
/// `latency_sum_ms` alongside `attempts` and derives the average on read,
/// which is exact rather than approximate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainStats {
    pub workspace_id: WorkspaceId,
    pub hostname: Hostname,
    pub day: NaiveDate,
    pub attempts: u64,
    pub ok_count: u64,
    pub blocked_count: u64,
    pub empty_count: u64,
    pub timeout_count: u64,
    pub cost_usd: f64,
    pub latency_sum_ms: u64,
}

impl DomainStats {
    pub fn new(workspace_id: WorkspaceId, hostname: Hostname, day: NaiveDate) -> Self {
        Self {
            workspace_id,
            hostname,
            day,
            attempts: 0,
            ok_count: 0,
            blocked_count: 0,
            empty_count: 0,
            timeout_count: 0,
            cost_usd: 0.0,
            latency_sum_ms: 0,
        }
    }

    /// Average latency across every attempt recorded so far, in ms. `0.0`
    /// before the first attempt rather than `NaN`, so callers can log it
    /// unconditionally.
    pub fn avg_latency_ms(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.latency_sum_ms as f64 / self.attempts as f64
        }
    }

    /// Fold one attempt's outcome, latency, and cost into the running
    /// aggregate. Called by C7 on the asynchronous (fire-and-forget) path.
    pub fn record(&mut self, outcome: Outcome, latency_ms: u64, cost_usd: f64) {
        self.attempts += 1;
        self.latency_sum_ms += latency_ms;
        self.cost_usd += cost_usd;
        match outcome {
            Outcome::Ok => self.ok_count += 1,
            Outcome::Blocked | Outcome::CaptchaRequired => self.blocked_count += 1,
            Outcome::Empty => self.empty_count += 1,
            Outcome::Timeout => self.timeout_count += 1,
            _ => {}
        }
    }
}
