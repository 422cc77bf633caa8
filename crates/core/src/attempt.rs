//! FetchAttempt: the append-only ledger row C7 writes for every provider
//! invocation, including synthesized skips like `preferred_unavailable`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::{BlockKind, Outcome};
use crate::ids::{Hostname, ProviderId, RuleId, WorkspaceId};

/// First 50 KB of a problem response, kept for debugging. Only ever set
/// for the first problem outcome in a run — the orchestrator stops storing
/// samples once one exists (§4.8 step 6).
pub const RAW_SAMPLE_MAX_BYTES: usize = 50 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchAttempt {
    pub workspace_id: WorkspaceId,
    pub rule_id: RuleId,
    pub url: String,
    pub hostname: Hostname,
    pub provider: ProviderId,
    pub outcome: Outcome,
    pub block_kind: Option<BlockKind>,
    pub http_status: Option<u16>,
    pub final_url: Option<String>,
    pub body_bytes: Option<usize>,
    pub content_type: Option<String>,
    pub latency_ms: u64,
    pub signals: Vec<String>,
    pub error_detail: Option<String>,
    pub cost_usd: f64,
    pub cost_units: Option<f64>,
    pub raw_sample: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl FetchAttempt {
    /// Truncate `body` to [`RAW_SAMPLE_MAX_BYTES`] on a char boundary, for
    /// storage in `raw_sample`.
    pub fn truncate_sample(body: &str) -> String {
        if body.len() <= RAW_SAMPLE_MAX_BYTES {
            return body.to_owned();
        }
        let mut end = RAW_SAMPLE_MAX_BYTES;
        while end > 0 && !body.is_char_boundary(end) {
            end -= 1;
        }
        body[..end].to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_sample_leaves_short_bodies_untouched() {
        assert_eq!(FetchAttempt::truncate_sample("short"), "short");
    }

    #[test]
    fn truncate_sample_caps_at_limit() {
        let body = "x".repeat(RAW_SAMPLE_MAX_BYTES + 500);
        let sample = FetchAttempt::truncate_sample(&body);
        assert_eq!(sample.len(), RAW_SAMPLE_MAX_BYTES);
    }
}
