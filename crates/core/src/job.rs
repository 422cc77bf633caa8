//! Job payloads carried across the `rules:run` and `alerts:dispatch` queue
//! boundary. The queue runtime itself is external (§6); these are just the
//! wire shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::RuleId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobTrigger {
    Schedule,
    Manual,
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunJob {
    pub rule_id: RuleId,
    pub trigger: JobTrigger,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDispatchJob {
    pub alert_id: String,
    pub channels: Vec<String>,
    pub dedupe_key: String,
}

impl AlertDispatchJob {
    /// Job id per §6: `{dedupeKey}-{floor(now/300s)}`, so repeat enqueues
    /// within the same 5-minute bucket collapse to one queue entry (P12).
    pub fn job_id(dedupe_key: &str, now: DateTime<Utc>) -> String {
        let bucket = now.timestamp() / 300;
        format!("{dedupe_key}-{bucket}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn job_id_collapses_within_same_five_minute_bucket() {
        let t1 = Utc.with_ymd_and_hms(2026, 7, 26, 12, 0, 1).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 7, 26, 12, 4, 59).unwrap();
        assert_eq!(
            AlertDispatchJob::job_id("abc123", t1),
            AlertDispatchJob::job_id("abc123", t2)
        );
    }

    #[test]
    fn job_id_differs_across_bucket_boundary() {
        let t1 = Utc.with_ymd_and_hms(2026, 7, 26, 12, 4, 59).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 7, 26, 12, 5, 1).unwrap();
        assert_ne!(
            AlertDispatchJob::job_id("abc123", t1),
            AlertDispatchJob::job_id("abc123", t2)
        );
    }
}
