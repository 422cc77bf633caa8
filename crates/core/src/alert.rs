//! Alert entity (C10) and its severity scale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::change::ChangeKind;
use crate::ids::{RuleId, WorkspaceId};
use crate::value::NormalizedValue;

/// Declared low-to-high so the derived `Ord` gives the total order §4.10
/// requires (`critical > warning > info`) for free — `Severity::Critical`
/// is simply the maximum of any triggered-condition set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Highest severity among a non-empty set of triggered conditions.
    /// Returns `None` if `severities` is empty — callers with at least one
    /// fired condition (the only case C10 runs in) never see that branch.
    pub fn highest(severities: impl IntoIterator<Item = Severity>) -> Option<Severity> {
        severities.into_iter().max()
    }
}

/// Persisted by C11 once the Dedupe Gate (C9) allows. `dedupe_key` is
/// unique across all alerts (P9); the caller is expected to treat a unique
/// constraint violation on insert as "someone else already wrote this one".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub dedupe_key: String,
    pub rule_id: RuleId,
    pub workspace_id: WorkspaceId,
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub triggered_at: DateTime<Utc>,
    pub current_value: NormalizedValue,
    pub previous_value: Option<NormalizedValue>,
    pub change_kind: Option<ChangeKind>,
    pub diff_summary: Option<String>,
    pub channels: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_outranks_warning_and_info() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn highest_picks_the_max() {
        let set = [Severity::Info, Severity::Critical, Severity::Warning];
        assert_eq!(Severity::highest(set), Some(Severity::Critical));
    }

    #[test]
    fn highest_of_empty_is_none() {
        assert_eq!(Severity::highest(std::iter::empty()), None);
    }
}
