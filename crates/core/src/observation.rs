//! Observation entity: the last *stable* normalized value for a rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{RuleId, WorkspaceId};
use crate::value::NormalizedValue;

/// Written exclusively by the Run Handler (C11), and only when a run's
/// final outcome is `ok` and extraction yielded a non-null value (P2). A
/// failed run must never touch this — the caller enforces that invariant,
/// not this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub rule_id: RuleId,
    pub workspace_id: WorkspaceId,
    pub value: NormalizedValue,
    pub observed_at: DateTime<Utc>,
}
