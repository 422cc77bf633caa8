//! Core data model for the watchloop fetch-and-evaluate pipeline.
//!
//! This crate holds the types every other crate in the workspace shares:
//! the rule/observation/alert entities from the data model, the response
//! classifier and change detector (the two pure functions at the bottom of
//! the dependency graph), and the job payloads carried across the queue
//! boundary. Nothing here talks to a cache, a database, or the network.

pub mod alert;
pub mod attempt;
pub mod change;
pub mod classify;
pub mod domain_stats;
pub mod ids;
pub mod job;
pub mod observation;
pub mod rule;
pub mod value;

pub use alert::{Alert, Severity};
pub use attempt::FetchAttempt;
pub use change::{detect_change, ChangeKind, ChangeResult};
pub use classify::{classify, BlockKind, ClassifyInput, ClassifyResult, Outcome};
pub use domain_stats::DomainStats;
pub use ids::{ProviderId, RuleId, WorkspaceId};
pub use job::{AlertDispatchJob, JobTrigger, RunJob};
pub use observation::Observation;
pub use rule::{AlertCondition, ConditionKind, FetchPolicy, Rule, RuleType};
pub use value::NormalizedValue;
