//! Error types for the run and dispatch job handlers (§7, A3).
//!
//! Per §7's taxonomy, almost every failure mode in C1–C10 is *locally
//! recovered* (a gate denies, a provider error is classified and logged) —
//! it never reaches this enum. What's left here is the "unexpected
//! exception ... caught at job boundary" row: a rule that can't be loaded,
//! a ledger write that fails outright, a queue that's unreachable. The
//! queue runtime's own retry policy (§6) is what actually handles these.

use thiserror::Error;

use watchloop_core::ids::RuleId;
use watchloop_ledger::LedgerError;

use crate::queue::QueueError;
use crate::rule_source::RuleSourceError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("rule not found: {0}")]
    RuleNotFound(RuleId),

    #[error("rule source error: {0}")]
    RuleSource(#[from] RuleSourceError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("rule url could not be parsed into a hostname: {0}")]
    InvalidUrl(String),

    #[error("alert {0} referenced by dispatch job was not found")]
    AlertNotFound(String),

    #[error("one or more channels failed delivery for dispatch {0}")]
    DispatchPartialFailure(String),
}
