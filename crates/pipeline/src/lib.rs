//! Adaptive fetch-and-evaluate pipeline (C3–C12, §4.3–§4.12).
//!
//! The response classifier and change detector (C1/C2) live in
//! `watchloop-core`, below everything here. This crate holds the
//! resource-governing gates the Fetch Orchestrator composes (rate limiter,
//! concurrency semaphore, circuit breaker, budget guard), the orchestrator
//! itself, the dedupe gate and alert generator, the extractor and condition
//! evaluator boundaries, and the two job handlers (`rules:run`,
//! `alerts:dispatch`) that tie it all together.

pub mod alert_gen;
pub mod budget;
pub mod circuit_breaker;
pub mod condition;
pub mod dedupe;
pub mod dispatch_handler;
pub mod error;
pub mod extractor;
pub mod orchestrator;
pub mod queue;
pub mod rate_limiter;
pub mod rule_source;
pub mod run_handler;
pub mod semaphore;

pub use budget::{BudgetDecision, BudgetGuard, BudgetPolicy, BudgetQuery, StaticBudgetPolicy};
pub use circuit_breaker::{Admission, CircuitBreaker};
pub use condition::{ConditionEvaluator, StandardConditionEvaluator, TriggeredCondition};
pub use dedupe::{DedupeDecision, DedupeGate};
pub use dispatch_handler::DispatchHandler;
pub use error::PipelineError;
pub use extractor::{CssExtractor, ExtractError, Extractor};
pub use orchestrator::{FetchOrchestrator, OrchestratorConfig, OrchestratorOutcome, OrchestratorRequest};
pub use queue::{DispatchQueue, MemoryDispatchQueue, MemoryRunQueue, QueueError, RunQueue};
pub use rate_limiter::{ConsumeResult, RateLimitConfig, RateLimiter};
pub use rule_source::{MemoryRuleSource, RuleSource, RuleSourceError};
pub use run_handler::{RunHandler, TierPolicy};
pub use semaphore::{ConcurrencyConfig, ConcurrencySemaphore, Lease, LeaseResult};
