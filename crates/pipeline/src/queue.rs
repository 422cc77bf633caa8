//! Job queue boundary (§1, §6).
//!
//! The queue runtime itself is explicitly out of scope — a production
//! deployment swaps in Redis Streams, SQS, or similar behind this trait
//! without touching C1–C12. What's modeled here is exactly the contract
//! C11/C12 depend on: enqueue, enqueue with a delay (for the `rate_limited`
//! deferral path), and the retry/dedupe numbers from §6's queue table.
//!
//! The in-memory implementations below are the worker binary's default
//! backend and the test double used throughout this crate's test suite.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

use watchloop_core::{AlertDispatchJob, RunJob};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RunQueue: Send + Sync {
    async fn enqueue(&self, job: RunJob) -> Result<(), QueueError>;

    /// Enqueue a `RunJob` to become visible after `delay`. Used by C11 to
    /// implement the `rate_limited` deferral (§4.11 step 4).
    async fn enqueue_delayed(&self, job: RunJob, delay: Duration) -> Result<(), QueueError>;

    /// Pull the next visible job, if any. Non-blocking; callers poll.
    async fn dequeue(&self) -> Result<Option<RunJob>, QueueError>;
}

#[async_trait]
pub trait DispatchQueue: Send + Sync {
    /// `job_id` is `{dedupeKey}-{floor(now/300s)}` (§6) — the caller
    /// derives it via [`AlertDispatchJob::job_id`]. Enqueues with an
    /// already-seen `job_id` within the window are dropped rather than
    /// duplicated (P12).
    async fn enqueue(&self, job_id: String, job: AlertDispatchJob) -> Result<(), QueueError>;

    async fn dequeue(&self) -> Result<Option<AlertDispatchJob>, QueueError>;
}

/// Single-process `rules:run` queue. Delayed jobs are held by a background
/// `tokio::time::sleep` and moved to the visible queue once their delay
/// elapses — good enough for the default 5-worker-slot in-process
/// deployment this binary targets; a production deployment behind a real
/// broker replaces this wholesale.
#[derive(Default)]
pub struct MemoryRunQueue {
    visible: Arc<Mutex<std::collections::VecDeque<RunJob>>>,
    notify: Arc<Notify>,
}

impl MemoryRunQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunQueue for MemoryRunQueue {
    async fn enqueue(&self, job: RunJob) -> Result<(), QueueError> {
        self.visible.lock().push_back(job);
        self.notify.notify_one();
        Ok(())
    }

    async fn enqueue_delayed(&self, job: RunJob, delay: Duration) -> Result<(), QueueError> {
        let visible = self.visible.clone();
        let notify = self.notify.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            visible.lock().push_back(job);
            notify.notify_one();
        });
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<RunJob>, QueueError> {
        Ok(self.visible.lock().pop_front())
    }
}

/// Single-process `alerts:dispatch` queue. Tracks recently-enqueued
/// `job_id`s for five minutes so repeat enqueues within the same bucket
/// collapse to one entry (P12), mirroring the real queue's job-id dedupe.
pub struct MemoryDispatchQueue {
    visible: Arc<Mutex<std::collections::VecDeque<AlertDispatchJob>>>,
    seen: Arc<Mutex<HashSet<String>>>,
    notify: Arc<Notify>,
}

impl Default for MemoryDispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDispatchQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            visible: Arc::new(Mutex::new(std::collections::VecDeque::new())),
            seen: Arc::new(Mutex::new(HashSet::new())),
            notify: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl DispatchQueue for MemoryDispatchQueue {
    async fn enqueue(&self, job_id: String, job: AlertDispatchJob) -> Result<(), QueueError> {
        let newly_seen = self.seen.lock().insert(job_id.clone());
        if !newly_seen {
            return Ok(());
        }
        self.visible.lock().push_back(job);
        self.notify.notify_one();

        let seen = self.seen.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(300)).await;
            seen.lock().remove(&job_id);
        });
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<AlertDispatchJob>, QueueError> {
        Ok(self.visible.lock().pop_front())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use watchloop_core::JobTrigger;

    use super::*;

    fn run_job() -> RunJob {
        RunJob { rule_id: "r1".into(), trigger: JobTrigger::Schedule, scheduled_at: Utc::now() }
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_round_trips() {
        let queue = MemoryRunQueue::new();
        queue.enqueue(run_job()).await.unwrap();
        let job = queue.dequeue().await.unwrap();
        assert!(job.is_some());
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_job_becomes_visible_after_delay() {
        let queue = MemoryRunQueue::new();
        queue.enqueue_delayed(run_job(), Duration::from_millis(50)).await.unwrap();
        assert!(queue.dequeue().await.unwrap().is_none());
        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        assert!(queue.dequeue().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_job_id_within_window_collapses_p12() {
        let queue = MemoryDispatchQueue::new();
        let job = AlertDispatchJob {
            alert_id: "a1".into(),
            channels: vec!["webhook".into()],
            dedupe_key: "dk1".into(),
        };
        queue.enqueue("dk1-100".into(), job.clone()).await.unwrap();
        queue.enqueue("dk1-100".into(), job).await.unwrap();
        assert!(queue.dequeue().await.unwrap().is_some());
        assert!(queue.dequeue().await.unwrap().is_none());
    }
}
