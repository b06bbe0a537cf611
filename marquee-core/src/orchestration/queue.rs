use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{LabelError, Result};

use super::{
    job::LabelTask,
    lease::{DeadLetter, DequeueRequest, TaskLease},
};

/// Durable FIFO of [`LabelTask`]s with leases, delayed retries and a
/// dead-letter list.
///
/// Delivery is at-least-once: a lease that is never completed returns its
/// task to the ready list once [`QueueService::scan_expired_leases`] runs.
#[async_trait]
pub trait QueueService: Send + Sync {
    async fn enqueue(&self, task: LabelTask) -> Result<()>;

    /// Claims the oldest ready task, promoting due delayed tasks first.
    async fn dequeue(&self, request: DequeueRequest)
    -> Result<Option<TaskLease>>;

    /// Pushes the lease expiry out by `extend_by`. Returns `false` when the
    /// lease is no longer held.
    async fn renew(
        &self,
        lease: &mut TaskLease,
        extend_by: chrono::Duration,
    ) -> Result<bool>;

    async fn complete(&self, lease: &TaskLease) -> Result<()>;

    /// Releases the lease and schedules `task.next_attempt()` after `delay`.
    async fn retry(&self, lease: &TaskLease, delay: Duration) -> Result<()>;

    /// Releases the lease and records the task with the error that ended it.
    async fn dead_letter(&self, lease: &TaskLease, error: &LabelError)
    -> Result<()>;

    /// Returns number of tasks moved back to ready.
    async fn scan_expired_leases(&self) -> Result<u64>;

    async fn depth(&self) -> Result<QueueDepth>;

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>>;

    /// Liveness check for the broker.
    async fn ping(&self) -> Result<()>;
}

/// Per-list counters at a single instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepth {
    pub ready: usize,
    pub delayed: usize,
    pub leased: usize,
    pub dead: usize,
}

impl QueueDepth {
    pub fn pending(&self) -> usize {
        self.ready + self.delayed + self.leased
    }
}

pub const DEFAULT_DEAD_LETTER_CAP: usize = 1_000;
