use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{LabelError, Result};

use super::{
    job::LabelTask,
    lease::{DeadLetter, DequeueRequest, LeaseId, TaskLease},
    queue::{DEFAULT_DEAD_LETTER_CAP, QueueDepth, QueueService},
};

#[derive(Default)]
struct QueueState {
    ready: VecDeque<LabelTask>,
    delayed: Vec<(DateTime<Utc>, LabelTask)>,
    leased: HashMap<LeaseId, (DateTime<Utc>, LabelTask)>,
    dead: VecDeque<DeadLetter>,
}

impl QueueState {
    fn promote_due(&mut self, now: DateTime<Utc>) {
        if self.delayed.is_empty() {
            return;
        }
        self.delayed.sort_by_key(|(due, _)| *due);
        let due = self.delayed.partition_point(|(at, _)| *at <= now);
        for (_, task) in self.delayed.drain(..due) {
            self.ready.push_back(task);
        }
    }

    fn push_dead(&mut self, entry: DeadLetter, cap: usize) {
        self.dead.push_front(entry);
        self.dead.truncate(cap);
    }
}

/// Process-local queue with the same semantics as the Redis backend.
///
/// Nothing survives a restart; intended for tests and single-process setups.
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    dead_letter_cap: usize,
}

impl fmt::Debug for InMemoryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let depth = self.state.try_lock().map(|state| {
            (state.ready.len(), state.delayed.len(), state.leased.len())
        });
        f.debug_struct("InMemoryQueue")
            .field("depth", &depth.ok())
            .field("dead_letter_cap", &self.dead_letter_cap)
            .finish()
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            dead_letter_cap: DEFAULT_DEAD_LETTER_CAP,
        }
    }
}

#[async_trait]
impl QueueService for InMemoryQueue {
    async fn enqueue(&self, task: LabelTask) -> Result<()> {
        let mut state = self.state.lock().await;
        debug!(task_id = %task.id, rating_key = %task.rating_key, "enqueued task");
        state.ready.push_back(task);
        Ok(())
    }

    async fn dequeue(
        &self,
        request: DequeueRequest,
    ) -> Result<Option<TaskLease>> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        state.promote_due(now);
        let Some(task) = state.ready.pop_front() else {
            return Ok(None);
        };
        let lease = TaskLease::new(
            LeaseId::new(),
            task,
            request.worker_id,
            now + request.lease_ttl,
        );
        state
            .leased
            .insert(lease.lease_id, (lease.expires_at, lease.task.clone()));
        Ok(Some(lease))
    }

    async fn renew(
        &self,
        lease: &mut TaskLease,
        extend_by: chrono::Duration,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some((expires_at, _)) = state.leased.get_mut(&lease.lease_id) else {
            return Ok(false);
        };
        *expires_at = Utc::now() + extend_by;
        lease.expires_at = *expires_at;
        Ok(true)
    }

    async fn complete(&self, lease: &TaskLease) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.leased.remove(&lease.lease_id).is_none() {
            warn!(task_id = %lease.task.id, "completed a lease that had already expired");
        }
        Ok(())
    }

    async fn retry(&self, lease: &TaskLease, delay: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.leased.remove(&lease.lease_id).is_none() {
            warn!(task_id = %lease.task.id, "lease lost before retry; task was already reclaimed");
            return Ok(());
        }
        let next = lease.task.next_attempt();
        if delay.is_zero() {
            state.ready.push_back(next);
        } else {
            let due = chrono::Duration::from_std(delay)
                .ok()
                .and_then(|delay| Utc::now().checked_add_signed(delay))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            state.delayed.push((due, next));
        }
        Ok(())
    }

    async fn dead_letter(
        &self,
        lease: &TaskLease,
        error: &LabelError,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.leased.remove(&lease.lease_id);
        let entry = DeadLetter::new(lease.task.clone(), error);
        state.push_dead(entry, self.dead_letter_cap);
        Ok(())
    }

    async fn scan_expired_leases(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let expired: Vec<LeaseId> = state
            .leased
            .iter()
            .filter(|(_, (expires_at, _))| *expires_at <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            if let Some((_, task)) = state.leased.remove(id) {
                state.ready.push_front(task);
            }
        }
        Ok(expired.len() as u64)
    }

    async fn depth(&self) -> Result<QueueDepth> {
        let state = self.state.lock().await;
        Ok(QueueDepth {
            ready: state.ready.len(),
            delayed: state.delayed.len(),
            leased: state.leased.len(),
            dead: state.dead.len(),
        })
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>> {
        let state = self.state.lock().await;
        Ok(state.dead.iter().take(limit).cloned().collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
