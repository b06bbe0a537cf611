use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LabelError;

use super::job::LabelTask;

/// Identity of one claim on a task. A task reclaimed after its lease expired
/// is claimed again under a fresh id.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct LeaseId(pub Uuid);

impl Default for LeaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaseId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Claim on a task handed to one worker until `expires_at`.
#[derive(Clone, Debug)]
pub struct TaskLease {
    pub lease_id: LeaseId,
    pub task: LabelTask,
    pub worker_id: String,
    pub expires_at: DateTime<Utc>,
}

impl TaskLease {
    pub(crate) fn new(
        lease_id: LeaseId,
        task: LabelTask,
        worker_id: String,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            lease_id,
            task,
            worker_id,
            expires_at,
        }
    }
}

/// Request object to claim the next ready task.
#[derive(Clone, Debug)]
pub struct DequeueRequest {
    pub worker_id: String,
    pub lease_ttl: chrono::Duration,
}

/// Task that exhausted its attempts or failed terminally.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeadLetter {
    pub task: LabelTask,
    pub error: String,
    #[serde(default)]
    pub kind: String,
    /// Upstream body that could not be interpreted, when there was one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(task: LabelTask, error: &LabelError) -> Self {
        Self {
            task,
            error: error.to_string(),
            kind: error.kind().to_string(),
            raw_payload: error.raw_payload().map(str::to_string),
            failed_at: Utc::now(),
        }
    }
}
