use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EventType, ImdbId, MovieEvent, RatingKey, TaskId};

/// Queued unit of work: refresh the labels of one catalog entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelTask {
    pub id: TaskId,
    pub rating_key: RatingKey,
    #[serde(default)]
    pub imdb_id: Option<ImdbId>,
    /// Completed failed runs so far; 0 for a fresh task.
    #[serde(default)]
    pub attempt_count: u32,
    pub enqueued_at: DateTime<Utc>,
    pub event_type: EventType,
}

impl LabelTask {
    pub fn from_event(event: &MovieEvent) -> Self {
        Self {
            id: TaskId::new(),
            rating_key: event.rating_key().clone(),
            imdb_id: event.imdb_id().cloned(),
            attempt_count: 0,
            enqueued_at: Utc::now(),
            event_type: event.event_type(),
        }
    }

    /// 1-based number of the run about to happen.
    pub fn attempt(&self) -> u32 {
        self.attempt_count + 1
    }

    /// Copy re-queued after a transient failure.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt_count: self.attempt_count + 1,
            enqueued_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Lifecycle of a single [`LabelTask`] execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Fetching,
    Mapping,
    Applying,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }

    /// Whether `self -> next` is a legal edge of the state machine.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Fetching)
                | (Fetching, Mapping)
                | (Fetching, Pending)
                | (Fetching, Failed)
                | (Mapping, Applying)
                | (Mapping, Succeeded)
                | (Mapping, Failed)
                | (Applying, Succeeded)
                | (Applying, Pending)
                | (Applying, Failed)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Pending => "pending",
            TaskState::Fetching => "fetching",
            TaskState::Mapping => "mapping",
            TaskState::Applying => "applying",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_attempt_keeps_identity() {
        let event = MovieEvent::new_movie(RatingKey::parse("1").unwrap(), None);
        let task = LabelTask::from_event(&event);
        assert_eq!(task.attempt(), 1);

        let retried = task.next_attempt();
        assert_eq!(retried.id, task.id);
        assert_eq!(retried.attempt_count, 1);
        assert_eq!(retried.attempt(), 2);
    }

    #[test]
    fn state_machine_edges() {
        assert!(TaskState::Pending.can_transition_to(TaskState::Fetching));
        assert!(TaskState::Applying.can_transition_to(TaskState::Pending));
        assert!(!TaskState::Pending.can_transition_to(TaskState::Applying));
        assert!(!TaskState::Succeeded.can_transition_to(TaskState::Fetching));
        assert!(TaskState::Failed.is_terminal());
    }

    #[test]
    fn task_round_trips_through_json() {
        let event = MovieEvent::manual_update(
            RatingKey::parse("789").unwrap(),
            Some(ImdbId::parse("tt0111161").unwrap()),
        )
        .unwrap();
        let task = LabelTask::from_event(&event);
        let raw = serde_json::to_string(&task).unwrap();
        let parsed: LabelTask = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, task);
    }
}
