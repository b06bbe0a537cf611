use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::catalog::CatalogClient;
use crate::error::LabelError;
use crate::labels::{LabelMapper, LabelSet};
use crate::providers::KeywordProvider;
use crate::types::ImdbId;

use super::{
    job::{LabelTask, TaskState},
    retry::RetryPolicy,
};

/// Collaborators shared by every task execution.
#[derive(Clone)]
pub struct LabelPipeline {
    provider: Arc<dyn KeywordProvider>,
    catalog: Arc<dyn CatalogClient>,
    mapper: LabelMapper,
    retry: RetryPolicy,
}

impl fmt::Debug for LabelPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelPipeline")
            .field("provider", &std::any::type_name_of_val(self.provider.as_ref()))
            .field("catalog", &std::any::type_name_of_val(self.catalog.as_ref()))
            .field("mapper", &self.mapper)
            .field("retry", &self.retry)
            .finish()
    }
}

impl LabelPipeline {
    pub fn new(
        provider: Arc<dyn KeywordProvider>,
        catalog: Arc<dyn CatalogClient>,
        mapper: LabelMapper,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            catalog,
            mapper,
            retry,
        }
    }

    /// Runs one attempt of `task` to a terminal state or a retry decision.
    pub async fn execute(&self, task: LabelTask) -> TaskOutcome {
        UpdateTask::new(task).run(self).await
    }
}

/// Result of a single execution.
#[derive(Debug)]
pub enum TaskOutcome {
    Succeeded { labels: LabelSet },
    /// Transient failure with attempts left; run again after `delay`.
    Retry { delay: Duration, error: LabelError },
    Failed { error: LabelError },
}

impl TaskOutcome {
    pub fn final_state(&self) -> TaskState {
        match self {
            TaskOutcome::Succeeded { .. } => TaskState::Succeeded,
            TaskOutcome::Retry { .. } => TaskState::Pending,
            TaskOutcome::Failed { .. } => TaskState::Failed,
        }
    }
}

/// State machine for one execution of a [`LabelTask`].
///
/// `Pending → Fetching → Mapping → Applying → Succeeded | Failed`. A
/// retryable failure with attempts left sends the task back to `Pending`.
/// Each run computes the full label set from scratch.
#[derive(Debug)]
pub struct UpdateTask {
    task: LabelTask,
    state: TaskState,
    history: Vec<TaskState>,
}

impl UpdateTask {
    pub fn new(task: LabelTask) -> Self {
        Self {
            task,
            state: TaskState::Pending,
            history: vec![TaskState::Pending],
        }
    }

    pub fn task(&self) -> &LabelTask {
        &self.task
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Every state visited so far, starting with `Pending`.
    pub fn history(&self) -> &[TaskState] {
        &self.history
    }

    fn transition(&mut self, next: TaskState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {next}",
            self.state
        );
        debug!(from = %self.state, to = %next, "task state change");
        self.state = next;
        self.history.push(next);
    }

    #[instrument(
        skip_all,
        fields(
            task_id = %self.task.id,
            rating_key = %self.task.rating_key,
            attempt = self.task.attempt(),
        )
    )]
    pub async fn run(&mut self, pipeline: &LabelPipeline) -> TaskOutcome {
        self.transition(TaskState::Fetching);

        let imdb_id = match self.resolve_imdb_id(pipeline).await {
            Ok(imdb_id) => imdb_id,
            Err(err) => return self.handle_failure(err, pipeline),
        };

        let keywords = match pipeline.provider.fetch_keywords(&imdb_id).await {
            Ok(keywords) => keywords,
            Err(err) => return self.handle_failure(err, pipeline),
        };

        self.transition(TaskState::Mapping);
        let labels = match pipeline.mapper.map(&keywords) {
            Ok(labels) => labels,
            Err(err) => return self.handle_failure(err.into(), pipeline),
        };

        if labels.is_empty() {
            warn!(
                imdb_id = %imdb_id,
                keywords = keywords.len(),
                "no usable labels; leaving existing labels untouched"
            );
            self.transition(TaskState::Succeeded);
            return TaskOutcome::Succeeded { labels };
        }

        self.transition(TaskState::Applying);
        match pipeline
            .catalog
            .apply_labels(&self.task.rating_key, &labels)
            .await
        {
            Ok(()) => {
                self.transition(TaskState::Succeeded);
                info!(imdb_id = %imdb_id, labels = labels.len(), "labels updated");
                TaskOutcome::Succeeded { labels }
            }
            Err(err) => self.handle_failure(err, pipeline),
        }
    }

    async fn resolve_imdb_id(
        &self,
        pipeline: &LabelPipeline,
    ) -> Result<ImdbId, LabelError> {
        if let Some(imdb_id) = &self.task.imdb_id {
            return Ok(imdb_id.clone());
        }
        let entry = pipeline.catalog.get_entry(&self.task.rating_key).await?;
        debug!(title = %entry.title, "resolving IMDb id from catalog entry");
        entry.imdb_id.ok_or_else(|| {
            LabelError::NotFound(format!(
                "no IMDb guid on catalog entry {}",
                self.task.rating_key
            ))
        })
    }

    fn handle_failure(
        &mut self,
        err: LabelError,
        pipeline: &LabelPipeline,
    ) -> TaskOutcome {
        let attempt = self.task.attempt();
        let imdb_id = self
            .task
            .imdb_id
            .as_ref()
            .map(ImdbId::as_str)
            .unwrap_or("-");

        if err.is_retryable() && pipeline.retry.allows_retry(attempt) {
            let delay = pipeline.retry.delay_for(attempt);
            warn!(
                imdb_id,
                error = %err,
                kind = err.kind(),
                retry_in_ms = delay.as_millis() as u64,
                "transient failure, scheduling retry"
            );
            self.transition(TaskState::Pending);
            return TaskOutcome::Retry { delay, error: err };
        }

        if matches!(err, LabelError::Auth(_)) {
            error!(
                imdb_id,
                attempt_count = attempt,
                error = %err,
                kind = err.kind(),
                operator_attention = true,
                "catalog rejected credentials; task failed"
            );
        } else {
            error!(
                imdb_id,
                attempt_count = attempt,
                error = %err,
                kind = err.kind(),
                raw_payload = err.raw_payload(),
                "task failed"
            );
        }
        self.transition(TaskState::Failed);
        TaskOutcome::Failed { error: err }
    }
}
