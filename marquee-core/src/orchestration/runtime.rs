use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;

use super::{
    config::{LeaseConfig, WorkerConfig},
    job::TaskState,
    lease::{DequeueRequest, TaskLease},
    queue::QueueService,
    update_task::{LabelPipeline, TaskOutcome},
};

/// Summary of one processed lease, returned by [`WorkerPool::process_next`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessedTask {
    pub task_id: crate::types::TaskId,
    pub attempt: u32,
    pub state: TaskState,
}

/// Runs `concurrency` worker loops plus a lease housekeeper against a queue.
///
/// Shutdown stops claiming new work; a task already claimed runs to
/// completion and reports its outcome.
#[derive(Clone)]
pub struct WorkerPool {
    queue: Arc<dyn QueueService>,
    pipeline: Arc<LabelPipeline>,
    workers: WorkerConfig,
    lease: LeaseConfig,
    group: String,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("queue", &std::any::type_name_of_val(self.queue.as_ref()))
            .field("pipeline", &self.pipeline)
            .field("workers", &self.workers)
            .field("lease", &self.lease)
            .field("group", &self.group)
            .finish()
    }
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn QueueService>,
        pipeline: Arc<LabelPipeline>,
        workers: WorkerConfig,
        lease: LeaseConfig,
    ) -> Self {
        Self {
            queue,
            pipeline,
            workers,
            lease,
            group: format!("labels-{}", std::process::id()),
        }
    }

    /// Spawns worker loops and the housekeeper; they exit once `shutdown`
    /// is cancelled.
    pub fn spawn(&self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.workers.concurrency + 1);
        for i in 0..self.workers.concurrency.max(1) {
            let worker_id = format!("{}-w{i}", self.group);
            let pool = self.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                pool.worker_loop(worker_id, shutdown).await;
            }));
        }
        handles.push(self.spawn_housekeeper(shutdown));
        info!(
            workers = self.workers.concurrency.max(1),
            "label worker pool started"
        );
        handles
    }

    async fn worker_loop(&self, worker_id: String, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                info!(worker = %worker_id, "worker shutting down");
                break;
            }

            match self.process_next(&worker_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(self.workers.idle_poll()) => {}
                    }
                }
                Err(err) => {
                    error!(worker = %worker_id, error = %err, "queue dequeue failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(self.workers.error_backoff()) => {}
                    }
                }
            }
        }
    }

    fn spawn_housekeeper(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let interval = self.lease.housekeeper_interval();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        match queue.scan_expired_leases().await {
                            Ok(0) => {}
                            Ok(reclaimed) => {
                                warn!(reclaimed, "returned expired leases to the ready queue");
                            }
                            Err(err) => {
                                error!(error = %err, "expired lease scan failed");
                            }
                        }
                    }
                }
            }
        })
    }

    /// Claims and fully processes one task. `Ok(None)` means the queue had
    /// nothing ready.
    pub async fn process_next(
        &self,
        worker_id: &str,
    ) -> Result<Option<ProcessedTask>> {
        let request = DequeueRequest {
            worker_id: worker_id.to_string(),
            lease_ttl: self.lease.ttl(),
        };
        let Some(lease) = self.queue.dequeue(request).await? else {
            return Ok(None);
        };

        let task_id = lease.task.id;
        let attempt = lease.task.attempt();
        debug!(
            worker = %worker_id,
            task_id = %task_id,
            rating_key = %lease.task.rating_key,
            attempt,
            "claimed task"
        );

        let renewer = self.spawn_renewer(lease.clone());
        let outcome = self.pipeline.execute(lease.task.clone()).await;
        renewer.cancel();

        let state = outcome.final_state();
        self.report(&lease, outcome).await?;

        Ok(Some(ProcessedTask {
            task_id,
            attempt,
            state,
        }))
    }

    async fn report(&self, lease: &TaskLease, outcome: TaskOutcome) -> Result<()> {
        match outcome {
            TaskOutcome::Succeeded { .. } => self.queue.complete(lease).await,
            TaskOutcome::Retry { delay, .. } => self.queue.retry(lease, delay).await,
            TaskOutcome::Failed { error } => {
                self.queue.dead_letter(lease, &error).await
            }
        }
    }

    /// Keeps the lease alive while the task runs. Cancelled through the
    /// returned token.
    fn spawn_renewer(&self, mut lease: TaskLease) -> CancellationToken {
        let stop = CancellationToken::new();
        let queue = Arc::clone(&self.queue);
        let every = self.lease.renew_interval();
        let ttl = self.lease.ttl();
        let token = stop.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(every) => {
                        match queue.renew(&mut lease, ttl).await {
                            Ok(true) => {}
                            Ok(false) => {
                                warn!(task_id = %lease.task.id, "lease lost while task was running");
                                break;
                            }
                            Err(err) => {
                                warn!(task_id = %lease.task.id, error = %err, "lease renewal failed");
                            }
                        }
                    }
                }
            }
        });
        stop
    }
}
