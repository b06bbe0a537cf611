//! Durable task queue and the worker runtime that drives label updates.

pub mod config;
pub mod job;
pub mod lease;
pub mod memory;
pub mod queue;
pub mod redis_queue;
pub mod retry;
pub mod runtime;
pub mod update_task;

pub use config::{LeaseConfig, RuntimeConfig, WorkerConfig};
pub use job::{LabelTask, TaskState};
pub use lease::{DeadLetter, DequeueRequest, LeaseId, TaskLease};
pub use memory::InMemoryQueue;
pub use queue::{QueueDepth, QueueService};
pub use redis_queue::{QueueKeys, RedisQueue, RedisQueueConfig};
pub use retry::RetryPolicy;
pub use runtime::{ProcessedTask, WorkerPool};
pub use update_task::{LabelPipeline, TaskOutcome, UpdateTask};
