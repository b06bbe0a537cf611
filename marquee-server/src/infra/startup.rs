use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use marquee_config::{Config, QueueBackend};
use marquee_core::catalog::{CatalogClient, PlexCatalogClient};
use marquee_core::labels::LabelMapper;
use marquee_core::orchestration::{
    InMemoryQueue, LabelPipeline, QueueService, RedisQueue, RuntimeConfig,
    WorkerPool,
};
use marquee_core::providers::{ImdbKeywordProvider, KeywordProvider};
use marquee_core::rate_limit::SlidingWindowLimiter;

use crate::AppState;

/// Long-lived services shared by the HTTP layer and the worker pool.
#[derive(Clone)]
pub struct Components {
    pub queue: Arc<dyn QueueService>,
    pub catalog: Arc<dyn CatalogClient>,
    pub pipeline: Arc<LabelPipeline>,
    pub runtime: RuntimeConfig,
}

impl std::fmt::Debug for Components {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Components")
            .field("pipeline", &self.pipeline)
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

impl Components {
    pub async fn build(config: &Config) -> anyhow::Result<Self> {
        let queue = connect_queue(config).await?;
        let runtime = config.runtime_config();

        let catalog: Arc<dyn CatalogClient> = Arc::new(
            PlexCatalogClient::new(config.plex_config())
                .context("failed to build Plex client")?,
        );

        let limiter = Arc::new(SlidingWindowLimiter::new(config.rate_limit_rule()));
        let provider: Arc<dyn KeywordProvider> = Arc::new(
            ImdbKeywordProvider::new(config.imdb_config(), limiter)
                .context("failed to build IMDb client")?,
        );

        let pipeline = Arc::new(LabelPipeline::new(
            provider,
            Arc::clone(&catalog),
            LabelMapper::new(config.label_rules()),
            runtime.retry,
        ));

        Ok(Self {
            queue,
            catalog,
            pipeline,
            runtime,
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(Arc::clone(&self.queue), Arc::clone(&self.catalog))
    }

    pub fn worker_pool(&self) -> WorkerPool {
        WorkerPool::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.pipeline),
            self.runtime.workers,
            self.runtime.lease,
        )
    }
}

async fn connect_queue(config: &Config) -> anyhow::Result<Arc<dyn QueueService>> {
    match config.queue.backend {
        QueueBackend::Redis => {
            let redis_config = config.redis_queue_config();
            let queue = RedisQueue::connect(&redis_config)
                .await
                .with_context(|| {
                    format!("failed to connect to Redis at {}", redis_config.url)
                })?;
            info!(prefix = %redis_config.prefix, "connected to Redis task queue");
            Ok(Arc::new(queue))
        }
        QueueBackend::Memory => {
            warn!("using in-memory task queue; pending tasks are lost on exit");
            Ok(Arc::new(InMemoryQueue::new()))
        }
    }
}
