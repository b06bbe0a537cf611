use std::{fmt, sync::Arc};

use marquee_core::catalog::CatalogClient;
use marquee_core::ingest::LabelEnqueuer;
use marquee_core::orchestration::QueueService;

#[derive(Clone)]
pub struct AppState {
    queue: Arc<dyn QueueService>,
    catalog: Arc<dyn CatalogClient>,
    enqueuer: LabelEnqueuer,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        queue: Arc<dyn QueueService>,
        catalog: Arc<dyn CatalogClient>,
    ) -> Self {
        let enqueuer = LabelEnqueuer::new(Arc::clone(&queue));
        Self {
            queue,
            catalog,
            enqueuer,
        }
    }

    pub fn queue(&self) -> &Arc<dyn QueueService> {
        &self.queue
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogClient> {
        &self.catalog
    }

    pub fn enqueuer(&self) -> &LabelEnqueuer {
        &self.enqueuer
    }
}
