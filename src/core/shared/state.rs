use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::scheduling::{SchedulingService, SchedulingStore};

/// Shared handler state, generic over the storage backend.
pub struct AppState<S> {
    pub scheduling: Arc<SchedulingService<S>>,
    pub started_at: DateTime<Utc>,
}

impl<S: SchedulingStore> AppState<S> {
    pub fn new(store: Arc<S>, config: AppConfig) -> Self {
        Self {
            scheduling: Arc::new(SchedulingService::new(store, config)),
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        self.scheduling.config()
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            scheduling: Arc::clone(&self.scheduling),
            started_at: self.started_at,
        }
    }
}

impl<S> std::fmt::Debug for AppState<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("scheduling", &"Arc<SchedulingService>")
            .field("started_at", &self.started_at)
            .finish()
    }
}
