//! Application state.

use std::sync::Arc;

use vingest_queue::JobQueue;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub queue: Arc<JobQueue>,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let queue = JobQueue::from_env()?;

        Ok(Self {
            config,
            queue: Arc::new(queue),
        })
    }
}
