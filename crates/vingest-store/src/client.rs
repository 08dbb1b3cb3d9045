//! Video catalog HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use vingest_models::VideoRecord;

use crate::error::{StoreError, StoreResult};

/// Configuration for the catalog store client.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of the catalog service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8100".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("VIDEO_STORE_URL")
                .unwrap_or_else(|_| "http://localhost:8100".to_string()),
            timeout: Duration::from_secs(
                std::env::var("VIDEO_STORE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

/// Insert-or-update access to the video catalog.
///
/// Re-invoking `upsert` with the same record yields the same stored state;
/// the worker relies on that when a batch is delivered more than once.
#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn upsert(&self, record: &VideoRecord) -> StoreResult<()>;
}

/// Client for the video catalog service.
pub struct HttpVideoStore {
    http: Client,
    config: StoreConfig,
}

impl HttpVideoStore {
    /// Create a new catalog client.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(StoreError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::new(StoreConfig::from_env())
    }
}

#[async_trait]
impl VideoStore for HttpVideoStore {
    async fn upsert(&self, record: &VideoRecord) -> StoreResult<()> {
        let url = format!("{}/videos/{}", self.config.base_url, record.id);
        let body = json!({
            "channelId": record.channel_id,
            "snippet": record.snippet,
            "status": record.status,
        });

        debug!("Upserting video {} to catalog", record.id);

        let response = self.http.put(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::RequestFailed(format!(
                "catalog returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}
