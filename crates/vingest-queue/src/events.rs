//! Queue lifecycle events via Redis Pub/Sub.

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use vingest_models::JobName;

use crate::error::QueueResult;

/// Pub/Sub channel carrying every queue lifecycle event.
pub const EVENTS_CHANNEL: &str = "vingest:events";

/// Lifecycle transition observed on the queue or a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// Job accepted onto the queue
    Added { job: JobName },
    /// Job claimed by a worker
    Started { job: JobName },
    /// Progress persisted for a running job
    Progress { job: JobName, percent: u8 },
    /// Job finished normally
    Completed { job: JobName },
    /// Job terminated abnormally
    Failed { job: JobName, error: String },
    /// One record in a batch failed to upsert; the job keeps going
    RecordFailed {
        job: JobName,
        record_id: String,
        error: String,
    },
    /// Queue empty and no jobs in flight
    Drained,
    /// Queue backend failure observed by a worker
    QueueError { error: String },
}

/// Publisher/subscriber for queue lifecycle events.
///
/// Emission is observational: every event is logged, publish failures are
/// swallowed, and nothing here may alter a processing outcome.
#[derive(Clone)]
pub struct EventChannel {
    client: redis::Client,
}

impl EventChannel {
    /// Create a new event channel.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Emit one lifecycle event.
    pub async fn emit(&self, event: QueueEvent) {
        log_event(&event);

        if let Err(e) = self.publish(&event).await {
            debug!("Failed to publish queue event: {}", e);
        }
    }

    async fn publish(&self, event: &QueueEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(event)?;
        conn.publish::<_, _, ()>(EVENTS_CHANNEL, payload).await?;
        Ok(())
    }

    /// Subscribe to lifecycle events.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe(
        &self,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = QueueEvent> + Send>>> {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(EVENTS_CHANNEL).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}

fn log_event(event: &QueueEvent) {
    match event {
        QueueEvent::Added { job } => info!("[ADDED] Job {} added", job),
        QueueEvent::Started { job } => info!("[STARTED] Job {} has been started", job),
        QueueEvent::Progress { job, percent } => {
            debug!("[PROGRESS] Job {} is {}% complete", job, percent)
        }
        QueueEvent::Completed { job } => info!("[COMPLETED] Job {} has been completed", job),
        QueueEvent::Failed { job, error } => {
            error!("[FAILED] Job {} has failed: {}", job, error)
        }
        QueueEvent::RecordFailed {
            job,
            record_id,
            error,
        } => warn!(
            "[RECORD_FAILED] Job {}: error upserting video {}: {}",
            job, record_id, error
        ),
        QueueEvent::Drained => info!("[DRAINED] Waiting for jobs..."),
        QueueEvent::QueueError { error } => {
            error!("[ERROR] An error occurred on the queue: {}", error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_event_serde_tags() {
        let event = QueueEvent::Progress {
            job: JobName::for_job_id("abc"),
            percent: 50,
        };

        let value = serde_json::to_value(&event).expect("serialize QueueEvent");
        assert_eq!(value["event"], "progress");
        assert_eq!(value["job"], "upsertVideos-abc");
        assert_eq!(value["percent"], 50);

        let decoded: QueueEvent = serde_json::from_value(value).expect("deserialize QueueEvent");
        assert!(matches!(decoded, QueueEvent::Progress { percent: 50, .. }));
    }
}
