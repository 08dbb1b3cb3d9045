//! Per-job processing routine.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use vingest_models::JobName;
use vingest_queue::{JobQueue, QueueEvent, UpsertVideosJob};
use vingest_store::VideoStore;

use crate::error::WorkerResult;

/// Where the processing loop reports progress and record failures.
///
/// Observational only: implementations must never fail the caller.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn progress(&self, job: &JobName, percent: u8);
    async fn record_failed(&self, job: &JobName, record_id: &str, error: &str);
}

/// Production sink writing through the queue.
pub struct QueueProgress {
    queue: Arc<JobQueue>,
}

impl QueueProgress {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl ProgressSink for QueueProgress {
    async fn progress(&self, job: &JobName, percent: u8) {
        if let Err(e) = self.queue.set_progress(job, percent).await {
            warn!("Failed to persist progress for job {}: {}", job, e);
        }
    }

    async fn record_failed(&self, job: &JobName, record_id: &str, error: &str) {
        self.queue
            .events()
            .emit(QueueEvent::RecordFailed {
                job: job.clone(),
                record_id: record_id.to_string(),
                error: error.to_string(),
            })
            .await;
    }
}

/// Outcome of one record's upsert attempt.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub record_id: String,
    pub error: Option<String>,
}

impl RecordOutcome {
    fn ok(record_id: &str) -> Self {
        Self {
            record_id: record_id.to_string(),
            error: None,
        }
    }

    fn failed(record_id: &str, error: String) -> Self {
        Self {
            record_id: record_id.to_string(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Upsert every record in the job's payload, in order.
///
/// A failed upsert is reported through the sink and skipped; it never aborts
/// the batch. The percentage written after the record at index `i` is
/// `i * 100 / n` — it counts the items done before this one, and only the
/// terminal transition reports 100.
pub async fn upsert_videos(
    store: &dyn VideoStore,
    sink: &dyn ProgressSink,
    job: &UpsertVideosJob,
) -> WorkerResult<Vec<RecordOutcome>> {
    let total = job.videos.len();
    let mut outcomes = Vec::with_capacity(total);

    for (i, video) in job.videos.iter().enumerate() {
        match store.upsert(video).await {
            Ok(()) => outcomes.push(RecordOutcome::ok(&video.id)),
            Err(e) => {
                sink.record_failed(&job.name, &video.id, &e.to_string()).await;
                outcomes.push(RecordOutcome::failed(&video.id, e.to_string()));
            }
        }

        sink.progress(&job.name, (i * 100 / total) as u8).await;
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::json;
    use vingest_models::VideoRecord;
    use vingest_store::{StoreError, StoreResult};

    /// Store that fails for configured record ids and remembers call order.
    struct FlakyStore {
        fail_ids: Vec<String>,
        seen: Mutex<Vec<String>>,
    }

    impl FlakyStore {
        fn failing(fail_ids: &[&str]) -> Self {
            Self {
                fail_ids: fail_ids.iter().map(|s| s.to_string()).collect(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VideoStore for FlakyStore {
        async fn upsert(&self, record: &VideoRecord) -> StoreResult<()> {
            self.seen.lock().unwrap().push(record.id.clone());
            if self.fail_ids.contains(&record.id) {
                Err(StoreError::RequestFailed("catalog returned 500".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        progress: Mutex<Vec<u8>>,
        failures: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProgressSink for RecordingSink {
        async fn progress(&self, _job: &JobName, percent: u8) {
            self.progress.lock().unwrap().push(percent);
        }

        async fn record_failed(&self, _job: &JobName, record_id: &str, _error: &str) {
            self.failures.lock().unwrap().push(record_id.to_string());
        }
    }

    fn video(id: &str) -> VideoRecord {
        VideoRecord {
            id: id.to_string(),
            channel_id: "c1".to_string(),
            snippet: json!({}),
            status: json!({}),
        }
    }

    #[tokio::test]
    async fn progress_counts_items_done_before_current() {
        let job = UpsertVideosJob::for_job_id(
            "abc",
            vec![video("v1"), video("v2"), video("v3"), video("v4")],
        );
        let store = FlakyStore::failing(&[]);
        let sink = RecordingSink::default();

        let outcomes = upsert_videos(&store, &sink, &job).await.unwrap();

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(RecordOutcome::is_ok));
        assert_eq!(*sink.progress.lock().unwrap(), vec![0, 25, 50, 75]);
    }

    #[tokio::test]
    async fn empty_payload_writes_no_progress() {
        let job = UpsertVideosJob::for_job_id("abc", Vec::new());
        let store = FlakyStore::failing(&[]);
        let sink = RecordingSink::default();

        let outcomes = upsert_videos(&store, &sink, &job).await.unwrap();

        assert!(outcomes.is_empty());
        assert!(sink.progress.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_record_does_not_abort_batch() {
        let job =
            UpsertVideosJob::for_job_id("abc", vec![video("v1"), video("v2"), video("v3")]);
        let store = FlakyStore::failing(&["v2"]);
        let sink = RecordingSink::default();

        let outcomes = upsert_videos(&store, &sink, &job).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_ok());
        assert!(!outcomes[1].is_ok());
        assert!(outcomes[2].is_ok());
        assert_eq!(*store.seen.lock().unwrap(), vec!["v1", "v2", "v3"]);
        assert_eq!(*sink.failures.lock().unwrap(), vec!["v2"]);
        // Failure does not change the progress sequence either
        assert_eq!(*sink.progress.lock().unwrap(), vec![0, 33, 66]);
    }

    #[tokio::test]
    async fn outcome_carries_the_failure_detail() {
        let job = UpsertVideosJob::for_job_id("abc", vec![video("v1")]);
        let store = FlakyStore::failing(&["v1"]);
        let sink = RecordingSink::default();

        let outcomes = upsert_videos(&store, &sink, &job).await.unwrap();

        assert_eq!(outcomes[0].record_id, "v1");
        let error = outcomes[0].error.as_deref().expect("error detail");
        assert!(error.contains("catalog returned 500"));
    }
}
