//! Job queue using Redis Streams, with per-job status hashes for lookup.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use vingest_models::{JobLocator, JobName, JobRecord, JobState};

use crate::error::{QueueError, QueueResult};
use crate::events::{EventChannel, QueueEvent};
use crate::job::UpsertVideosJob;

/// How long a job's status hash survives before Redis reaps it.
/// An expired job is indistinguishable from one that never existed, and
/// pollers read both as complete.
pub const JOB_STATUS_TTL_SECS: i64 = 86_400;

/// Key prefix for per-job status hashes.
const JOB_KEY_PREFIX: &str = "vingest:job:";
/// List of recently enqueued job names, newest first.
const JOB_INDEX_KEY: &str = "vingest:job-index";
/// Upper bound on the lookup index length.
const JOB_INDEX_MAX: isize = 10_000;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Upper bound on prefix-scan lookups
    pub scan_limit: usize,
    /// Retention for job status hashes, seconds
    pub job_ttl_secs: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vingest:jobs".to_string(),
            consumer_group: "vingest:workers".to_string(),
            scan_limit: 200,
            job_ttl_secs: JOB_STATUS_TTL_SECS,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: std::env::var("QUEUE_STREAM")
                .unwrap_or_else(|_| "vingest:jobs".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "vingest:workers".to_string()),
            scan_limit: std::env::var("QUEUE_SCAN_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(200),
            job_ttl_secs: std::env::var("QUEUE_JOB_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(JOB_STATUS_TTL_SECS),
        }
    }
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
    events: EventChannel,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let events = EventChannel::new(&config.redis_url)?;
        Ok(Self {
            client,
            config,
            events,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Lifecycle event channel shared with workers.
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    fn job_key(&self, name: &JobName) -> String {
        format!("{}{}", JOB_KEY_PREFIX, name)
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // Create consumer group (ignore error if already exists)
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    "Consumer group already exists: {}",
                    self.config.consumer_group
                );
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Append a job to the durable queue. Returns the stream message id.
    ///
    /// Two submissions deriving the same name stay two distinct entries;
    /// the queue does not deduplicate by name.
    pub async fn enqueue(&self, job: &UpsertVideosJob) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;
        let status_key = self.job_key(&job.name);

        // Status hash first so a poll racing the stream write sees waiting/0.
        conn.hset_multiple::<_, _, _, ()>(
            &status_key,
            &[
                ("state", JobState::Waiting.as_str().to_string()),
                ("progress", "0".to_string()),
                ("enqueued_at", job.enqueued_at.to_rfc3339()),
            ],
        )
        .await?;
        conn.expire::<_, ()>(&status_key, self.config.job_ttl_secs)
            .await?;
        conn.lpush::<_, _, ()>(JOB_INDEX_KEY, job.name.as_str())
            .await?;
        conn.ltrim::<_, ()>(JOB_INDEX_KEY, 0, JOB_INDEX_MAX - 1)
            .await?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        info!(
            "Enqueued job {} with message ID {}",
            job.name, message_id
        );
        self.events
            .emit(QueueEvent::Added {
                job: job.name.clone(),
            })
            .await;

        Ok(message_id)
    }

    /// O(1) lookup by the exact derived name.
    pub async fn find_by_key(&self, name: &JobName) -> QueueResult<Option<JobRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let fields: HashMap<String, String> = conn.hgetall(self.job_key(name)).await?;
        Ok(record_from_fields(name.clone(), fields))
    }

    /// Scan the most recently enqueued names for one with the given prefix.
    ///
    /// Linear in `scan_limit`. Fine at the job volumes this queue targets;
    /// the ceiling to revisit before a secondary index becomes worth it.
    pub async fn find_by_prefix(
        &self,
        prefix: &str,
        scan_limit: usize,
    ) -> QueueResult<Option<JobRecord>> {
        if scan_limit == 0 {
            return Ok(None);
        }

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let names: Vec<String> = conn
            .lrange(JOB_INDEX_KEY, 0, scan_limit as isize - 1)
            .await?;

        for name in names {
            if name.starts_with(prefix) {
                return self.find_by_key(&JobName::from_string(name)).await;
            }
        }

        Ok(None)
    }

    /// Resolve a caller-facing locator to a job record.
    pub async fn resolve(&self, locator: &JobLocator) -> QueueResult<Option<JobRecord>> {
        if let Some(record) = self.find_by_key(&locator.exact_name()).await? {
            return Ok(Some(record));
        }

        if let Some(prefix) = locator.scan_prefix() {
            return self.find_by_prefix(&prefix, self.config.scan_limit).await;
        }

        Ok(None)
    }

    /// Persisted progress for a job.
    ///
    /// A job the queue no longer knows (already reaped, or never created)
    /// reads as fully complete rather than an error.
    pub async fn progress(&self, locator: &JobLocator) -> QueueResult<u8> {
        match self.resolve(locator).await? {
            Some(record) => Ok(record.progress),
            None => {
                debug!(
                    "Job {} not found, reporting complete",
                    locator.exact_name()
                );
                Ok(100)
            }
        }
    }

    /// Persist a progress value for a running job.
    pub async fn set_progress(&self, name: &JobName, percent: u8) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.hset::<_, _, _, ()>(self.job_key(name), "progress", percent.min(100))
            .await?;

        self.events
            .emit(QueueEvent::Progress {
                job: name.clone(),
                percent: percent.min(100),
            })
            .await;

        Ok(())
    }

    /// Transition a job to active.
    pub async fn mark_started(&self, name: &JobName) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.hset::<_, _, _, ()>(self.job_key(name), "state", JobState::Active.as_str())
            .await?;

        self.events
            .emit(QueueEvent::Started { job: name.clone() })
            .await;

        Ok(())
    }

    /// Transition a job to completed, forcing progress to 100.
    pub async fn mark_completed(&self, name: &JobName) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.hset_multiple::<_, _, _, ()>(
            &self.job_key(name),
            &[
                ("state", JobState::Completed.as_str().to_string()),
                ("progress", "100".to_string()),
            ],
        )
        .await?;

        self.events
            .emit(QueueEvent::Progress {
                job: name.clone(),
                percent: 100,
            })
            .await;
        self.events
            .emit(QueueEvent::Completed { job: name.clone() })
            .await;

        Ok(())
    }

    /// Transition a job to failed.
    pub async fn mark_failed(&self, name: &JobName, error: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.hset_multiple::<_, _, _, ()>(
            &self.job_key(name),
            &[
                ("state", JobState::Failed.as_str().to_string()),
                ("error", error.to_string()),
            ],
        )
        .await?;

        self.events
            .emit(QueueEvent::Failed {
                job: name.clone(),
                error: error.to_string(),
            })
            .await;

        Ok(())
    }

    /// Acknowledge a finished job and drop it from the stream.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged job message: {}", message_id);
        Ok(())
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Consume jobs from the queue.
    /// Returns a list of (message_id, job) pairs newly delivered to this
    /// consumer.
    ///
    /// A payload that no longer deserializes is a type error before the
    /// processing loop: the job is marked failed when its name is still
    /// recoverable, then acked so it is not redelivered.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, UpsertVideosJob)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();

        for stream_key in result.keys {
            for entry in stream_key.ids {
                let message_id = entry.id.clone();

                let Some(redis::Value::BulkString(payload)) = entry.map.get("job") else {
                    warn!("Stream entry {} has no job payload", message_id);
                    self.ack(&message_id).await.ok();
                    continue;
                };

                let payload = String::from_utf8_lossy(payload);
                match serde_json::from_str::<UpsertVideosJob>(&payload) {
                    Ok(job) => {
                        debug!("Consumed job {} from stream", job.name);
                        jobs.push((message_id, job));
                    }
                    Err(e) => {
                        warn!("Failed to parse job payload: {}", e);
                        if let Some(name) = name_from_raw(&payload) {
                            self.mark_failed(&name, &format!("malformed payload: {}", e))
                                .await
                                .ok();
                        }
                        self.ack(&message_id).await.ok();
                    }
                }
            }
        }

        Ok(jobs)
    }
}

/// Best-effort name extraction from a payload that failed to deserialize.
fn name_from_raw(payload: &str) -> Option<JobName> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    value.get("name")?.as_str().map(JobName::from_string)
}

fn record_from_fields(name: JobName, fields: HashMap<String, String>) -> Option<JobRecord> {
    if fields.is_empty() {
        return None;
    }

    let state = fields
        .get("state")
        .and_then(|s| JobState::parse(s))
        .unwrap_or_default();
    let progress = fields
        .get("progress")
        .and_then(|p| p.parse().ok())
        .unwrap_or(0);
    let enqueued_at = fields
        .get("enqueued_at")
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));
    let error = fields.get("error").cloned();

    Some(JobRecord {
        name,
        state,
        progress,
        enqueued_at,
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_hash_is_no_record() {
        let name = JobName::for_job_id("abc");
        assert!(record_from_fields(name, HashMap::new()).is_none());
    }

    #[test]
    fn record_fields_parse() {
        let name = JobName::for_job_id("abc");
        let mut fields = HashMap::new();
        fields.insert("state".to_string(), "active".to_string());
        fields.insert("progress".to_string(), "50".to_string());
        fields.insert("enqueued_at".to_string(), Utc::now().to_rfc3339());

        let record = record_from_fields(name, fields).expect("record");
        assert_eq!(record.state, JobState::Active);
        assert_eq!(record.progress, 50);
        assert!(record.enqueued_at.is_some());
        assert!(record.error.is_none());
    }

    #[test]
    fn garbled_fields_fall_back_to_defaults() {
        let name = JobName::for_job_id("abc");
        let mut fields = HashMap::new();
        fields.insert("state".to_string(), "bogus".to_string());
        fields.insert("progress".to_string(), "many".to_string());

        let record = record_from_fields(name, fields).expect("record");
        assert_eq!(record.state, JobState::Waiting);
        assert_eq!(record.progress, 0);
    }

    #[test]
    fn name_recovered_from_raw_payload() {
        let name = name_from_raw(r#"{"name": "upsertVideos-abc", "videos": 42}"#);
        assert_eq!(name, Some(JobName::for_job_id("abc")));
        assert_eq!(name_from_raw("not json"), None);
        assert_eq!(name_from_raw(r#"{"videos": []}"#), None);
    }
}
