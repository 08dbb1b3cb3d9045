//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vingest_queue::{JobQueue, QueueEvent, UpsertVideosJob};
use vingest_store::{HttpVideoStore, VideoStore};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::processor::{upsert_videos, QueueProgress};

/// Everything a job needs while being processed.
pub struct ProcessingContext {
    pub store: Arc<dyn VideoStore>,
    pub sink: QueueProgress,
}

impl ProcessingContext {
    /// Create a new processing context.
    pub fn new(queue: Arc<JobQueue>) -> WorkerResult<Self> {
        let store = HttpVideoStore::from_env()?;

        Ok(Self {
            store: Arc::new(store),
            sink: QueueProgress::new(queue),
        })
    }
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, queue: JobQueue) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        // Initialize queue
        self.queue.init().await?;

        // Create processing context
        let ctx = Arc::new(ProcessingContext::new(Arc::clone(&self.queue))?);

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut idle = false;

        // Main job consumption loop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs(&ctx) => {
                    match result {
                        Ok(0) => {
                            let all_free = self.job_semaphore.available_permits()
                                == self.config.max_concurrent_jobs;
                            if !idle && all_free {
                                self.queue.events().emit(QueueEvent::Drained).await;
                                idle = true;
                            }
                        }
                        Ok(_) => {
                            idle = false;
                        }
                        Err(e) => {
                            self.queue
                                .events()
                                .emit(QueueEvent::QueueError {
                                    error: e.to_string(),
                                })
                                .await;
                            // Back off on error
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        // Wait for in-flight jobs to complete
        info!("Waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs()).await;

        info!("Job executor stopped");
        Ok(())
    }

    /// Consume and dispatch jobs from the queue. Returns how many were claimed.
    async fn consume_jobs(&self, ctx: &Arc<ProcessingContext>) -> WorkerResult<usize> {
        // Acquire semaphore permit before consuming
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(0);
        }

        let jobs = self
            .queue
            .consume(
                &self.consumer_name,
                self.config.poll_block.as_millis() as u64,
                available.min(self.config.poll_batch),
            )
            .await?;

        let claimed = jobs.len();
        if claimed > 0 {
            debug!("Consumed {} jobs from queue", claimed);
        }

        for (message_id, job) in jobs {
            let ctx = Arc::clone(ctx);
            let queue = Arc::clone(&self.queue);
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, message_id, job).await;
            });
        }

        Ok(claimed)
    }

    /// Run one claimed job to its terminal state and ack it.
    async fn execute_job(
        ctx: Arc<ProcessingContext>,
        queue: Arc<JobQueue>,
        message_id: String,
        job: UpsertVideosJob,
    ) {
        // Other job families may share this stream; only ours is processed
        if !job.name.is_upsert_job() {
            debug!("Ignoring job {} outside the upsert family", job.name);
            if let Err(e) = queue.ack(&message_id).await {
                error!("Failed to ack ignored job {}: {}", job.name, e);
            }
            return;
        }

        info!("Executing job {} with {} videos", job.name, job.videos.len());

        if let Err(e) = queue.mark_started(&job.name).await {
            warn!("Failed to mark job {} started: {}", job.name, e);
        }

        let result = upsert_videos(ctx.store.as_ref(), &ctx.sink, &job).await;

        match result {
            Ok(outcomes) => {
                let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
                info!(
                    "Job {} finished: {} records, {} failed upserts",
                    job.name,
                    outcomes.len(),
                    failed
                );

                counter!("vingest_jobs_completed_total").increment(1);
                counter!("vingest_records_upserted_total")
                    .increment((outcomes.len() - failed) as u64);
                if failed > 0 {
                    counter!("vingest_record_failures_total").increment(failed as u64);
                }

                if let Err(e) = queue.mark_completed(&job.name).await {
                    error!("Failed to mark job {} completed: {}", job.name, e);
                }
            }
            Err(e) => {
                error!("Job {} failed: {}", job.name, e);
                counter!("vingest_jobs_failed_total").increment(1);

                if let Err(mark_err) = queue.mark_failed(&job.name, &e.to_string()).await {
                    error!("Failed to mark job {} failed: {}", job.name, mark_err);
                }
            }
        }

        // Terminal either way; the queue never redelivers a finished job
        if let Err(e) = queue.ack(&message_id).await {
            error!("Failed to ack job {}: {}", job.name, e);
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
