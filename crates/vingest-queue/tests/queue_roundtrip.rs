//! Redis/Queue integration tests.

use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use vingest_models::{JobLocator, JobState, VideoRecord};
use vingest_queue::{JobQueue, QueueEvent, UpsertVideosJob};

fn video(id: &str) -> VideoRecord {
    VideoRecord {
        id: id.to_string(),
        channel_id: "c1".to_string(),
        snippet: json!({"title": id}),
        status: json!({"privacyStatus": "public"}),
    }
}

fn queue() -> JobQueue {
    dotenvy::dotenv().ok();
    JobQueue::from_env().expect("Failed to create queue")
}

/// Test Redis connection and basic operations.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_connection() {
    let queue = queue();
    queue.init().await.expect("Failed to initialize queue");

    let len = queue.len().await.expect("Failed to get queue length");
    println!("Queue length: {}", len);
}

/// Test job enqueue and dequeue cycle.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_job_enqueue_dequeue() {
    let queue = queue();
    queue.init().await.expect("Failed to initialize queue");

    let job = UpsertVideosJob::for_job_id(&Uuid::new_v4().to_string(), vec![video("v1")]);
    let name = job.name.clone();

    let message_id = queue.enqueue(&job).await.expect("Failed to enqueue");
    println!("Enqueued job {} with message ID {}", name, message_id);

    let jobs = queue
        .consume("test-consumer", 1000, 10)
        .await
        .expect("Failed to consume");

    let (msg_id, consumed) = jobs
        .iter()
        .find(|(_, j)| j.name == name)
        .expect("enqueued job should be delivered");
    assert_eq!(consumed.videos.len(), 1);

    queue.ack(msg_id).await.expect("Failed to ack");
}

/// Enqueueing persists a waiting/0 status hash immediately.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_sets_waiting_status() {
    let queue = queue();
    queue.init().await.expect("Failed to initialize queue");

    let job = UpsertVideosJob::for_job_id(&Uuid::new_v4().to_string(), vec![video("v1")]);
    queue.enqueue(&job).await.expect("Failed to enqueue");

    let record = queue
        .find_by_key(&job.name)
        .await
        .expect("Failed to look up job")
        .expect("job should be found by exact key");

    assert_eq!(record.state, JobState::Waiting);
    assert_eq!(record.progress, 0);
    assert!(record.enqueued_at.is_some());
}

/// Progress writes and terminal transitions are visible to pollers.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_progress_lifecycle() {
    let queue = queue();
    queue.init().await.expect("Failed to initialize queue");

    let key = Uuid::new_v4().to_string();
    let job = UpsertVideosJob::for_job_id(&key, vec![video("v1"), video("v2")]);
    queue.enqueue(&job).await.expect("Failed to enqueue");

    queue
        .mark_started(&job.name)
        .await
        .expect("Failed to mark started");
    queue
        .set_progress(&job.name, 50)
        .await
        .expect("Failed to set progress");

    let locator = JobLocator::key(&key);
    assert_eq!(queue.progress(&locator).await.expect("progress"), 50);

    queue
        .mark_completed(&job.name)
        .await
        .expect("Failed to mark completed");

    let record = queue
        .find_by_key(&job.name)
        .await
        .expect("lookup")
        .expect("job should still exist");
    assert_eq!(record.state, JobState::Completed);
    assert_eq!(record.progress, 100);
}

/// A composite-named job is found by polling with the bare channel key.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_prefix_lookup_finds_composite_job() {
    let queue = queue();
    queue.init().await.expect("Failed to initialize queue");

    let channel = format!("chan-{}", Uuid::new_v4());
    let job = UpsertVideosJob::for_channel_date(&channel, "2024-01-01", vec![video("v1")]);
    queue.enqueue(&job).await.expect("Failed to enqueue");

    let record = queue
        .resolve(&JobLocator::key(&channel))
        .await
        .expect("Failed to resolve")
        .expect("bare key should prefix-match the composite name");

    assert_eq!(record.name, job.name);
}

/// Polling an unknown identifier reports complete, never an error.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_missing_job_reads_as_complete() {
    let queue = queue();

    let locator = JobLocator::key(&format!("never-{}", Uuid::new_v4()));
    assert_eq!(queue.progress(&locator).await.expect("progress"), 100);
}

/// Lifecycle events are delivered over pub/sub.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_event_pubsub() {
    use futures_util::StreamExt;

    let queue = queue();
    queue.init().await.expect("Failed to initialize queue");

    let mut stream = queue
        .events()
        .subscribe()
        .await
        .expect("Failed to subscribe");

    let job = UpsertVideosJob::for_job_id(&Uuid::new_v4().to_string(), vec![video("v1")]);
    let name = job.name.clone();
    queue.enqueue(&job).await.expect("Failed to enqueue");

    // Other tests may be publishing on the same channel; wait for our own.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let event = tokio::time::timeout_at(deadline, stream.next())
            .await
            .expect("timed out waiting for event")
            .expect("event stream ended");

        if let QueueEvent::Added { job } = &event {
            if *job == name {
                break;
            }
        }
    }
}
