//! Redis-backed job queue for video upsert batches.
//!
//! This crate provides:
//! - Durable job enqueueing via Redis Streams
//! - Worker consumption through a consumer group
//! - Per-job progress persistence and lookup (exact key or name prefix)
//! - Lifecycle events via Redis Pub/Sub

pub mod error;
pub mod events;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use events::{EventChannel, QueueEvent, EVENTS_CHANNEL};
pub use job::UpsertVideosJob;
pub use queue::{JobQueue, QueueConfig, JOB_STATUS_TTL_SECS};
