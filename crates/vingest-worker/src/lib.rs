//! Background worker for video upsert jobs.
//!
//! This crate provides:
//! - Job executor pulling from the Redis queue into a bounded pool
//! - The per-record upsert loop with progress emission
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod processor;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobExecutor, ProcessingContext};
pub use processor::{upsert_videos, ProgressSink, QueueProgress, RecordOutcome};
