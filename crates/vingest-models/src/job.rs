//! Job identity, state, and lookup models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name prefix shared by every video upsert job on the queue.
pub const UPSERT_JOB_PREFIX: &str = "upsertVideos-";

/// Queue-wide name of a job, derived from caller-supplied identity.
///
/// Two submissions deriving the same name are still two distinct queue
/// entries; nothing deduplicates by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobName(pub String);

impl JobName {
    /// Derive the name for an explicitly addressed submission.
    pub fn for_job_id(job_id: &str) -> Self {
        Self(format!("{}{}", UPSERT_JOB_PREFIX, job_id))
    }

    /// Derive the name for a channel/date composite submission.
    pub fn for_channel_date(channel_id: &str, date: &str) -> Self {
        Self(format!("{}{}-{}", UPSERT_JOB_PREFIX, channel_id, date))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this name belongs to the upsert job family.
    pub fn is_upsert_job(&self) -> bool {
        self.0.starts_with(UPSERT_JOB_PREFIX)
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job state in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting in queue
    #[default]
    Waiting,
    /// Job is being processed by a worker
    Active,
    /// Job completed (individual record failures do not change this)
    Completed,
    /// Job failed before its payload could be processed
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// Parse the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(JobState::Waiting),
            "active" => Some(JobState::Active),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Queue-persisted view of a job, as seen by pollers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    /// Derived queue name
    pub name: JobName,

    /// Current state
    pub state: JobState,

    /// Progress (0-100), monotonically non-decreasing per attempt
    pub progress: u8,

    /// When the job was accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enqueued_at: Option<DateTime<Utc>>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// How a caller addresses a job when polling.
///
/// Resolved to a single lookup strategy at the boundary so the queue only
/// ever sees one canonical resolution path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobLocator {
    /// Explicit key; resolved by exact name, then by prefix scan.
    Key(String),
    /// Channel/date composite; resolves to the fully derived name.
    ChannelDate { channel_id: String, date: String },
}

impl JobLocator {
    /// Locator for an explicit job key.
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }

    /// Locator for a channel/date composite.
    pub fn channel_date(channel_id: impl Into<String>, date: impl Into<String>) -> Self {
        Self::ChannelDate {
            channel_id: channel_id.into(),
            date: date.into(),
        }
    }

    /// The exact name this locator maps to.
    pub fn exact_name(&self) -> JobName {
        match self {
            JobLocator::Key(key) => JobName::for_job_id(key),
            JobLocator::ChannelDate { channel_id, date } => {
                JobName::for_channel_date(channel_id, date)
            }
        }
    }

    /// The prefix to scan when the exact name misses, if any.
    ///
    /// A bare key may be the leading part of a composite name, so it falls
    /// back to a prefix scan; a composite locator already names the job.
    pub fn scan_prefix(&self) -> Option<String> {
        match self {
            JobLocator::Key(key) => Some(format!("{}{}", UPSERT_JOB_PREFIX, key)),
            JobLocator::ChannelDate { .. } => None,
        }
    }
}
