//! Queue payload for video upsert jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vingest_models::{JobName, VideoRecord};

/// Job carrying one batch of video records to upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertVideosJob {
    /// Derived queue name, `upsertVideos-…`
    pub name: JobName,
    /// Owning channel for composite submissions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Records in processing order
    pub videos: Vec<VideoRecord>,
    /// When the job was accepted
    pub enqueued_at: DateTime<Utc>,
}

impl UpsertVideosJob {
    /// Job addressed by an explicit job id.
    pub fn for_job_id(job_id: &str, videos: Vec<VideoRecord>) -> Self {
        Self {
            name: JobName::for_job_id(job_id),
            channel_id: None,
            videos,
            enqueued_at: Utc::now(),
        }
    }

    /// Job addressed by channel and date.
    pub fn for_channel_date(channel_id: &str, date: &str, videos: Vec<VideoRecord>) -> Self {
        Self {
            name: JobName::for_channel_date(channel_id, date),
            channel_id: Some(channel_id.to_string()),
            videos,
            enqueued_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upsert_videos_job_serde_roundtrip() {
        let job = UpsertVideosJob::for_channel_date(
            "c1",
            "2024-01-01",
            vec![VideoRecord {
                id: "v1".to_string(),
                channel_id: "c1".to_string(),
                snippet: json!({"title": "hello"}),
                status: json!({"privacyStatus": "public"}),
            }],
        );

        let encoded = serde_json::to_string(&job).expect("serialize UpsertVideosJob");
        let decoded: UpsertVideosJob =
            serde_json::from_str(&encoded).expect("deserialize UpsertVideosJob");

        assert_eq!(decoded.name, job.name);
        assert_eq!(decoded.channel_id.as_deref(), Some("c1"));
        assert_eq!(decoded.videos.len(), 1);
        assert_eq!(decoded.videos[0].id, "v1");
        assert_eq!(decoded.enqueued_at, job.enqueued_at);
    }

    #[test]
    fn job_names_follow_addressing_mode() {
        let explicit = UpsertVideosJob::for_job_id("abc", Vec::new());
        assert_eq!(explicit.name.as_str(), "upsertVideos-abc");
        assert_eq!(explicit.channel_id, None);

        let composite = UpsertVideosJob::for_channel_date("c1", "2024-01-01", Vec::new());
        assert_eq!(composite.name.as_str(), "upsertVideos-c1-2024-01-01");
    }
}
