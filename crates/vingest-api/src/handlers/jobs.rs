//! Job submission and progress polling handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use vingest_models::{JobLocator, VideoRecord};
use vingest_queue::UpsertVideosJob;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Submission body; exactly one addressing mode must be present.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub videos: Option<Vec<VideoRecord>>,
}

#[derive(Serialize)]
pub struct CreateJobResponse {
    /// Derived queue name; composite-mode callers can poll with it
    pub job: String,
}

/// Progress poll parameters; mirrors the submission addressing modes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressQuery {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Serialize)]
pub struct ProgressResponse {
    pub progress: u8,
}

/// Accept a batch of video records and enqueue it for background upserting.
///
/// Returns as soon as the job is durable; processing happens in the worker.
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<CreateJobResponse>)> {
    let job = build_job(request)?;

    info!(
        "Accepting job {} with {} videos",
        job.name,
        job.videos.len()
    );

    state.queue.enqueue(&job).await?;
    metrics::record_job_enqueued();

    Ok((
        StatusCode::OK,
        Json(CreateJobResponse {
            job: job.name.to_string(),
        }),
    ))
}

/// Report persisted progress for a job.
///
/// An unknown or already-reaped job reads as `{"progress": 100}`.
pub async fn get_progress(
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> ApiResult<Json<ProgressResponse>> {
    let locator = build_locator(query)?;
    let progress = state.queue.progress(&locator).await?;

    Ok(Json(ProgressResponse { progress }))
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

/// Validate a submission and derive its queue job.
/// Rejection happens here, before any queue interaction.
fn build_job(request: CreateJobRequest) -> Result<UpsertVideosJob, ApiError> {
    let videos = request
        .videos
        .ok_or_else(|| ApiError::validation("videos is required"))?;

    if let Some(job_id) = present(request.job_id.as_deref()) {
        return Ok(UpsertVideosJob::for_job_id(job_id, videos));
    }

    match (
        present(request.channel_id.as_deref()),
        present(request.date.as_deref()),
    ) {
        (Some(channel_id), Some(date)) => {
            Ok(UpsertVideosJob::for_channel_date(channel_id, date, videos))
        }
        _ => Err(ApiError::validation(
            "jobId or channelId and date are required",
        )),
    }
}

/// Resolve poll parameters to a single lookup strategy.
fn build_locator(query: ProgressQuery) -> Result<JobLocator, ApiError> {
    if let Some(job_id) = present(query.job_id.as_deref()) {
        return Ok(JobLocator::key(job_id));
    }

    match (
        present(query.channel_id.as_deref()),
        present(query.date.as_deref()),
    ) {
        (Some(channel_id), Some(date)) => Ok(JobLocator::channel_date(channel_id, date)),
        _ => Err(ApiError::validation(
            "jobId or channelId and date are required",
        )),
    }
}
