//! Identification HTTP routes.
//!
//! Provides endpoints for:
//! - Submitting a source URL (immediate cache hit or queued task)
//! - Polling a task by ID
//! - Trending songs statistics

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::identify::models::{SongRecord, TaskRecord, TaskStatus};
use crate::identify::{PollResult, Submission};
use crate::server::state::{GuardedIdentifyManager, ServerState};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct FindSongBody {
    pub url: String,
}

/// Song record view for API responses.
#[derive(Debug, Serialize)]
pub struct SongView {
    pub id: String,
    pub media_id: String,
    pub source_url: String,
    pub song_title: String,
    pub artist_name: String,
    pub album_artwork: String,
    pub spotify_link: String,
    pub apple_music_link: String,
    pub provider_url: String,
    pub search_count: i64,
    pub created_at: i64,
}

impl SongView {
    fn from_record(record: &SongRecord) -> Self {
        Self {
            id: record.id.clone(),
            media_id: record.media_id.clone(),
            source_url: record.source_url.clone(),
            song_title: record.song_title.clone(),
            artist_name: record.artist_name.clone(),
            album_artwork: record.album_artwork.clone(),
            spotify_link: record.spotify_link.clone(),
            apple_music_link: record.apple_music_link.clone(),
            provider_url: record.provider_url.clone(),
            search_count: record.search_count,
            created_at: record.created_at,
        }
    }
}

/// Combined response for submissions: cached data or a task handle.
#[derive(Debug, Serialize)]
pub struct FindSongResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<SongView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub success: bool,
    pub task_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<SongView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub trending_songs: Vec<SongView>,
    pub total_searches: i64,
    pub unique_songs: i64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error_code: String,
    message: String,
}

fn internal_error(err: anyhow::Error) -> Response {
    error!("Request failed: {:#}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            success: false,
            error_code: "INTERNAL_ERROR".to_string(),
            message: "Internal server error".to_string(),
        }),
    )
        .into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /api/v1/find-song
///
/// Accept a source URL, check the cache, and queue identification.
async fn find_song(
    State(manager): State<GuardedIdentifyManager>,
    Json(body): Json<FindSongBody>,
) -> Response {
    let submission = match manager.submit(&body.url).await {
        Ok(submission) => submission,
        Err(e) => return internal_error(e),
    };

    match submission {
        Submission::Rejected(err) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                success: false,
                error_code: err.kind.as_code().to_string(),
                message: err.message,
            }),
        )
            .into_response(),
        Submission::Cached(record) => (
            StatusCode::OK,
            Json(FindSongResponse {
                success: true,
                cached: Some(true),
                data: Some(SongView::from_record(&record)),
                task_id: None,
                status: None,
                message: None,
                error_code: None,
            }),
        )
            .into_response(),
        Submission::Queued { task_id } => (
            StatusCode::ACCEPTED,
            Json(FindSongResponse {
                success: true,
                cached: Some(false),
                data: None,
                status: Some(TaskStatus::Pending.api_str().to_string()),
                message: Some(format!(
                    "Song identification in progress. Poll /api/v1/task-status/{} for results.",
                    task_id
                )),
                task_id: Some(task_id),
                error_code: None,
            }),
        )
            .into_response(),
    }
}

/// GET /api/v1/task-status/{task_id}
///
/// Poll for task status and results.
async fn task_status(
    State(manager): State<GuardedIdentifyManager>,
    Path(task_id): Path<String>,
) -> Response {
    let poll = match manager.poll(&task_id) {
        Ok(poll) => poll,
        Err(e) => return internal_error(e),
    };

    match poll {
        PollResult::NotFound => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                success: false,
                error_code: "TASK_NOT_FOUND".to_string(),
                message: "Task not found.".to_string(),
            }),
        )
            .into_response(),
        PollResult::Found { task, song } => {
            Json(build_task_status_response(&task, song.as_ref())).into_response()
        }
    }
}

fn build_task_status_response(task: &TaskRecord, song: Option<&SongRecord>) -> TaskStatusResponse {
    let mut response = TaskStatusResponse {
        success: true,
        task_id: task.id.clone(),
        status: task.status.api_str().to_string(),
        data: None,
        error_code: None,
        message: None,
    };

    match task.status {
        TaskStatus::Completed => match song {
            Some(record) => response.data = Some(SongView::from_record(record)),
            None => {
                // Clean run with no match.
                response.error_code = task
                    .error_kind
                    .map(|k| k.as_code().to_string())
                    .or_else(|| Some("NO_SONG_FOUND".to_string()));
                response.message = task.error_message.clone();
            }
        },
        TaskStatus::Failed => {
            response.success = false;
            response.error_code = Some(
                task.error_kind
                    .map(|k| k.as_code().to_string())
                    .unwrap_or_else(|| "UNKNOWN_ERROR".to_string()),
            );
            response.message = Some(
                task.error_message
                    .clone()
                    .unwrap_or_else(|| "An error occurred.".to_string()),
            );
        }
        _ => {}
    }

    response
}

/// GET /api/v1/stats
///
/// Trending songs and aggregate search totals.
async fn stats(State(manager): State<GuardedIdentifyManager>) -> Response {
    match manager.trending() {
        Ok(stats) => Json(StatsResponse {
            trending_songs: stats.trending.iter().map(SongView::from_record).collect(),
            total_searches: stats.total_searches,
            unique_songs: stats.unique_songs,
        })
        .into_response(),
        Err(e) => internal_error(e),
    }
}

/// Build the identification route tree.
pub fn make_identify_routes() -> Router<ServerState> {
    Router::new()
        .route("/find-song", post(find_song))
        .route("/task-status/{task_id}", get(task_status))
        .route("/stats", get(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identify::models::ErrorKind;

    fn terminal_task(status: TaskStatus) -> TaskRecord {
        let mut task = TaskRecord::new("ABC123".into(), "https://ig/reel/ABC123/".into(), 3);
        task.status = status;
        task
    }

    #[test]
    fn test_completed_with_match_carries_data() {
        let mut task = terminal_task(TaskStatus::Completed);
        task.song_id = Some("song-1".to_string());
        let mut record = SongRecord::new("ABC123".into(), "https://ig/reel/ABC123/".into());
        record.song_title = "Song X".to_string();

        let response = build_task_status_response(&task, Some(&record));
        assert!(response.success);
        assert_eq!(response.status, "COMPLETED");
        assert_eq!(response.data.unwrap().song_title, "Song X");
        assert!(response.error_code.is_none());
    }

    #[test]
    fn test_completed_no_match_reports_no_song_found() {
        let mut task = terminal_task(TaskStatus::Completed);
        task.error_kind = Some(ErrorKind::NoSongFound);
        task.error_message = Some("No song was identified in this audio.".to_string());

        let response = build_task_status_response(&task, None);
        assert!(response.success);
        assert_eq!(response.error_code.as_deref(), Some("NO_SONG_FOUND"));
        assert!(response.data.is_none());
    }

    #[test]
    fn test_failed_task_reports_error_pair() {
        let mut task = terminal_task(TaskStatus::Failed);
        task.error_kind = Some(ErrorKind::ContentNotFound);
        task.error_message = Some("gone".to_string());

        let response = build_task_status_response(&task, None);
        assert!(!response.success);
        assert_eq!(response.error_code.as_deref(), Some("CONTENT_NOT_FOUND"));
        assert_eq!(response.message.as_deref(), Some("gone"));
    }

    #[test]
    fn test_retry_waiting_shown_as_processing() {
        let task = terminal_task(TaskStatus::RetryWaiting);
        let response = build_task_status_response(&task, None);
        assert_eq!(response.status, "PROCESSING");
        assert!(response.error_code.is_none());
    }
}
