//! Data models for the identification pipeline.
//!
//! Defines task records, cached song records, the error taxonomy, and
//! related types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of an identification task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Processing,
    RetryWaiting,
    Completed, // terminal
    Failed,    // terminal
}

impl TaskStatus {
    /// Returns true if this is a terminal state (Completed or Failed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::RetryWaiting => "RETRY_WAITING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TaskStatus::Pending),
            "PROCESSING" => Some(TaskStatus::Processing),
            "RETRY_WAITING" => Some(TaskStatus::RetryWaiting),
            "COMPLETED" => Some(TaskStatus::Completed),
            "FAILED" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    /// Status label shown to polling callers.
    ///
    /// RetryWaiting is an internal scheduling state; callers see it as
    /// PROCESSING.
    pub fn api_str(&self) -> &'static str {
        match self {
            TaskStatus::RetryWaiting => "PROCESSING",
            other => other.as_db_str(),
        }
    }
}

/// Classified failure kind for a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Caller input matches a known-unsupported URL shape.
    InvalidUrl,
    /// The source content does not exist or has been deleted.
    ContentNotFound,
    /// Access denied after the extractor exhausted its own attempts.
    PrivateAccount,
    /// A collaborator signalled throttling.
    RateLimited,
    /// Transport-level failure talking to a collaborator.
    NetworkError,
    /// The recognition collaborator rejected credentials.
    AuthError,
    /// The extraction collaborator failed for unclassified reasons.
    DownloadError,
    /// The recognition collaborator returned no match (terminal success).
    NoSongFound,
    /// Any unclassified failure.
    ProcessingError,
}

impl ErrorKind {
    /// Returns true if this kind should trigger a retry of the pipeline.
    ///
    /// NoSongFound is never retried: it is a clean run that found nothing,
    /// not a failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::NetworkError
                | ErrorKind::DownloadError
                | ErrorKind::ProcessingError
        )
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidUrl => "INVALID_URL",
            ErrorKind::ContentNotFound => "CONTENT_NOT_FOUND",
            ErrorKind::PrivateAccount => "PRIVATE_ACCOUNT",
            ErrorKind::RateLimited => "RATE_LIMIT",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::AuthError => "AUTH_ERROR",
            ErrorKind::DownloadError => "DOWNLOAD_ERROR",
            ErrorKind::NoSongFound => "NO_SONG_FOUND",
            ErrorKind::ProcessingError => "PROCESSING_ERROR",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "INVALID_URL" => Some(ErrorKind::InvalidUrl),
            "CONTENT_NOT_FOUND" => Some(ErrorKind::ContentNotFound),
            "PRIVATE_ACCOUNT" => Some(ErrorKind::PrivateAccount),
            "RATE_LIMIT" => Some(ErrorKind::RateLimited),
            "NETWORK_ERROR" => Some(ErrorKind::NetworkError),
            "AUTH_ERROR" => Some(ErrorKind::AuthError),
            "DOWNLOAD_ERROR" => Some(ErrorKind::DownloadError),
            "NO_SONG_FOUND" => Some(ErrorKind::NoSongFound),
            "PROCESSING_ERROR" => Some(ErrorKind::ProcessingError),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Structured error raised by the extraction or recognition collaborators
/// and classified at the point of origin.
///
/// The kind carries the machine-readable code; downstream layers never
/// re-derive classification from the message text.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct IdentifyError {
    pub kind: ErrorKind,
    pub message: String,
}

impl IdentifyError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Wrap an unclassified failure as a ProcessingError.
    pub fn processing(err: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::ProcessingError, err.to_string())
    }
}

/// A cached identification result, keyed by canonical media ID.
///
/// At most one record exists per media ID; repeated lookups bump
/// `search_count` instead of re-running the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct SongRecord {
    /// Unique identifier (UUID).
    pub id: String,
    /// Canonical media ID derived from the source URL (unique key).
    pub media_id: String,
    /// Source URL the identification was requested for.
    pub source_url: String,
    /// Song title from the recognition provider.
    pub song_title: String,
    /// Artist name from the recognition provider.
    pub artist_name: String,
    /// Artwork URL (cover art preferred over background art).
    pub album_artwork: String,
    /// Spotify link, empty when the provider response omits it.
    pub spotify_link: String,
    /// Apple Music link, empty when the provider response omits it.
    pub apple_music_link: String,
    /// Recognition-provider track ID.
    pub provider_track_id: String,
    /// Recognition-provider track URL.
    pub provider_url: String,
    /// Number of times this media ID has been requested.
    pub search_count: i64,
    /// Creation timestamp (Unix seconds).
    pub created_at: i64,
    /// Last update timestamp (Unix seconds).
    pub updated_at: i64,
}

impl SongRecord {
    /// Create a new record with `search_count = 1`.
    pub fn new(media_id: String, source_url: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            media_id,
            source_url,
            song_title: String::new(),
            artist_name: String::new(),
            album_artwork: String::new(),
            spotify_link: String::new(),
            apple_music_link: String::new(),
            provider_track_id: String::new(),
            provider_url: String::new(),
            search_count: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A single identification task, exposed to callers via polling.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    /// Unique identifier (UUID), the caller-facing handle.
    pub id: String,
    /// Canonical media ID for the submitted URL.
    pub media_id: String,
    /// Submitted source URL.
    pub source_url: String,
    /// Current status in the state machine.
    pub status: TaskStatus,
    /// Linked song record, set only on Completed with a match.
    pub song_id: Option<String>,
    /// Classified error kind; set when Failed, or NoSongFound when
    /// Completed without a match.
    pub error_kind: Option<ErrorKind>,
    /// Human-readable error message accompanying `error_kind`.
    pub error_message: Option<String>,
    /// Number of pipeline attempts started so far.
    pub attempt_count: i32,
    /// Attempt ceiling for retryable failures.
    pub max_attempts: i32,
    /// When to retry (RetryWaiting status only, Unix seconds).
    pub next_retry_at: Option<i64>,
    /// When the task was created (Unix seconds).
    pub created_at: i64,
    /// When the first attempt started.
    pub started_at: Option<i64>,
    /// When the task reached a terminal state.
    pub completed_at: Option<i64>,
}

impl TaskRecord {
    /// Create a new task in Pending state.
    pub fn new(media_id: String, source_url: String, max_attempts: i32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            media_id,
            source_url,
            status: TaskStatus::Pending,
            song_id: None,
            error_kind: None,
            error_message: None,
            attempt_count: 0,
            max_attempts,
            next_retry_at: None,
            created_at: chrono::Utc::now().timestamp(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Aggregate statistics over all cached song records.
#[derive(Debug, Clone, Serialize)]
pub struct TrendingStats {
    /// Top records by `search_count` descending, titled records only.
    pub trending: Vec<SongRecord>,
    /// Sum of `search_count` across all records.
    pub total_searches: i64,
    /// Number of distinct records with a non-empty title.
    pub unique_songs: i64,
}
