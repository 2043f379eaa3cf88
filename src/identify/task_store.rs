//! Task registry storage and state machine enforcement.
//!
//! All transitions are guarded in SQL so that a terminal record can never
//! be rewritten and no two workers can claim the same task.

use super::models::{ErrorKind, IdentifyError, TaskRecord, TaskStatus};
use super::schema::TASK_STORE_VERSIONED_SCHEMAS;
use crate::sqlite_persistence;
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Trait for task registry operations.
pub trait TaskStore: Send + Sync {
    /// Insert a new task record (status must be Pending).
    fn create(&self, task: &TaskRecord) -> Result<()>;

    /// Get a task by ID.
    fn get(&self, id: &str) -> Result<Option<TaskRecord>>;

    /// Atomically claim a task for processing
    /// (Pending | RetryWaiting → Processing), incrementing the attempt
    /// counter. Returns false if the task is missing, already claimed, or
    /// terminal.
    fn claim_for_processing(&self, id: &str) -> Result<bool>;

    /// Finalize Completed with a linked song record.
    fn mark_completed(&self, id: &str, song_id: &str) -> Result<()>;

    /// Finalize Completed without a match (NoSongFound, no song link).
    fn mark_completed_no_match(&self, id: &str, error: &IdentifyError) -> Result<()>;

    /// Park a task until `next_retry_at`, recording the error that caused
    /// the re-queue.
    fn mark_retry_waiting(&self, id: &str, next_retry_at: i64, error: &IdentifyError)
        -> Result<()>;

    /// Finalize Failed with the classified error.
    fn mark_failed(&self, id: &str, error: &IdentifyError) -> Result<()>;

    /// Tasks in RetryWaiting whose retry time has passed.
    fn get_retry_ready(&self, now: i64) -> Result<Vec<TaskRecord>>;

    /// Promote a retry-waiting task back to Pending.
    fn promote_retry_to_pending(&self, id: &str) -> Result<()>;

    /// Non-terminal tasks to re-enqueue at startup (Pending, RetryWaiting).
    fn get_resumable(&self) -> Result<Vec<TaskRecord>>;

    /// Fail Processing tasks whose attempt started longer than
    /// `stale_threshold_secs` ago (crashed worker). Returns how many.
    fn fail_stale_processing(&self, stale_threshold_secs: i64) -> Result<usize>;
}

/// SQLite-backed task store.
pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTaskStore {
    /// Open an existing database or create a new one with the current
    /// schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn =
            sqlite_persistence::open_versioned(db_path.as_ref(), &TASK_STORE_VERSIONED_SCHEMAS)
                .context("Failed to open task store")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    pub fn in_memory() -> Result<Self> {
        let conn = sqlite_persistence::open_in_memory(&TASK_STORE_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<TaskRecord> {
        Ok(TaskRecord {
            id: row.get("id")?,
            media_id: row.get("media_id")?,
            source_url: row.get("source_url")?,
            status: TaskStatus::from_db_str(&row.get::<_, String>("status")?)
                .unwrap_or(TaskStatus::Failed),
            song_id: row.get("song_id")?,
            error_kind: row
                .get::<_, Option<String>>("error_kind")?
                .and_then(|s| ErrorKind::from_code(&s)),
            error_message: row.get("error_message")?,
            attempt_count: row.get("attempt_count")?,
            max_attempts: row.get("max_attempts")?,
            next_retry_at: row.get("next_retry_at")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl TaskStore for SqliteTaskStore {
    fn create(&self, task: &TaskRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO task_records (
                id, media_id, source_url, status, song_id, error_kind,
                error_message, attempt_count, max_attempts, next_retry_at,
                created_at, started_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"#,
            rusqlite::params![
                task.id,
                task.media_id,
                task.source_url,
                task.status.as_db_str(),
                task.song_id,
                task.error_kind.map(|k| k.as_code()),
                task.error_message,
                task.attempt_count,
                task.max_attempts,
                task.next_retry_at,
                task.created_at,
                task.started_at,
                task.completed_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<TaskRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM task_records WHERE id = ?1")?;
        let task = stmt.query_row([id], Self::row_to_task).optional()?;
        Ok(task)
    }

    fn claim_for_processing(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE task_records
             SET status = 'PROCESSING',
                 attempt_count = attempt_count + 1,
                 started_at = COALESCE(started_at, ?2),
                 next_retry_at = NULL
             WHERE id = ?1 AND status IN ('PENDING', 'RETRY_WAITING')",
            rusqlite::params![id, Self::now()],
        )?;
        Ok(updated > 0)
    }

    fn mark_completed(&self, id: &str, song_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE task_records
             SET status = 'COMPLETED', song_id = ?2, completed_at = ?3
             WHERE id = ?1 AND status = 'PROCESSING'",
            rusqlite::params![id, song_id, Self::now()],
        )?;
        if updated == 0 {
            // Record deleted or already terminal; finalization is a no-op.
            warn!("Task {} could not be finalized as completed", id);
        }
        Ok(())
    }

    fn mark_completed_no_match(&self, id: &str, error: &IdentifyError) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE task_records
             SET status = 'COMPLETED', error_kind = ?2, error_message = ?3,
                 completed_at = ?4
             WHERE id = ?1 AND status = 'PROCESSING'",
            rusqlite::params![id, error.kind.as_code(), error.message, Self::now()],
        )?;
        if updated == 0 {
            warn!("Task {} could not be finalized as completed-no-match", id);
        }
        Ok(())
    }

    fn mark_retry_waiting(
        &self,
        id: &str,
        next_retry_at: i64,
        error: &IdentifyError,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE task_records
             SET status = 'RETRY_WAITING', next_retry_at = ?2,
                 error_kind = ?3, error_message = ?4
             WHERE id = ?1 AND status = 'PROCESSING'",
            rusqlite::params![id, next_retry_at, error.kind.as_code(), error.message],
        )?;
        Ok(())
    }

    fn mark_failed(&self, id: &str, error: &IdentifyError) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE task_records
             SET status = 'FAILED', error_kind = ?2, error_message = ?3,
                 completed_at = ?4
             WHERE id = ?1 AND status NOT IN ('COMPLETED', 'FAILED')",
            rusqlite::params![id, error.kind.as_code(), error.message, Self::now()],
        )?;
        if updated == 0 {
            warn!("Task {} could not be finalized as failed", id);
        }
        Ok(())
    }

    fn get_retry_ready(&self, now: i64) -> Result<Vec<TaskRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM task_records
             WHERE status = 'RETRY_WAITING' AND next_retry_at <= ?1
             ORDER BY next_retry_at ASC",
        )?;
        let tasks: Vec<TaskRecord> = stmt
            .query_map([now], Self::row_to_task)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(tasks)
    }

    fn promote_retry_to_pending(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE task_records
             SET status = 'PENDING', next_retry_at = NULL
             WHERE id = ?1 AND status = 'RETRY_WAITING'",
            [id],
        )?;
        Ok(())
    }

    fn get_resumable(&self) -> Result<Vec<TaskRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM task_records
             WHERE status IN ('PENDING', 'RETRY_WAITING')
             ORDER BY created_at ASC",
        )?;
        let tasks: Vec<TaskRecord> = stmt
            .query_map([], Self::row_to_task)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(tasks)
    }

    fn fail_stale_processing(&self, stale_threshold_secs: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let cutoff = Self::now() - stale_threshold_secs;
        let updated = conn.execute(
            "UPDATE task_records
             SET status = 'FAILED', error_kind = 'PROCESSING_ERROR',
                 error_message = 'Worker died while processing', completed_at = ?2
             WHERE status = 'PROCESSING' AND COALESCE(started_at, created_at) <= ?1",
            rusqlite::params![cutoff, Self::now()],
        )?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_task() -> TaskRecord {
        TaskRecord::new(
            "ABC123".to_string(),
            "https://www.instagram.com/reel/ABC123/".to_string(),
            3,
        )
    }

    fn store_with_task() -> (SqliteTaskStore, TaskRecord) {
        let store = SqliteTaskStore::in_memory().unwrap();
        let task = make_task();
        store.create(&task).unwrap();
        (store, task)
    }

    #[test]
    fn test_create_and_get() {
        let (store, task) = store_with_task();
        let fetched = store.get(&task.id).unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Pending);
        assert_eq!(fetched.media_id, "ABC123");
        assert_eq!(fetched.attempt_count, 0);
    }

    #[test]
    fn test_get_missing() {
        let store = SqliteTaskStore::in_memory().unwrap();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_claim_increments_attempts() {
        let (store, task) = store_with_task();

        assert!(store.claim_for_processing(&task.id).unwrap());
        let claimed = store.get(&task.id).unwrap().unwrap();
        assert_eq!(claimed.status, TaskStatus::Processing);
        assert_eq!(claimed.attempt_count, 1);
        assert!(claimed.started_at.is_some());

        // Second claim while Processing must fail.
        assert!(!store.claim_for_processing(&task.id).unwrap());
    }

    #[test]
    fn test_claim_missing_task() {
        let store = SqliteTaskStore::in_memory().unwrap();
        assert!(!store.claim_for_processing("nope").unwrap());
    }

    #[test]
    fn test_completed_is_terminal() {
        let (store, task) = store_with_task();
        store.claim_for_processing(&task.id).unwrap();
        store.mark_completed(&task.id, "song-1").unwrap();

        let done = store.get(&task.id).unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.song_id.as_deref(), Some("song-1"));
        assert!(done.completed_at.is_some());

        // No transition out of a terminal state.
        let err = IdentifyError::new(ErrorKind::NetworkError, "late failure");
        store.mark_failed(&task.id, &err).unwrap();
        assert!(!store.claim_for_processing(&task.id).unwrap());

        let still = store.get(&task.id).unwrap().unwrap();
        assert_eq!(still.status, TaskStatus::Completed);
        assert_eq!(still.song_id.as_deref(), Some("song-1"));
        assert!(still.error_kind.is_none());
    }

    #[test]
    fn test_completed_no_match() {
        let (store, task) = store_with_task();
        store.claim_for_processing(&task.id).unwrap();

        let err = IdentifyError::new(ErrorKind::NoSongFound, "No song was identified");
        store.mark_completed_no_match(&task.id, &err).unwrap();

        let done = store.get(&task.id).unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert!(done.song_id.is_none());
        assert_eq!(done.error_kind, Some(ErrorKind::NoSongFound));
    }

    #[test]
    fn test_retry_waiting_roundtrip() {
        let (store, task) = store_with_task();
        store.claim_for_processing(&task.id).unwrap();

        let err = IdentifyError::new(ErrorKind::NetworkError, "connection refused");
        let now = chrono::Utc::now().timestamp();
        store.mark_retry_waiting(&task.id, now - 1, &err).unwrap();

        let waiting = store.get(&task.id).unwrap().unwrap();
        assert_eq!(waiting.status, TaskStatus::RetryWaiting);
        assert_eq!(waiting.error_kind, Some(ErrorKind::NetworkError));

        let ready = store.get_retry_ready(now).unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, task.id);

        store.promote_retry_to_pending(&task.id).unwrap();
        let pending = store.get(&task.id).unwrap().unwrap();
        assert_eq!(pending.status, TaskStatus::Pending);
        assert!(pending.next_retry_at.is_none());

        // Re-claim for the second attempt.
        assert!(store.claim_for_processing(&task.id).unwrap());
        let claimed = store.get(&task.id).unwrap().unwrap();
        assert_eq!(claimed.attempt_count, 2);
    }

    #[test]
    fn test_retry_not_ready_before_deadline() {
        let (store, task) = store_with_task();
        store.claim_for_processing(&task.id).unwrap();

        let err = IdentifyError::new(ErrorKind::RateLimited, "throttled");
        let now = chrono::Utc::now().timestamp();
        store.mark_retry_waiting(&task.id, now + 60, &err).unwrap();

        assert!(store.get_retry_ready(now).unwrap().is_empty());
    }

    #[test]
    fn test_finalizing_missing_task_is_noop() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let err = IdentifyError::new(ErrorKind::ContentNotFound, "gone");
        store.mark_failed("missing", &err).unwrap();
        store.mark_completed("missing", "song-1").unwrap();
        store.mark_completed_no_match("missing", &err).unwrap();
    }

    #[test]
    fn test_get_resumable() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let pending = make_task();
        store.create(&pending).unwrap();

        let mut other = make_task();
        other.id = uuid::Uuid::new_v4().to_string();
        store.create(&other).unwrap();
        store.claim_for_processing(&other.id).unwrap();
        let err = IdentifyError::new(ErrorKind::NetworkError, "down");
        store.mark_retry_waiting(&other.id, 0, &err).unwrap();

        let mut done = make_task();
        done.id = uuid::Uuid::new_v4().to_string();
        store.create(&done).unwrap();
        store.claim_for_processing(&done.id).unwrap();
        store.mark_completed(&done.id, "song-1").unwrap();

        let resumable = store.get_resumable().unwrap();
        assert_eq!(resumable.len(), 2);
    }

    #[test]
    fn test_fail_stale_processing() {
        let (store, task) = store_with_task();
        store.claim_for_processing(&task.id).unwrap();

        // Fresh Processing task is not stale.
        assert_eq!(store.fail_stale_processing(3600).unwrap(), 0);

        // With a zero threshold everything currently Processing is stale.
        assert_eq!(store.fail_stale_processing(0).unwrap(), 1);
        let failed = store.get(&task.id).unwrap().unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error_kind, Some(ErrorKind::ProcessingError));
    }
}
