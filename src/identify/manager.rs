//! Submission façade over the dedup cache, task registry and run queue.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::IdentifySettings;
use crate::media;
use crate::server::metrics;

use super::models::{IdentifyError, SongRecord, TaskRecord, TrendingStats};
use super::song_store::SongStore;
use super::task_store::TaskStore;

/// Outcome of a submission.
#[derive(Debug)]
pub enum Submission {
    /// The URL was identified before; the cached record is returned
    /// immediately and no pipeline runs.
    Cached(SongRecord),
    /// A new task was created and handed to the worker pool.
    Queued { task_id: String },
    /// The URL failed validation; nothing was created.
    Rejected(IdentifyError),
}

/// Result of polling a task.
#[derive(Debug)]
pub enum PollResult {
    NotFound,
    Found {
        task: TaskRecord,
        song: Option<SongRecord>,
    },
}

/// Front door for identification requests.
///
/// Checks the dedup cache, creates task records, and feeds the worker
/// pool's run queue.
pub struct IdentifyManager {
    task_store: Arc<dyn TaskStore>,
    song_store: Arc<dyn SongStore>,
    queue_tx: mpsc::Sender<String>,
    settings: IdentifySettings,
}

impl IdentifyManager {
    pub fn new(
        task_store: Arc<dyn TaskStore>,
        song_store: Arc<dyn SongStore>,
        queue_tx: mpsc::Sender<String>,
        settings: IdentifySettings,
    ) -> Self {
        Self {
            task_store,
            song_store,
            queue_tx,
            settings,
        }
    }

    /// Submit a source URL for identification.
    ///
    /// Validation failures are rejected synchronously; everything else is
    /// answered from the cache or becomes a queued task.
    pub async fn submit(&self, url: &str) -> Result<Submission> {
        if let Err(err) = media::validate_source_url(url) {
            metrics::record_submission("rejected");
            return Ok(Submission::Rejected(err));
        }

        let media_id = media::extract_media_id(url);

        if let Some(cached) = self.song_store.record_cache_hit(&media_id)? {
            info!(
                "Cache hit for media {} (search_count {})",
                media_id, cached.search_count
            );
            metrics::record_submission("cached");
            return Ok(Submission::Cached(cached));
        }

        let task = TaskRecord::new(media_id, url.to_string(), self.settings.max_attempts);
        self.task_store.create(&task)?;
        self.queue_tx
            .send(task.id.clone())
            .await
            .context("Run queue is closed")?;

        info!("Queued identification task {} for {}", task.id, url);
        metrics::record_submission("queued");
        Ok(Submission::Queued { task_id: task.id })
    }

    /// Poll a task by ID, resolving the linked song record when present.
    pub fn poll(&self, task_id: &str) -> Result<PollResult> {
        let Some(task) = self.task_store.get(task_id)? else {
            return Ok(PollResult::NotFound);
        };

        let song = match &task.song_id {
            Some(song_id) => self.song_store.get_by_id(song_id)?,
            None => None,
        };

        Ok(PollResult::Found { task, song })
    }

    /// Trending songs plus aggregate search totals.
    pub fn trending(&self) -> Result<TrendingStats> {
        self.song_store.trending(self.settings.trending_limit)
    }
}
