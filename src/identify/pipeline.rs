//! Pipeline orchestrator: one identification attempt for one task.
//!
//! extract → recognize → parse → persist, with the audio clip removed on
//! every exit path and failures classified into retry vs. permanent
//! failure via the retry policy.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::extraction::AudioExtractor;
use crate::recognition::{links, RecognitionOutcome, SongRecognizer, TrackMatch};

use super::models::{ErrorKind, IdentifyError, SongRecord, TaskRecord};
use super::retry_policy::RetryPolicy;
use super::song_store::SongStore;
use super::task_store::TaskStore;

/// Result of a single pipeline attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Match found, song record upserted, task completed.
    Completed,
    /// Clean run, no match; task completed with NoSongFound.
    CompletedNoMatch,
    /// Permanent failure, task failed.
    Failed(ErrorKind),
    /// Retryable failure with attempts remaining; task re-queued.
    Requeued { next_retry_at: i64 },
    /// Task could not be claimed (already terminal, already claimed, or
    /// deleted).
    Skipped,
}

impl AttemptOutcome {
    /// Label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Completed => "completed",
            AttemptOutcome::CompletedNoMatch => "no_match",
            AttemptOutcome::Failed(_) => "failed",
            AttemptOutcome::Requeued { .. } => "requeued",
            AttemptOutcome::Skipped => "skipped",
        }
    }
}

/// Runs identification attempts against the two collaborators, updating
/// the task registry and the song cache.
pub struct IdentifyPipeline {
    task_store: Arc<dyn TaskStore>,
    song_store: Arc<dyn SongStore>,
    extractor: Arc<dyn AudioExtractor>,
    recognizer: Arc<dyn SongRecognizer>,
    retry_policy: RetryPolicy,
    clip_duration_secs: u32,
}

impl IdentifyPipeline {
    pub fn new(
        task_store: Arc<dyn TaskStore>,
        song_store: Arc<dyn SongStore>,
        extractor: Arc<dyn AudioExtractor>,
        recognizer: Arc<dyn SongRecognizer>,
        retry_policy: RetryPolicy,
        clip_duration_secs: u32,
    ) -> Self {
        Self {
            task_store,
            song_store,
            extractor,
            recognizer,
            retry_policy,
            clip_duration_secs,
        }
    }

    /// Run one attempt for the task, claiming it first.
    pub async fn run(&self, task_id: &str) -> AttemptOutcome {
        let claimed = match self.task_store.claim_for_processing(task_id) {
            Ok(claimed) => claimed,
            Err(e) => {
                error!("Failed to claim task {}: {}", task_id, e);
                return AttemptOutcome::Skipped;
            }
        };
        if !claimed {
            return AttemptOutcome::Skipped;
        }

        let task = match self.task_store.get(task_id) {
            Ok(Some(task)) => task,
            Ok(None) => return AttemptOutcome::Skipped,
            Err(e) => {
                error!("Failed to load task {}: {}", task_id, e);
                return AttemptOutcome::Skipped;
            }
        };

        info!(
            "Starting identification for {} (task {}, attempt {}/{})",
            task.source_url, task.id, task.attempt_count, task.max_attempts
        );

        match self.run_attempt(&task).await {
            Ok(outcome) => outcome,
            Err(err) => self.handle_failure(&task, err),
        }
    }

    /// One extract → recognize → persist pass.
    ///
    /// The clip is dropped (and its file removed) before any terminal or
    /// re-queued state is written, so no artifact outlives the attempt.
    async fn run_attempt(&self, task: &TaskRecord) -> Result<AttemptOutcome, IdentifyError> {
        let clip = self
            .extractor
            .extract(&task.source_url, self.clip_duration_secs)
            .await?;
        info!(
            "Audio extracted for task {} ({} bytes)",
            task.id,
            clip.size_bytes()
        );

        let outcome = self.recognizer.identify(&clip).await;
        drop(clip);
        let outcome = outcome?;

        match outcome {
            RecognitionOutcome::NoMatch => {
                let no_match = IdentifyError::new(
                    ErrorKind::NoSongFound,
                    "No song was identified in this audio.",
                );
                self.task_store
                    .mark_completed_no_match(&task.id, &no_match)
                    .map_err(IdentifyError::processing)?;
                Ok(AttemptOutcome::CompletedNoMatch)
            }
            RecognitionOutcome::Match(track) => {
                let record = build_song_record(task, &track);
                let stored = self
                    .song_store
                    .upsert(&record)
                    .map_err(IdentifyError::processing)?;
                self.task_store
                    .mark_completed(&task.id, &stored.id)
                    .map_err(IdentifyError::processing)?;
                info!(
                    "Song identified for task {}: {} by {}",
                    task.id, stored.song_title, stored.artist_name
                );
                Ok(AttemptOutcome::Completed)
            }
        }
    }

    /// Apply the retry policy to a failed attempt.
    fn handle_failure(&self, task: &TaskRecord, err: IdentifyError) -> AttemptOutcome {
        // The claim already counted this attempt.
        let attempts_made = task.attempt_count;

        if self.retry_policy.should_retry(&err, attempts_made) {
            let retry_count = (attempts_made - 1).max(0);
            let next_retry_at = self.retry_policy.next_retry_at(retry_count);
            warn!(
                "Task {} attempt {}/{} failed ({}), retrying at {}",
                task.id, attempts_made, task.max_attempts, err, next_retry_at
            );
            if let Err(e) = self
                .task_store
                .mark_retry_waiting(&task.id, next_retry_at, &err)
            {
                error!("Failed to park task {} for retry: {}", task.id, e);
                return AttemptOutcome::Failed(err.kind);
            }
            AttemptOutcome::Requeued { next_retry_at }
        } else {
            error!(
                "Task {} failed permanently after {} attempt(s): {}",
                task.id, attempts_made, err
            );
            if let Err(e) = self.task_store.mark_failed(&task.id, &err) {
                error!("Failed to finalize task {}: {}", task.id, e);
            }
            AttemptOutcome::Failed(err.kind)
        }
    }
}

/// Build a song record from a provider track match.
///
/// Cover art wins over background art; links absent from the provider
/// response stay empty.
fn build_song_record(task: &TaskRecord, track: &TrackMatch) -> SongRecord {
    let mut record = SongRecord::new(task.media_id.clone(), task.source_url.clone());
    record.song_title = track.title.clone();
    record.artist_name = track.subtitle.clone();
    record.album_artwork = links::artwork(track).unwrap_or_default();
    record.spotify_link = links::spotify_link(track).unwrap_or_default();
    record.apple_music_link = links::apple_music_link(track).unwrap_or_default();
    record.provider_track_id = track.key.clone();
    record.provider_url = track.url.clone();
    record
}
