//! Bounded worker pool executing pipeline runs, plus the retry scheduler.
//!
//! Retry delays are non-blocking: a failed attempt parks its task in
//! RetryWaiting and frees the worker; the scheduler promotes due tasks
//! back onto the run queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::IdentifySettings;
use crate::server::metrics;

use super::pipeline::IdentifyPipeline;
use super::task_store::TaskStore;

/// Capacity of the run queue; submissions beyond this apply backpressure.
const RUN_QUEUE_CAPACITY: usize = 256;

/// Worker pool over the identification run queue.
pub struct WorkerPool {
    queue_tx: mpsc::Sender<String>,
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Start the pool: recover orphaned tasks, spawn workers and the retry
    /// scheduler.
    pub fn start(
        pipeline: Arc<IdentifyPipeline>,
        task_store: Arc<dyn TaskStore>,
        settings: &IdentifySettings,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let (queue_tx, queue_rx) = mpsc::channel::<String>(RUN_QUEUE_CAPACITY);
        let queue_rx = Arc::new(Mutex::new(queue_rx));

        // Crash recovery: fail stale Processing tasks, re-enqueue the rest.
        match task_store.fail_stale_processing(settings.stale_processing_threshold_secs) {
            Ok(count) if count > 0 => {
                warn!("Failed {} stale in-progress task(s) from previous run", count)
            }
            Ok(_) => {}
            Err(e) => error!("Stale task recovery failed: {}", e),
        }
        let resumable = task_store.get_resumable()?;
        if !resumable.is_empty() {
            info!("Re-enqueueing {} unfinished task(s)", resumable.len());
        }

        let mut handles = Vec::with_capacity(settings.worker_count + 1);
        for worker_id in 0..settings.worker_count {
            handles.push(tokio::spawn(run_worker(
                worker_id,
                pipeline.clone(),
                queue_rx.clone(),
                shutdown.clone(),
            )));
        }
        handles.push(tokio::spawn(run_retry_scheduler(
            task_store,
            queue_tx.clone(),
            Duration::from_secs(settings.retry_poll_interval_secs),
            shutdown.clone(),
        )));

        let pool = Self {
            queue_tx,
            handles,
            shutdown,
        };

        for task in resumable {
            // Parked retries stay put; the scheduler enqueues them when due.
            if task.status == super::models::TaskStatus::Pending {
                pool.try_enqueue(&task.id);
            }
        }

        Ok(pool)
    }

    /// Sender half of the run queue, for the submission path.
    pub fn queue(&self) -> mpsc::Sender<String> {
        self.queue_tx.clone()
    }

    fn try_enqueue(&self, task_id: &str) {
        if let Err(e) = self.queue_tx.try_send(task_id.to_string()) {
            warn!("Could not enqueue task {}: {}", task_id, e);
        }
    }

    /// Cancel all workers and wait for them to drain.
    pub async fn shutdown(self) {
        info!("Shutting down worker pool...");
        self.shutdown.cancel();
        for handle in self.handles {
            let _ = tokio::time::timeout(Duration::from_secs(30), handle).await;
        }
        info!("Worker pool stopped");
    }
}

/// Single worker loop: pull task IDs off the shared queue and run the
/// pipeline for each.
async fn run_worker(
    worker_id: usize,
    pipeline: Arc<IdentifyPipeline>,
    queue_rx: Arc<Mutex<mpsc::Receiver<String>>>,
    shutdown: CancellationToken,
) {
    info!("Identification worker {} started", worker_id);
    loop {
        let task_id = {
            let mut rx = queue_rx.lock().await;
            tokio::select! {
                task_id = rx.recv() => task_id,
                _ = shutdown.cancelled() => None,
            }
        };

        let Some(task_id) = task_id else {
            break;
        };

        let outcome = pipeline.run(&task_id).await;
        metrics::record_pipeline_outcome(outcome.as_str());
    }
    info!("Identification worker {} stopped", worker_id);
}

/// Scheduler loop: promote due RetryWaiting tasks back onto the queue.
async fn run_retry_scheduler(
    task_store: Arc<dyn TaskStore>,
    queue_tx: mpsc::Sender<String>,
    poll_interval: Duration,
    shutdown: CancellationToken,
) {
    info!(
        "Retry scheduler started (poll interval {:?})",
        poll_interval
    );
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.cancelled() => break,
        }

        let due = match task_store.get_retry_ready(chrono::Utc::now().timestamp()) {
            Ok(due) => due,
            Err(e) => {
                error!("Retry scan failed: {}", e);
                continue;
            }
        };

        for task in due {
            if let Err(e) = task_store.promote_retry_to_pending(&task.id) {
                error!("Failed to promote task {} for retry: {}", task.id, e);
                continue;
            }
            metrics::record_retry_scheduled();
            if queue_tx.send(task.id.clone()).await.is_err() {
                // Queue closed during shutdown; the task stays Pending and
                // is re-enqueued on next startup.
                return;
            }
        }
    }
    info!("Retry scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{AudioClip, AudioExtractor};
    use crate::identify::models::{ErrorKind, IdentifyError, TaskRecord, TaskStatus};
    use crate::identify::retry_policy::RetryPolicy;
    use crate::identify::song_store::SqliteSongStore;
    use crate::identify::task_store::SqliteTaskStore;
    use crate::recognition::{RecognitionOutcome, SongRecognizer, TrackMatch};
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExtractor {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AudioExtractor for CountingExtractor {
        async fn extract(&self, _url: &str, _max: u32) -> Result<AudioClip, IdentifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(b"audio").unwrap();
            Ok(AudioClip::new(file.into_temp_path(), None, 5))
        }
    }

    struct MatchRecognizer;

    #[async_trait]
    impl SongRecognizer for MatchRecognizer {
        async fn identify(
            &self,
            _clip: &AudioClip,
        ) -> Result<RecognitionOutcome, IdentifyError> {
            Ok(RecognitionOutcome::Match(TrackMatch {
                title: "Song X".to_string(),
                subtitle: "Artist Y".to_string(),
                ..Default::default()
            }))
        }
    }

    struct FailingExtractor;

    #[async_trait]
    impl AudioExtractor for FailingExtractor {
        async fn extract(&self, _url: &str, _max: u32) -> Result<AudioClip, IdentifyError> {
            Err(IdentifyError::new(ErrorKind::NetworkError, "down"))
        }
    }

    fn settings() -> IdentifySettings {
        IdentifySettings {
            worker_count: 2,
            retry_delay_secs: 0,
            retry_poll_interval_secs: 1,
            ..Default::default()
        }
    }

    async fn wait_for_terminal(store: &SqliteTaskStore, id: &str) -> TaskRecord {
        for _ in 0..200 {
            let task = store.get(id).unwrap().unwrap();
            if task.status.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("task {} never reached a terminal state", id);
    }

    #[tokio::test]
    async fn test_pool_processes_enqueued_task() {
        let task_store = Arc::new(SqliteTaskStore::in_memory().unwrap());
        let song_store = Arc::new(SqliteSongStore::in_memory().unwrap());
        let calls = Arc::new(AtomicUsize::new(0));

        let pipeline = Arc::new(IdentifyPipeline::new(
            task_store.clone(),
            song_store.clone(),
            Arc::new(CountingExtractor {
                calls: calls.clone(),
            }),
            Arc::new(MatchRecognizer),
            RetryPolicy::default(),
            10,
        ));

        let shutdown = CancellationToken::new();
        let pool = WorkerPool::start(
            pipeline,
            task_store.clone(),
            &settings(),
            shutdown.clone(),
        )
        .unwrap();

        let task = TaskRecord::new("ABC123".into(), "https://ig/reel/ABC123/".into(), 3);
        task_store.create(&task).unwrap();
        pool.queue().send(task.id.clone()).await.unwrap();

        let done = wait_for_terminal(&task_store, &task.id).await;
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_retry_scheduler_drives_task_to_failure() {
        let task_store = Arc::new(SqliteTaskStore::in_memory().unwrap());
        let song_store = Arc::new(SqliteSongStore::in_memory().unwrap());

        let pipeline = Arc::new(IdentifyPipeline::new(
            task_store.clone(),
            song_store,
            Arc::new(FailingExtractor),
            Arc::new(MatchRecognizer),
            RetryPolicy {
                max_attempts: 3,
                base_delay_secs: 0,
                max_delay_secs: 0,
                multiplier: 1.0,
            },
            10,
        ));

        let shutdown = CancellationToken::new();
        let pool = WorkerPool::start(
            pipeline,
            task_store.clone(),
            &settings(),
            shutdown.clone(),
        )
        .unwrap();

        let task = TaskRecord::new("ABC123".into(), "https://ig/reel/ABC123/".into(), 3);
        task_store.create(&task).unwrap();
        pool.queue().send(task.id.clone()).await.unwrap();

        let done = wait_for_terminal(&task_store, &task.id).await;
        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(done.attempt_count, 3);
        assert_eq!(done.error_kind, Some(ErrorKind::NetworkError));

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_startup_reenqueues_pending_tasks() {
        let task_store = Arc::new(SqliteTaskStore::in_memory().unwrap());
        let song_store = Arc::new(SqliteSongStore::in_memory().unwrap());

        // Task created before the pool exists (e.g. previous process).
        let task = TaskRecord::new("ABC123".into(), "https://ig/reel/ABC123/".into(), 3);
        task_store.create(&task).unwrap();

        let pipeline = Arc::new(IdentifyPipeline::new(
            task_store.clone(),
            song_store,
            Arc::new(CountingExtractor {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Arc::new(MatchRecognizer),
            RetryPolicy::default(),
            10,
        ));

        let shutdown = CancellationToken::new();
        let pool = WorkerPool::start(
            pipeline,
            task_store.clone(),
            &settings(),
            shutdown.clone(),
        )
        .unwrap();

        let done = wait_for_terminal(&task_store, &task.id).await;
        assert_eq!(done.status, TaskStatus::Completed);

        pool.shutdown().await;
    }
}
