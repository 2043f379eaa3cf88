//! Identification task orchestrator.
//!
//! The dedup cache, task state machine, retry policy and pipeline that
//! glue the extraction and recognition collaborators together.

pub mod manager;
pub mod models;
pub mod pipeline;
pub mod retry_policy;
mod schema;
pub mod song_store;
pub mod task_store;
pub mod worker;

pub use manager::{IdentifyManager, PollResult, Submission};
pub use models::{ErrorKind, IdentifyError, SongRecord, TaskRecord, TaskStatus, TrendingStats};
pub use pipeline::{AttemptOutcome, IdentifyPipeline};
pub use retry_policy::RetryPolicy;
pub use song_store::{SongStore, SqliteSongStore};
pub use task_store::{SqliteTaskStore, TaskStore};
pub use worker::WorkerPool;
