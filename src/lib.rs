//! Reelsong Server Library
//!
//! This library exposes the internal modules for testing and potential
//! reuse.

pub mod config;
pub mod extraction;
pub mod identify;
pub mod media;
pub mod recognition;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use config::{AppConfig, CliConfig, IdentifySettings};
pub use identify::{
    IdentifyManager, IdentifyPipeline, RetryPolicy, SqliteSongStore, SqliteTaskStore, WorkerPool,
};
pub use server::{run_server, ServerState};
