//! Audio extraction collaborator.
//!
//! Given a source URL, produces a short audio clip on disk. The clip is an
//! owned temporary artifact: it belongs to exactly one pipeline run and the
//! file is removed when the clip is dropped, on every exit path.

mod client;

pub use client::HttpAudioExtractor;

use crate::identify::models::IdentifyError;
use async_trait::async_trait;
use std::path::Path;
use tempfile::TempPath;

/// A short audio clip extracted from a media URL.
///
/// Owns its backing temp file; dropping the clip deletes the file.
pub struct AudioClip {
    path: TempPath,
    media_type: Option<String>,
    size_bytes: u64,
}

impl AudioClip {
    pub fn new(path: TempPath, media_type: Option<String>, size_bytes: u64) -> Self {
        Self {
            path,
            media_type,
            size_bytes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// MIME type sniffed from the clip bytes, when known.
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

impl std::fmt::Debug for AudioClip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioClip")
            .field("path", &&*self.path)
            .field("media_type", &self.media_type)
            .field("size_bytes", &self.size_bytes)
            .finish()
    }
}

/// Extraction collaborator contract.
///
/// Implementations must retry transient fetch failures internally up to
/// their own bounded attempt count before surfacing a terminal
/// classification.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Extract an audio clip of at most `max_duration_secs` from the URL.
    async fn extract(
        &self,
        url: &str,
        max_duration_secs: u32,
    ) -> Result<AudioClip, IdentifyError>;
}
