//! Song recognition collaborator.
//!
//! Takes an extracted audio clip and either returns a track match or an
//! explicit no-match outcome. "No match after a clean run" is a success
//! variant, never an error.

mod client;
pub mod links;

pub use client::ShazamClient;

use crate::extraction::AudioClip;
use crate::identify::models::IdentifyError;
use async_trait::async_trait;
use serde::Deserialize;

/// Outcome of a recognition run.
#[derive(Debug, Clone)]
pub enum RecognitionOutcome {
    Match(TrackMatch),
    NoMatch,
}

/// Track metadata returned by the recognition provider.
///
/// Every field the provider may omit is optional or defaulted; link and
/// artwork extraction from this schema lives in [`links`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrackMatch {
    pub title: String,
    /// Artist name.
    pub subtitle: String,
    /// Provider-specific track ID.
    pub key: String,
    /// Provider track URL.
    pub url: String,
    pub images: TrackImages,
    pub hub: Hub,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrackImages {
    pub coverart: Option<String>,
    pub background: Option<String>,
}

/// Provider "hub" payload carrying streaming-service options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Hub {
    pub options: Vec<HubOption>,
    pub providers: Vec<HubProvider>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HubOption {
    pub providername: Option<String>,
    pub actions: Vec<HubAction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HubProvider {
    #[serde(rename = "type")]
    pub provider_type: Option<String>,
    pub actions: Vec<HubAction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HubAction {
    #[serde(rename = "type")]
    pub action_type: Option<String>,
    pub uri: Option<String>,
}

/// Recognition collaborator contract.
#[async_trait]
pub trait SongRecognizer: Send + Sync {
    /// Identify the song in an audio clip.
    async fn identify(&self, clip: &AudioClip) -> Result<RecognitionOutcome, IdentifyError>;
}
