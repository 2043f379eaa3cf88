//! HTTP client for the Shazam-style recognition service (via RapidAPI).

use super::{RecognitionOutcome, SongRecognizer, TrackMatch};
use crate::extraction::AudioClip;
use crate::identify::models::{ErrorKind, IdentifyError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Recognition collaborator backed by a Shazam-style HTTP API.
///
/// The clip is posted as raw binary with its sniffed content type; the
/// provider expects short clips (a few seconds, at most ~1 MB).
pub struct ShazamClient {
    client: reqwest::Client,
    endpoint: String,
    api_host: String,
    api_key: String,
}

impl ShazamClient {
    /// Create a new recognition client.
    ///
    /// # Arguments
    /// * `endpoint` - Full recognition endpoint URL
    /// * `api_host` - RapidAPI host header value
    /// * `api_key` - RapidAPI key
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(
        endpoint: String,
        api_host: String,
        api_key: String,
        timeout_sec: u64,
    ) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_host,
            api_key,
        })
    }
}

#[async_trait]
impl SongRecognizer for ShazamClient {
    async fn identify(&self, clip: &AudioClip) -> Result<RecognitionOutcome, IdentifyError> {
        if self.api_key.is_empty() {
            return Err(IdentifyError::new(
                ErrorKind::AuthError,
                "Recognition API key not configured",
            ));
        }

        let clip_bytes = tokio::fs::read(clip.path()).await.map_err(|e| {
            IdentifyError::new(
                ErrorKind::ProcessingError,
                format!("Audio clip could not be read: {}", e),
            )
        })?;

        if clip_bytes.len() > 1024 * 1024 {
            warn!(
                "Audio clip is larger than recommended: {} bytes",
                clip_bytes.len()
            );
        }

        let content_type = clip.media_type().unwrap_or("audio/mpeg").to_string();
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", &self.api_host)
            .header("Content-Type", content_type)
            .body(clip_bytes)
            .send()
            .await
            .map_err(|e| {
                IdentifyError::new(
                    ErrorKind::NetworkError,
                    format!("Failed to connect to recognition API: {}", e),
                )
            })?;

        let status = response.status().as_u16();
        debug!("Recognition API response status: {}", status);

        match status {
            429 => {
                return Err(IdentifyError::new(
                    ErrorKind::RateLimited,
                    "Recognition API rate limit exceeded",
                ))
            }
            401 | 403 => {
                return Err(IdentifyError::new(
                    ErrorKind::AuthError,
                    format!("Recognition API rejected credentials (status {})", status),
                ))
            }
            200 => {}
            other => {
                return Err(IdentifyError::new(
                    ErrorKind::ProcessingError,
                    format!("Recognition API returned status {}", other),
                ))
            }
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            IdentifyError::new(
                ErrorKind::ProcessingError,
                format!("Failed to parse recognition response: {}", e),
            )
        })?;

        let outcome = parse_response(body);
        match &outcome {
            RecognitionOutcome::Match(track) => {
                info!("Song identified: {} by {}", track.title, track.subtitle)
            }
            RecognitionOutcome::NoMatch => info!("No song identified"),
        }
        Ok(outcome)
    }
}

/// Interpret the provider response body.
///
/// The shape varies across provider versions: a list of matches, an object
/// with a `track` field, or the track object itself. Anything without a
/// recognizable track is a no-match.
fn parse_response(body: serde_json::Value) -> RecognitionOutcome {
    let track_value = match &body {
        serde_json::Value::Array(matches) => matches.first().cloned(),
        serde_json::Value::Object(map) => {
            if map.contains_key("track") {
                map.get("track").cloned()
            } else if map.contains_key("title") {
                Some(body.clone())
            } else {
                None
            }
        }
        _ => None,
    };

    match track_value {
        Some(value) => match serde_json::from_value::<TrackMatch>(value) {
            Ok(track) if !track.title.is_empty() => RecognitionOutcome::Match(track),
            Ok(_) => RecognitionOutcome::NoMatch,
            Err(e) => {
                warn!("Unparseable track in recognition response: {}", e);
                RecognitionOutcome::NoMatch
            }
        },
        None => RecognitionOutcome::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_response_track_object() {
        let body = json!({
            "track": {
                "title": "Song X",
                "subtitle": "Artist Y",
                "key": "12345",
                "url": "https://www.shazam.com/track/12345",
                "images": {"coverart": "https://img.example/cover.jpg"},
                "hub": {"options": [], "providers": []}
            }
        });

        match parse_response(body) {
            RecognitionOutcome::Match(track) => {
                assert_eq!(track.title, "Song X");
                assert_eq!(track.subtitle, "Artist Y");
                assert_eq!(track.key, "12345");
            }
            RecognitionOutcome::NoMatch => panic!("expected a match"),
        }
    }

    #[test]
    fn test_parse_response_list_of_matches() {
        let body = json!([
            {"title": "First", "subtitle": "A"},
            {"title": "Second", "subtitle": "B"}
        ]);

        match parse_response(body) {
            RecognitionOutcome::Match(track) => assert_eq!(track.title, "First"),
            RecognitionOutcome::NoMatch => panic!("expected a match"),
        }
    }

    #[test]
    fn test_parse_response_direct_track() {
        let body = json!({"title": "Song X", "subtitle": "Artist Y"});

        match parse_response(body) {
            RecognitionOutcome::Match(track) => assert_eq!(track.subtitle, "Artist Y"),
            RecognitionOutcome::NoMatch => panic!("expected a match"),
        }
    }

    #[test]
    fn test_parse_response_no_match() {
        assert!(matches!(
            parse_response(json!({})),
            RecognitionOutcome::NoMatch
        ));
        assert!(matches!(
            parse_response(json!([])),
            RecognitionOutcome::NoMatch
        ));
        assert!(matches!(
            parse_response(json!(null)),
            RecognitionOutcome::NoMatch
        ));
        // A track without a title is not a usable match.
        assert!(matches!(
            parse_response(json!({"track": {"title": ""}})),
            RecognitionOutcome::NoMatch
        ));
    }

    #[test]
    fn test_parse_response_ignores_unknown_fields() {
        let body = json!({
            "track": {
                "title": "Song X",
                "subtitle": "Artist Y",
                "genres": {"primary": "Pop"},
                "sections": [{"type": "SONG"}]
            },
            "tagid": "abc",
            "timestamp": 123
        });

        assert!(matches!(
            parse_response(body),
            RecognitionOutcome::Match(_)
        ));
    }
}
