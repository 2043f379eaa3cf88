//! HTTP client for the external audio extraction service.
//!
//! The service wraps the actual media fetch; this client owns the retry
//! loop for transient failures (rate limits, login walls, flaky proxies)
//! and surfaces a terminal classification once its attempts are exhausted.

use super::{AudioClip, AudioExtractor};
use crate::identify::models::{ErrorKind, IdentifyError};
use async_trait::async_trait;
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// How an HTTP status from the extraction service is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusClass {
    /// Give up immediately with this kind.
    Fatal(ErrorKind),
    /// Retry; surface this kind once attempts are exhausted.
    Transient(ErrorKind),
}

/// Map an extraction-service status code to its handling.
///
/// Access-denied responses are transient because the service rotates
/// sessions between attempts; only after exhaustion do they mean the
/// account is actually private.
pub(crate) fn classify_status(status: u16) -> StatusClass {
    match status {
        400 => StatusClass::Fatal(ErrorKind::InvalidUrl),
        404 | 410 => StatusClass::Fatal(ErrorKind::ContentNotFound),
        401 | 403 => StatusClass::Transient(ErrorKind::PrivateAccount),
        429 => StatusClass::Transient(ErrorKind::RateLimited),
        _ => StatusClass::Transient(ErrorKind::DownloadError),
    }
}

/// HTTP-backed extraction collaborator.
pub struct HttpAudioExtractor {
    client: reqwest::Client,
    base_url: String,
    temp_dir: PathBuf,
    max_attempts: u32,
    retry_delay: Duration,
}

impl HttpAudioExtractor {
    /// Create a new extractor client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the extraction service
    /// * `timeout_sec` - Per-request timeout in seconds
    /// * `temp_dir` - Directory for extracted clip files
    /// * `max_attempts` - Internal attempt ceiling for transient failures
    /// * `retry_delay_secs` - Delay between internal attempts
    pub fn new(
        base_url: String,
        timeout_sec: u64,
        temp_dir: PathBuf,
        max_attempts: u32,
        retry_delay_secs: u64,
    ) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            temp_dir,
            max_attempts: max_attempts.max(1),
            retry_delay: Duration::from_secs(retry_delay_secs),
        })
    }

    /// Perform one fetch attempt, streaming the clip to a temp file.
    async fn fetch_once(
        &self,
        url: &str,
        max_duration_secs: u32,
    ) -> Result<AudioClip, StatusClass> {
        let request_url = format!(
            "{}/extract?url={}&max_duration={}",
            self.base_url,
            urlencoding::encode(url),
            max_duration_secs
        );

        let response = self
            .client
            .get(&request_url)
            .send()
            .await
            .map_err(|e| {
                warn!("Extraction request failed: {}", e);
                StatusClass::Transient(ErrorKind::NetworkError)
            })?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(classify_status(status));
        }

        let mut file = tempfile::Builder::new()
            .prefix("clip-")
            .suffix(".audio")
            .tempfile_in(&self.temp_dir)
            .map_err(|e| {
                warn!("Failed to create clip temp file: {}", e);
                StatusClass::Fatal(ErrorKind::DownloadError)
            })?;

        let mut size_bytes: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                warn!("Extraction stream interrupted: {}", e);
                StatusClass::Transient(ErrorKind::NetworkError)
            })?;
            file.write_all(&chunk)
                .map_err(|_| StatusClass::Fatal(ErrorKind::DownloadError))?;
            size_bytes += chunk.len() as u64;
        }
        file.flush()
            .map_err(|_| StatusClass::Fatal(ErrorKind::DownloadError))?;

        if size_bytes == 0 {
            return Err(StatusClass::Transient(ErrorKind::DownloadError));
        }

        let path = file.into_temp_path();
        let media_type = infer::get_from_path(&*path)
            .ok()
            .flatten()
            .map(|t| t.mime_type().to_string());

        Ok(AudioClip::new(path, media_type, size_bytes))
    }
}

#[async_trait]
impl AudioExtractor for HttpAudioExtractor {
    async fn extract(
        &self,
        url: &str,
        max_duration_secs: u32,
    ) -> Result<AudioClip, IdentifyError> {
        let mut last_kind = ErrorKind::DownloadError;

        for attempt in 1..=self.max_attempts {
            match self.fetch_once(url, max_duration_secs).await {
                Ok(clip) => {
                    info!(
                        "Extracted {} bytes from {} on attempt {}/{}",
                        clip.size_bytes(),
                        url,
                        attempt,
                        self.max_attempts
                    );
                    return Ok(clip);
                }
                Err(StatusClass::Fatal(kind)) => {
                    return Err(IdentifyError::new(
                        kind,
                        format!("Extraction failed for {}", url),
                    ));
                }
                Err(StatusClass::Transient(kind)) => {
                    last_kind = kind;
                    if attempt < self.max_attempts {
                        warn!(
                            "Extraction attempt {}/{} failed for {} ({}), retrying in {:?}",
                            attempt, self.max_attempts, url, kind, self.retry_delay
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(IdentifyError::new(
            last_kind,
            match last_kind {
                ErrorKind::PrivateAccount => {
                    "Cannot access content from private accounts".to_string()
                }
                ErrorKind::RateLimited => {
                    "Extraction rate limited after all attempts".to_string()
                }
                _ => format!(
                    "Extraction failed after {} attempts for {}",
                    self.max_attempts, url
                ),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_fatal() {
        assert_eq!(
            classify_status(400),
            StatusClass::Fatal(ErrorKind::InvalidUrl)
        );
        assert_eq!(
            classify_status(404),
            StatusClass::Fatal(ErrorKind::ContentNotFound)
        );
        assert_eq!(
            classify_status(410),
            StatusClass::Fatal(ErrorKind::ContentNotFound)
        );
    }

    #[test]
    fn test_classify_status_transient() {
        assert_eq!(
            classify_status(403),
            StatusClass::Transient(ErrorKind::PrivateAccount)
        );
        assert_eq!(
            classify_status(429),
            StatusClass::Transient(ErrorKind::RateLimited)
        );
        assert_eq!(
            classify_status(500),
            StatusClass::Transient(ErrorKind::DownloadError)
        );
        assert_eq!(
            classify_status(503),
            StatusClass::Transient(ErrorKind::DownloadError)
        );
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let extractor = HttpAudioExtractor::new(
            "http://localhost:9000/".to_string(),
            10,
            std::env::temp_dir(),
            10,
            5,
        )
        .unwrap();
        assert_eq!(extractor.base_url, "http://localhost:9000");
    }

    #[test]
    fn test_max_attempts_floor() {
        let extractor = HttpAudioExtractor::new(
            "http://localhost:9000".to_string(),
            10,
            std::env::temp_dir(),
            0,
            5,
        )
        .unwrap();
        assert_eq!(extractor.max_attempts, 1);
    }
}
