mod file_config;

pub use file_config::{FileConfig, IdentifyConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML
/// config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub extractor_url: Option<String>,
    pub extractor_timeout_sec: u64,
    pub recognizer_endpoint: String,
    pub recognizer_host: String,
    pub recognizer_timeout_sec: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_dir: None,
            temp_dir: None,
            port: 3001,
            metrics_port: 9091,
            extractor_url: None,
            extractor_timeout_sec: 300,
            recognizer_endpoint:
                "https://shazam-song-recognition-api.p.rapidapi.com/recognize/file".to_string(),
            recognizer_host: "shazam-song-recognition-api.p.rapidapi.com".to_string(),
            recognizer_timeout_sec: 60,
        }
    }
}

/// Settings for the identification pipeline.
#[derive(Debug, Clone)]
pub struct IdentifySettings {
    /// Number of concurrent pipeline workers.
    pub worker_count: usize,
    /// Whole-pipeline attempt ceiling for retryable failures.
    pub max_attempts: i32,
    /// Delay between pipeline attempts in seconds.
    pub retry_delay_secs: u64,
    /// Cap on the inter-attempt delay in seconds.
    pub max_retry_delay_secs: u64,
    /// Multiplier applied to the delay after each retry (1.0 = fixed).
    pub retry_multiplier: f64,
    /// How often the scheduler checks for due retries.
    pub retry_poll_interval_secs: u64,
    /// The extractor's internal attempt ceiling for transient failures.
    pub extraction_max_attempts: u32,
    /// Delay between the extractor's internal attempts.
    pub extraction_retry_delay_secs: u64,
    /// Length of the audio clip handed to recognition.
    pub clip_duration_secs: u32,
    /// Processing tasks older than this are failed at startup.
    pub stale_processing_threshold_secs: i64,
    /// Number of records returned by the trending query.
    pub trending_limit: usize,
}

impl Default for IdentifySettings {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_attempts: 3,
            retry_delay_secs: 5,
            max_retry_delay_secs: 300,
            retry_multiplier: 1.0,
            retry_poll_interval_secs: 1,
            extraction_max_attempts: 10,
            extraction_retry_delay_secs: 5,
            clip_duration_secs: 10,
            stale_processing_threshold_secs: 3600,
            trending_limit: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub extractor_url: String,
    pub extractor_timeout_sec: u64,
    pub recognizer_endpoint: String,
    pub recognizer_host: String,
    pub recognizer_timeout_sec: u64,

    // Feature config (with defaults)
    pub identify: IdentifySettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file
    /// config. TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let temp_dir = file
            .temp_dir
            .map(PathBuf::from)
            .or_else(|| cli.temp_dir.clone())
            .unwrap_or_else(std::env::temp_dir);

        let extractor_url = file
            .extractor_url
            .or_else(|| cli.extractor_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "extractor_url must be specified via --extractor-url or in config file"
                )
            })?;

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        let extractor_timeout_sec = file
            .extractor_timeout_sec
            .unwrap_or(cli.extractor_timeout_sec);
        let recognizer_endpoint = file
            .recognizer_endpoint
            .unwrap_or_else(|| cli.recognizer_endpoint.clone());
        let recognizer_host = file
            .recognizer_host
            .unwrap_or_else(|| cli.recognizer_host.clone());
        let recognizer_timeout_sec = file
            .recognizer_timeout_sec
            .unwrap_or(cli.recognizer_timeout_sec);

        // Identify settings - merge file config with defaults
        let id_file = file.identify.unwrap_or_default();
        let defaults = IdentifySettings::default();
        let identify = IdentifySettings {
            worker_count: id_file.worker_count.unwrap_or(defaults.worker_count).max(1),
            max_attempts: id_file.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            retry_delay_secs: id_file.retry_delay_secs.unwrap_or(defaults.retry_delay_secs),
            max_retry_delay_secs: id_file
                .max_retry_delay_secs
                .unwrap_or(defaults.max_retry_delay_secs),
            retry_multiplier: id_file.retry_multiplier.unwrap_or(defaults.retry_multiplier),
            retry_poll_interval_secs: id_file
                .retry_poll_interval_secs
                .unwrap_or(defaults.retry_poll_interval_secs)
                .max(1),
            extraction_max_attempts: id_file
                .extraction_max_attempts
                .unwrap_or(defaults.extraction_max_attempts)
                .max(1),
            extraction_retry_delay_secs: id_file
                .extraction_retry_delay_secs
                .unwrap_or(defaults.extraction_retry_delay_secs),
            clip_duration_secs: id_file
                .clip_duration_secs
                .unwrap_or(defaults.clip_duration_secs),
            stale_processing_threshold_secs: id_file
                .stale_processing_threshold_secs
                .unwrap_or(defaults.stale_processing_threshold_secs),
            trending_limit: id_file.trending_limit.unwrap_or(defaults.trending_limit),
        };

        Ok(Self {
            db_dir,
            temp_dir,
            port,
            metrics_port,
            extractor_url,
            extractor_timeout_sec,
            recognizer_endpoint,
            recognizer_host,
            recognizer_timeout_sec,
            identify,
        })
    }
}
