use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub temp_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub extractor_url: Option<String>,
    pub extractor_timeout_sec: Option<u64>,
    pub recognizer_endpoint: Option<String>,
    pub recognizer_host: Option<String>,
    pub recognizer_timeout_sec: Option<u64>,

    // Feature configs
    pub identify: Option<IdentifyConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct IdentifyConfig {
    pub worker_count: Option<usize>,
    pub max_attempts: Option<i32>,
    pub retry_delay_secs: Option<u64>,
    pub max_retry_delay_secs: Option<u64>,
    pub retry_multiplier: Option<f64>,
    pub retry_poll_interval_secs: Option<u64>,
    pub extraction_max_attempts: Option<u32>,
    pub extraction_retry_delay_secs: Option<u64>,
    pub clip_duration_secs: Option<u32>,
    pub stale_processing_threshold_secs: Option<i64>,
    pub trending_limit: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
