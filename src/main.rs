use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reelsong_server::config::{AppConfig, CliConfig, FileConfig};
use reelsong_server::extraction::HttpAudioExtractor;
use reelsong_server::identify::{
    IdentifyManager, IdentifyPipeline, RetryPolicy, SqliteSongStore, SqliteTaskStore, WorkerPool,
};
use reelsong_server::recognition::ShazamClient;
use reelsong_server::server::{metrics, run_server, ServerState};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the SQLite databases (songs and tasks).
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Directory for temporary audio clip files.
    #[clap(long, value_parser = parse_path)]
    pub temp_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// URL of the audio extraction service.
    #[clap(long)]
    pub extractor_url: Option<String>,

    /// Timeout in seconds for extraction requests.
    #[clap(long, default_value_t = 300)]
    pub extractor_timeout_sec: u64,

    /// Recognition API endpoint.
    #[clap(
        long,
        default_value = "https://shazam-song-recognition-api.p.rapidapi.com/recognize/file"
    )]
    pub recognizer_endpoint: String,

    /// Recognition API host header.
    #[clap(long, default_value = "shazam-song-recognition-api.p.rapidapi.com")]
    pub recognizer_host: String,

    /// Timeout in seconds for recognition requests.
    #[clap(long, default_value_t = 60)]
    pub recognizer_timeout_sec: u64,

    /// Path to a TOML config file. File values override CLI values.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir,
        temp_dir: cli_args.temp_dir,
        port: cli_args.port,
        metrics_port: cli_args.metrics_port,
        extractor_url: cli_args.extractor_url,
        extractor_timeout_sec: cli_args.extractor_timeout_sec,
        recognizer_endpoint: cli_args.recognizer_endpoint,
        recognizer_host: cli_args.recognizer_host,
        recognizer_timeout_sec: cli_args.recognizer_timeout_sec,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    let rapidapi_key = std::env::var("RAPIDAPI_KEY").unwrap_or_default();
    if rapidapi_key.is_empty() {
        tracing::warn!("RAPIDAPI_KEY is not set; recognition requests will fail");
    }

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!("Opening stores in {:?}...", config.db_dir);
    let song_store = Arc::new(SqliteSongStore::new(config.db_dir.join("songs.db"))?);
    let task_store = Arc::new(SqliteTaskStore::new(config.db_dir.join("tasks.db"))?);

    std::fs::create_dir_all(&config.temp_dir)
        .with_context(|| format!("Failed to create temp dir {:?}", config.temp_dir))?;

    let extractor = Arc::new(HttpAudioExtractor::new(
        config.extractor_url.clone(),
        config.extractor_timeout_sec,
        config.temp_dir.clone(),
        config.identify.extraction_max_attempts,
        config.identify.extraction_retry_delay_secs,
    )?);
    let recognizer = Arc::new(ShazamClient::new(
        config.recognizer_endpoint.clone(),
        config.recognizer_host.clone(),
        rapidapi_key,
        config.recognizer_timeout_sec,
    )?);

    let pipeline = Arc::new(IdentifyPipeline::new(
        task_store.clone(),
        song_store.clone(),
        extractor,
        recognizer,
        RetryPolicy::new(&config.identify),
        config.identify.clip_duration_secs,
    ));

    let shutdown = tokio_util::sync::CancellationToken::new();

    info!(
        "Starting {} identification worker(s)...",
        config.identify.worker_count
    );
    let pool = WorkerPool::start(
        pipeline,
        task_store.clone(),
        &config.identify,
        shutdown.clone(),
    )?;

    let manager = Arc::new(IdentifyManager::new(
        task_store,
        song_store,
        pool.queue(),
        config.identify.clone(),
    ));

    // Ctrl-C triggers a coordinated shutdown of server and workers.
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_shutdown.cancel();
        }
    });

    info!("Ready to serve at port {}!", config.port);
    let state = ServerState::new(manager);
    let result = run_server(state, config.port, config.metrics_port, shutdown.clone()).await;

    pool.shutdown().await;
    result
}
