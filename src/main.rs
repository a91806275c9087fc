use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use collection_audio_server::config::{AppConfig, CliConfig, FileConfig};
use collection_audio_server::job_queue::{
    RetryPolicy, SqliteJobQueueStore, WorkerPool, WorkerPoolConfig,
};
use collection_audio_server::job_status::{JobStatusManager, SqliteJobStatusStore};
use collection_audio_server::pipeline::{
    AnalysisClient, AnalyzeJobHandler, AudioSourceStrategy, DownloadJobHandler, FormatConverter,
    ProcessRunner, ResultWriter,
};
use collection_audio_server::search_index::{HttpSearchIndex, NoOpSearchIndex, SearchIndex};
use collection_audio_server::server::{run_server, ServerState};
use collection_audio_server::settings::SqliteSettingsStore;
use collection_audio_server::track_store::SqliteTrackStore;

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
    /// Directory holding the SQLite databases.
    #[clap(value_parser = parse_path)]
    pub db_dir: PathBuf,

    /// Directory for playback and waveform audio files.
    #[clap(long, value_parser = parse_path)]
    pub audio_dir: Option<PathBuf>,

    /// Scratch directory for download tool output.
    #[clap(long, value_parser = parse_path)]
    pub tmp_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// Feature-extraction service endpoint.
    #[clap(long, default_value = "http://essentia:8001/analyze")]
    pub analysis_url: String,

    /// URL prefix the extraction service fetches audio files from.
    /// Defaults to this server's own /api/audio route.
    #[clap(long)]
    pub audio_base_url: Option<String>,

    /// Timeout in seconds for analysis service requests.
    #[clap(long, default_value_t = 60)]
    pub analysis_timeout_sec: u64,

    /// Timeout in seconds for yt-dlp and scdl invocations.
    #[clap(long, default_value_t = 300)]
    pub tool_timeout_sec: u64,

    /// Search index URL. Index pushes are disabled when absent.
    #[clap(long)]
    pub search_index_url: Option<String>,

    /// API key for the search index.
    #[clap(long)]
    pub search_index_api_key: Option<String>,

    /// Optional TOML config file; file values override CLI values.
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
        db_dir: Some(cli_args.db_dir.clone()),
        audio_dir: cli_args.audio_dir.clone(),
        tmp_dir: cli_args.tmp_dir.clone(),
        port: cli_args.port,
        analysis_url: cli_args.analysis_url.clone(),
        audio_base_url: cli_args.audio_base_url.clone(),
        analysis_timeout_sec: cli_args.analysis_timeout_sec,
        tool_timeout_sec: cli_args.tool_timeout_sec,
        search_index_url: cli_args.search_index_url.clone(),
        search_index_api_key: cli_args.search_index_api_key.clone(),
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    tokio::fs::create_dir_all(&config.audio_dir).await?;
    tokio::fs::create_dir_all(&config.tmp_dir).await?;

    info!("Opening databases in {:?}...", config.db_dir);
    let queue_store = Arc::new(SqliteJobQueueStore::open(config.jobs_db_path())?);
    let track_store = Arc::new(SqliteTrackStore::open(config.tracks_db_path())?);
    let settings_store = Arc::new(SqliteSettingsStore::open(config.settings_db_path())?);
    let job_status_store = Arc::new(SqliteJobStatusStore::open(config.job_status_db_path())?);

    let search_index: Arc<dyn SearchIndex> = match &config.search_index {
        Some(settings) => {
            info!("Search index configured at {}", settings.url);
            Arc::new(HttpSearchIndex::new(
                settings.url.clone(),
                settings.index_name.clone(),
                settings.api_key.clone(),
            )?)
        }
        None => {
            info!("No search index configured, index pushes disabled");
            Arc::new(NoOpSearchIndex)
        }
    };

    // Pipeline stages share one process runner.
    let runner = Arc::new(ProcessRunner);
    let strategy = Arc::new(AudioSourceStrategy::new(
        runner.clone(),
        config.tmp_dir.clone(),
        config.tool_timeout,
    ));
    let converter = Arc::new(FormatConverter::new(runner, config.audio_dir.clone()));
    let analyzer = Arc::new(AnalysisClient::new(
        config.analysis_url.clone(),
        config.audio_base_url.clone(),
        config.analysis_timeout,
    )?);
    let result_writer = Arc::new(ResultWriter::new(track_store.clone(), search_index));

    let download_handler = Arc::new(DownloadJobHandler::new(
        queue_store.clone(),
        strategy,
        converter.clone(),
        config.analyze_queue.max_attempts,
    ));
    let analyze_handler = Arc::new(AnalyzeJobHandler::new(analyzer, result_writer, converter));

    let shutdown = CancellationToken::new();

    let download_pool = Arc::new(WorkerPool::new(
        queue_store.clone(),
        download_handler,
        RetryPolicy::new(
            config.download_queue.max_attempts,
            config.download_queue.initial_backoff_ms,
        ),
        WorkerPoolConfig {
            concurrency: config.download_queue.concurrency,
            poll_interval: config.download_queue.poll_interval,
            keep_completed: config.download_queue.keep_completed,
            keep_failed: config.download_queue.keep_failed,
        },
    ));
    let analyze_pool = Arc::new(WorkerPool::new(
        queue_store.clone(),
        analyze_handler,
        RetryPolicy::new(
            config.analyze_queue.max_attempts,
            config.analyze_queue.initial_backoff_ms,
        ),
        WorkerPoolConfig {
            concurrency: config.analyze_queue.concurrency,
            poll_interval: config.analyze_queue.poll_interval,
            keep_completed: config.analyze_queue.keep_completed,
            keep_failed: config.analyze_queue.keep_failed,
        },
    ));

    let mut worker_handles = download_pool.spawn(shutdown.clone());
    worker_handles.extend(analyze_pool.spawn(shutdown.clone()));

    let job_status = Arc::new(JobStatusManager::new(job_status_store, settings_store.clone()));

    let state = ServerState {
        start_time: Instant::now(),
        hash: env!("GIT_HASH").to_string(),
        queue_store,
        job_status,
        settings_store,
        download_max_attempts: config.download_queue.max_attempts,
        audio_dir: config.audio_dir.clone(),
    };

    // Ctrl-c flips the token; workers and the server drain and stop.
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Shutdown signal received");
            shutdown.cancel();
        });
    }

    info!("Ready to serve at port {}!", config.port);
    let serve_result = run_server(state, config.port, shutdown.clone()).await;

    shutdown.cancel();
    futures::future::join_all(worker_handles).await;
    info!("Workers stopped");

    serve_result
}
