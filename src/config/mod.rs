mod file_config;

pub use file_config::{FileConfig, QueueFileConfig, SearchIndexFileConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that participate in config resolution. Mirrors the
/// fields a TOML config file can override.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub audio_dir: Option<PathBuf>,
    pub tmp_dir: Option<PathBuf>,
    pub port: u16,
    pub analysis_url: String,
    pub audio_base_url: Option<String>,
    pub analysis_timeout_sec: u64,
    pub tool_timeout_sec: u64,
    pub search_index_url: Option<String>,
    pub search_index_api_key: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_dir: None,
            audio_dir: None,
            tmp_dir: None,
            port: 3001,
            analysis_url: "http://essentia:8001/analyze".to_string(),
            audio_base_url: None,
            analysis_timeout_sec: 60,
            tool_timeout_sec: 300,
            search_index_url: None,
            search_index_api_key: None,
        }
    }
}

/// Per-queue settings.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub concurrency: usize,
    pub max_attempts: i32,
    pub initial_backoff_ms: u64,
    pub poll_interval: Duration,
    pub keep_completed: usize,
    pub keep_failed: usize,
}

impl QueueSettings {
    /// Download queue defaults: five workers, three attempts, backoff
    /// starting at two seconds.
    pub fn download_defaults() -> Self {
        Self {
            concurrency: 5,
            max_attempts: 3,
            initial_backoff_ms: 2000,
            poll_interval: Duration::from_millis(1000),
            keep_completed: 10,
            keep_failed: 50,
        }
    }

    /// Analyze queue defaults: three workers, two attempts, backoff
    /// starting at one second.
    pub fn analyze_defaults() -> Self {
        Self {
            concurrency: 3,
            max_attempts: 2,
            initial_backoff_ms: 1000,
            poll_interval: Duration::from_millis(1000),
            keep_completed: 10,
            keep_failed: 50,
        }
    }

    fn overlay(mut self, file: &QueueFileConfig) -> Self {
        if let Some(v) = file.concurrency {
            self.concurrency = v;
        }
        if let Some(v) = file.max_attempts {
            self.max_attempts = v;
        }
        if let Some(v) = file.initial_backoff_ms {
            self.initial_backoff_ms = v;
        }
        if let Some(v) = file.poll_interval_ms {
            self.poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = file.keep_completed {
            self.keep_completed = v;
        }
        if let Some(v) = file.keep_failed {
            self.keep_failed = v;
        }
        self
    }
}

/// Search index settings; absent means no index pushes.
#[derive(Debug, Clone)]
pub struct SearchIndexSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub index_name: String,
}

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    /// Where playback and waveform artifacts live.
    pub audio_dir: PathBuf,
    /// Scratch space for tool output directories.
    pub tmp_dir: PathBuf,
    pub port: u16,
    /// Feature-extraction service endpoint.
    pub analysis_url: String,
    /// URL prefix the extraction service fetches audio files from.
    pub audio_base_url: String,
    pub analysis_timeout: Duration,
    /// Timeout for yt-dlp and scdl invocations.
    pub tool_timeout: Duration,
    pub search_index: Option<SearchIndexSettings>,
    pub download_queue: QueueSettings,
    pub analyze_queue: QueueSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file.
    /// TOML values override CLI values where present.
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

        let audio_dir = file
            .audio_dir
            .map(PathBuf::from)
            .or_else(|| cli.audio_dir.clone())
            .unwrap_or_else(|| db_dir.join("audio"));
        let tmp_dir = file
            .tmp_dir
            .map(PathBuf::from)
            .or_else(|| cli.tmp_dir.clone())
            .unwrap_or_else(|| db_dir.join("tmp"));

        let port = file.port.unwrap_or(cli.port);
        let analysis_url = file.analysis_url.unwrap_or_else(|| cli.analysis_url.clone());
        let audio_base_url = file
            .audio_base_url
            .or_else(|| cli.audio_base_url.clone())
            .unwrap_or_else(|| format!("http://localhost:{}/api/audio", port));

        let analysis_timeout = Duration::from_secs(
            file.analysis_timeout_sec.unwrap_or(cli.analysis_timeout_sec),
        );
        let tool_timeout =
            Duration::from_secs(file.tool_timeout_sec.unwrap_or(cli.tool_timeout_sec));

        let si_file = file.search_index.unwrap_or_default();
        let search_index = si_file
            .url
            .or_else(|| cli.search_index_url.clone())
            .map(|url| SearchIndexSettings {
                url,
                api_key: si_file
                    .api_key
                    .or_else(|| cli.search_index_api_key.clone()),
                index_name: si_file.index_name.unwrap_or_else(|| "tracks".to_string()),
            });

        let download_queue = match &file.download_queue {
            Some(fq) => QueueSettings::download_defaults().overlay(fq),
            None => QueueSettings::download_defaults(),
        };
        let analyze_queue = match &file.analyze_queue {
            Some(fq) => QueueSettings::analyze_defaults().overlay(fq),
            None => QueueSettings::analyze_defaults(),
        };

        Ok(Self {
            db_dir,
            audio_dir,
            tmp_dir,
            port,
            analysis_url,
            audio_base_url,
            analysis_timeout,
            tool_timeout,
            search_index,
            download_queue,
            analyze_queue,
        })
    }

    pub fn jobs_db_path(&self) -> PathBuf {
        self.db_dir.join("jobs.db")
    }

    pub fn tracks_db_path(&self) -> PathBuf {
        self.db_dir.join("tracks.db")
    }

    pub fn settings_db_path(&self) -> PathBuf {
        self.db_dir.join("settings.db")
    }

    pub fn job_status_db_path(&self) -> PathBuf {
        self.db_dir.join("job_status.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_temp_db_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            port: 4001,
            search_index_url: Some("http://meili:7700".to_string()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, None).unwrap();
        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.port, 4001);
        assert_eq!(config.audio_dir, temp_dir.path().join("audio"));
        assert_eq!(config.tmp_dir, temp_dir.path().join("tmp"));
        assert_eq!(
            config.audio_base_url,
            "http://localhost:4001/api/audio"
        );
        let si = config.search_index.unwrap();
        assert_eq!(si.url, "http://meili:7700");
        assert_eq!(si.index_name, "tracks");
        assert_eq!(config.download_queue.concurrency, 5);
        assert_eq!(config.download_queue.max_attempts, 3);
        assert_eq!(config.download_queue.initial_backoff_ms, 2000);
        assert_eq!(config.analyze_queue.concurrency, 3);
        assert_eq!(config.analyze_queue.max_attempts, 2);
        assert_eq!(config.analyze_queue.initial_backoff_ms, 1000);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/should/be/overridden")),
            port: 3001,
            ..Default::default()
        };
        let file = FileConfig {
            db_dir: Some(temp_dir.path().to_string_lossy().to_string()),
            port: Some(5000),
            analysis_url: Some("http://extractor:9000/analyze".to_string()),
            download_queue: Some(QueueFileConfig {
                concurrency: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file)).unwrap();
        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.port, 5000);
        assert_eq!(config.analysis_url, "http://extractor:9000/analyze");
        assert_eq!(config.download_queue.concurrency, 2);
        // Non-overridden queue fields keep their defaults.
        assert_eq!(config.download_queue.max_attempts, 3);
    }

    #[test]
    fn test_resolve_missing_db_dir_fails() {
        let result = AppConfig::resolve(&CliConfig::default(), None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("db_dir must be specified"));
    }

    #[test]
    fn test_resolve_nonexistent_db_dir_fails() {
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/nonexistent/path/nowhere")),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_resolve_without_search_index() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert!(config.search_index.is_none());
    }

    #[test]
    fn test_db_path_helpers() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.jobs_db_path(), temp_dir.path().join("jobs.db"));
        assert_eq!(config.tracks_db_path(), temp_dir.path().join("tracks.db"));
        assert_eq!(
            config.settings_db_path(),
            temp_dir.path().join("settings.db")
        );
        assert_eq!(
            config.job_status_db_path(),
            temp_dir.path().join("job_status.db")
        );
    }
}
