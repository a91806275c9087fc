//! TOML file configuration.
//!
//! Every field is optional; file values override CLI values during
//! resolution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Top-level TOML config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub db_dir: Option<String>,
    pub audio_dir: Option<String>,
    pub tmp_dir: Option<String>,
    pub port: Option<u16>,
    pub analysis_url: Option<String>,
    pub audio_base_url: Option<String>,
    pub analysis_timeout_sec: Option<u64>,
    pub tool_timeout_sec: Option<u64>,
    pub search_index: Option<SearchIndexFileConfig>,
    pub download_queue: Option<QueueFileConfig>,
    pub analyze_queue: Option<QueueFileConfig>,
}

/// `[search_index]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchIndexFileConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub index_name: Option<String>,
}

/// `[download_queue]` / `[analyze_queue]` sections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueFileConfig {
    pub concurrency: Option<usize>,
    pub max_attempts: Option<i32>,
    pub initial_backoff_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub keep_completed: Option<usize>,
    pub keep_failed: Option<usize>,
}

impl FileConfig {
    /// Load and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
db_dir = "/data"
port = 4000
analysis_url = "http://essentia:8001/analyze"

[search_index]
url = "http://meili:7700"
api_key = "secret"

[download_queue]
concurrency = 2
max_attempts = 5
"#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.db_dir.as_deref(), Some("/data"));
        assert_eq!(config.port, Some(4000));
        assert_eq!(
            config.search_index.as_ref().unwrap().url.as_deref(),
            Some("http://meili:7700")
        );
        let dq = config.download_queue.unwrap();
        assert_eq!(dq.concurrency, Some(2));
        assert_eq!(dq.max_attempts, Some(5));
        assert!(config.analyze_queue.is_none());
    }

    #[test]
    fn test_load_empty_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "").unwrap();
        let config = FileConfig::load(file.path()).unwrap();
        assert!(config.db_dir.is_none());
        assert!(config.port.is_none());
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not [valid").unwrap();
        assert!(FileConfig::load(file.path()).is_err());
    }
}
