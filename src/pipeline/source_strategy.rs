//! Source-fallback download strategy.
//!
//! Given a track's candidate source URLs and an optional preferred tool,
//! works through an explicit attempt plan until one tool produces a
//! non-empty audio file. Tool failures are logged and the chain continues;
//! only exhaustion of the whole plan surfaces as an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use super::error::PipelineError;
use super::tools::{CommandRunner, ToolError};
use crate::job_queue::DownloaderKind;
use crate::settings::{AcquisitionSettings, AudioFormat};

/// Timeout for the catalog-grab (freyr) and metadata-driven (spotdl) tools.
const CATALOG_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// The source platforms a track may link to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    AppleMusic,
    Spotify,
    Youtube,
    Soundcloud,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::AppleMusic => "apple-music",
            SourceKind::Spotify => "spotify",
            SourceKind::Youtube => "youtube",
            SourceKind::Soundcloud => "soundcloud",
        }
    }
}

/// Candidate URLs for one acquisition.
#[derive(Debug, Clone, Default)]
pub struct SourceUrls {
    pub apple_music: Option<String>,
    pub spotify: Option<String>,
    pub youtube: Option<String>,
    pub soundcloud: Option<String>,
}

impl SourceUrls {
    fn get(&self, source: SourceKind) -> Option<&str> {
        match source {
            SourceKind::AppleMusic => self.apple_music.as_deref(),
            SourceKind::Spotify => self.spotify.as_deref(),
            SourceKind::Youtube => self.youtube.as_deref(),
            SourceKind::Soundcloud => self.soundcloud.as_deref(),
        }
    }
}

/// One planned (tool, source URL) invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub tool: DownloaderKind,
    pub source: SourceKind,
    pub url: String,
}

/// Why a single attempt failed.
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("exit code {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("no non-empty .{ext} file produced")]
    NoOutput { ext: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Chooses and invokes the external download tools.
pub struct AudioSourceStrategy {
    runner: Arc<dyn CommandRunner>,
    tmp_dir: PathBuf,
    /// Timeout for yt-dlp and scdl runs.
    tool_timeout: Duration,
}

impl AudioSourceStrategy {
    pub fn new(runner: Arc<dyn CommandRunner>, tmp_dir: PathBuf, tool_timeout: Duration) -> Self {
        Self {
            runner,
            tmp_dir,
            tool_timeout,
        }
    }

    /// Compute the ordered attempt plan.
    ///
    /// A preferred tool applicable to an available URL goes first, then the
    /// base precedence (freyr for apple-music, freyr then spotdl for
    /// spotify, yt-dlp for youtube, scdl for soundcloud), skipping pairs
    /// already planned.
    pub fn attempt_plan(urls: &SourceUrls, preferred: Option<DownloaderKind>) -> Vec<Attempt> {
        let base: &[(DownloaderKind, SourceKind)] = &[
            (DownloaderKind::Freyr, SourceKind::AppleMusic),
            (DownloaderKind::Freyr, SourceKind::Spotify),
            (DownloaderKind::Spotdl, SourceKind::Spotify),
            (DownloaderKind::Ytdlp, SourceKind::Youtube),
            (DownloaderKind::Scdl, SourceKind::Soundcloud),
        ];

        let mut plan: Vec<Attempt> = Vec::new();
        let push = |tool: DownloaderKind, source: SourceKind, plan: &mut Vec<Attempt>| {
            if let Some(url) = urls.get(source) {
                let already = plan.iter().any(|a| a.tool == tool && a.source == source);
                if !already {
                    plan.push(Attempt {
                        tool,
                        source,
                        url: url.to_string(),
                    });
                }
            }
        };

        if let Some(tool) = preferred {
            // First source in base order the preferred tool can serve.
            for (candidate, source) in base {
                if *candidate == tool {
                    if urls.get(*source).is_some() {
                        push(tool, *source, &mut plan);
                        break;
                    }
                }
            }
        }

        for (tool, source) in base {
            push(*tool, *source, &mut plan);
        }

        plan
    }

    /// Run the plan until one attempt yields a local audio file.
    pub async fn acquire(
        &self,
        urls: &SourceUrls,
        preferred: Option<DownloaderKind>,
        settings: &AcquisitionSettings,
    ) -> Result<PathBuf, PipelineError> {
        let plan = Self::attempt_plan(urls, preferred);
        if plan.is_empty() {
            return Err(PipelineError::NoSourceUrls);
        }

        let mut failures: Vec<String> = Vec::new();
        for attempt in &plan {
            info!(
                "Attempting {} download via {}: {}",
                attempt.source.as_str(),
                attempt.tool.as_str(),
                attempt.url
            );
            match self.run_attempt(attempt, settings).await {
                Ok(path) => {
                    info!(
                        "Acquired {} from {} via {}",
                        path.display(),
                        attempt.source.as_str(),
                        attempt.tool.as_str()
                    );
                    return Ok(path);
                }
                Err(e) => {
                    warn!(
                        "{} download via {} failed, trying next source: {}",
                        attempt.source.as_str(),
                        attempt.tool.as_str(),
                        e
                    );
                    failures.push(format!(
                        "{}/{}: {}",
                        attempt.tool.as_str(),
                        attempt.source.as_str(),
                        e
                    ));
                }
            }
        }

        Err(PipelineError::AllSourcesFailed(failures.join("; ")))
    }

    async fn run_attempt(
        &self,
        attempt: &Attempt,
        settings: &AcquisitionSettings,
    ) -> Result<PathBuf, AttemptError> {
        match attempt.tool {
            DownloaderKind::Freyr => self.run_freyr(&attempt.url).await,
            DownloaderKind::Spotdl => self.run_spotdl(&attempt.url, settings).await,
            DownloaderKind::Ytdlp => self.run_ytdlp(&attempt.url, settings).await,
            DownloaderKind::Scdl => self.run_scdl(&attempt.url).await,
        }
    }

    async fn run_freyr(&self, url: &str) -> Result<PathBuf, AttemptError> {
        let out_dir = self.fresh_dir("freyr")?;
        let args = vec![
            "get".to_string(),
            "--no-tree".to_string(),
            "--directory".to_string(),
            out_dir.to_string_lossy().to_string(),
            url.to_string(),
        ];
        let output = self.runner.run("freyr", &args, CATALOG_TOOL_TIMEOUT).await?;
        if !output.success {
            return Err(AttemptError::ExitStatus {
                code: output.exit_code,
                stderr: output.stderr_excerpt(),
            });
        }
        Self::newest_nonempty_file(&out_dir, "m4a")
    }

    async fn run_spotdl(
        &self,
        url: &str,
        settings: &AcquisitionSettings,
    ) -> Result<PathBuf, AttemptError> {
        let out_dir = self.fresh_dir("spotdl")?;
        let format = spotdl_format(settings.audio_format);
        let args = vec![
            "download".to_string(),
            url.to_string(),
            "--output".to_string(),
            out_dir.to_string_lossy().to_string(),
            "--format".to_string(),
            format.to_string(),
        ];
        let output = self.runner.run("spotdl", &args, CATALOG_TOOL_TIMEOUT).await?;
        if !output.success {
            return Err(AttemptError::ExitStatus {
                code: output.exit_code,
                stderr: output.stderr_excerpt(),
            });
        }
        Self::newest_nonempty_file(&out_dir, format)
    }

    async fn run_ytdlp(
        &self,
        url: &str,
        settings: &AcquisitionSettings,
    ) -> Result<PathBuf, AttemptError> {
        std::fs::create_dir_all(&self.tmp_dir)?;
        let format = ytdlp_format(settings.audio_format);
        let out_file = self.tmp_dir.join(format!(
            "youtube_{}_{}.{}",
            chrono::Utc::now().timestamp_millis(),
            rand::random::<u32>() % 1_000_000,
            format
        ));
        let args = vec![
            "-f".to_string(),
            "bestaudio/best".to_string(),
            "-x".to_string(),
            "--audio-format".to_string(),
            format.to_string(),
            "-o".to_string(),
            out_file.to_string_lossy().to_string(),
            url.to_string(),
        ];
        let output = self.runner.run("yt-dlp", &args, self.tool_timeout).await?;
        if !output.success {
            return Err(AttemptError::ExitStatus {
                code: output.exit_code,
                stderr: output.stderr_excerpt(),
            });
        }
        match std::fs::metadata(&out_file) {
            Ok(meta) if meta.len() > 0 => Ok(out_file),
            _ => Err(AttemptError::NoOutput {
                ext: format.to_string(),
            }),
        }
    }

    async fn run_scdl(&self, url: &str) -> Result<PathBuf, AttemptError> {
        let out_dir = self.fresh_dir("scdl")?;
        let args = vec![
            "-l".to_string(),
            url.to_string(),
            "--path".to_string(),
            out_dir.to_string_lossy().to_string(),
            "--onlymp3".to_string(),
            "--addtofile".to_string(),
        ];
        let output = self.runner.run("scdl", &args, self.tool_timeout).await?;
        if !output.success {
            return Err(AttemptError::ExitStatus {
                code: output.exit_code,
                stderr: output.stderr_excerpt(),
            });
        }
        Self::newest_nonempty_file(&out_dir, "mp3")
    }

    /// A fresh per-attempt output directory under the tmp dir.
    fn fresh_dir(&self, prefix: &str) -> Result<PathBuf, std::io::Error> {
        let dir = self.tmp_dir.join(format!(
            "{}_{}_{}",
            prefix,
            chrono::Utc::now().timestamp_millis(),
            rand::random::<u32>() % 1_000_000
        ));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Newest non-empty file with the expected extension, if any.
    ///
    /// A zero-byte file counts as no output at all.
    fn newest_nonempty_file(dir: &Path, ext: &str) -> Result<PathBuf, AttemptError> {
        let mut candidates: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let matches_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(ext))
                .unwrap_or(false);
            if !matches_ext {
                continue;
            }
            let meta = entry.metadata()?;
            if meta.len() == 0 {
                continue;
            }
            let mtime = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            candidates.push((path, mtime));
        }

        candidates.sort_by(|a, b| b.1.cmp(&a.1));
        candidates
            .into_iter()
            .next()
            .map(|(path, _)| path)
            .ok_or_else(|| AttemptError::NoOutput {
                ext: ext.to_string(),
            })
    }
}

/// Formats spotdl can emit directly.
fn spotdl_format(format: AudioFormat) -> &'static str {
    match format {
        AudioFormat::M4a => "m4a",
        AudioFormat::Flac => "flac",
        // spotdl has no plain aac output, mp3 is the safe default.
        AudioFormat::Mp3 | AudioFormat::Aac => "mp3",
    }
}

/// Formats yt-dlp can extract to.
fn ytdlp_format(format: AudioFormat) -> &'static str {
    match format {
        AudioFormat::Mp3 => "mp3",
        AudioFormat::Aac => "aac",
        AudioFormat::Flac => "flac",
        AudioFormat::M4a => "m4a",
    }
}
