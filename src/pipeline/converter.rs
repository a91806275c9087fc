//! Audio format conversion using ffmpeg.
//!
//! Turns one acquired file into a mono analysis waveform and a compressed
//! playback file, both under collision-resistant generated names, and
//! archives the original alongside them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use super::tools::{CommandRunner, ToolError};

/// ffmpeg runs are local transcodes; ten minutes is generous headroom.
const FFMPEG_TIMEOUT: Duration = Duration::from_secs(600);

/// Errors that can occur during audio conversion.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("ffmpeg failed: {0}")]
    ConversionFailed(String),

    #[error("all playback encoders failed: {0}")]
    AllEncodersFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),
}

/// Container of the produced playback file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackFormat {
    M4a,
    Mp3,
}

impl PlaybackFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackFormat::M4a => "m4a",
            PlaybackFormat::Mp3 => "mp3",
        }
    }
}

/// The artifacts produced from one acquired file.
#[derive(Debug, Clone)]
pub struct ConvertedAudio {
    /// Mono waveform for the analysis service, deleted after analysis.
    pub wav_file_name: String,
    /// Compressed playback file served to users.
    pub playback_file_name: String,
    /// Archived copy of the original download.
    pub original_file_name: String,
    pub playback_format: PlaybackFormat,
}

/// Converts acquired audio into the pipeline's artifacts.
pub struct FormatConverter {
    runner: Arc<dyn CommandRunner>,
    audio_dir: PathBuf,
}

impl FormatConverter {
    pub fn new(runner: Arc<dyn CommandRunner>, audio_dir: PathBuf) -> Self {
        Self { runner, audio_dir }
    }

    /// Convert `input` into wav + playback artifacts and archive the
    /// original. The temporary input file is removed on success.
    pub async fn convert(&self, input: &Path) -> Result<ConvertedAudio, ConversionError> {
        tokio::fs::create_dir_all(&self.audio_dir).await?;

        let base_name = generate_base_name();

        // Mono waveform for the feature extractor.
        let wav_file_name = format!("{}.wav", base_name);
        let wav_dest = self.audio_dir.join(&wav_file_name);
        self.run_ffmpeg(
            input,
            &["-ac".to_string(), "1".to_string()],
            &wav_dest,
        )
        .await
        .map_err(|e| ConversionError::ConversionFailed(format!("wav downmix: {}", e)))?;
        info!("Converted to wav: {}", wav_dest.display());

        // Compressed playback file, with encoder fallbacks.
        let (playback_file_name, playback_format) = self.convert_playback(input, &base_name).await?;

        // Archive the original next to the artifacts.
        let ext = input
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("m4a")
            .to_lowercase();
        let original_file_name = format!("{}.{}", base_name, ext);
        tokio::fs::copy(input, self.audio_dir.join(&original_file_name)).await?;
        info!("Audio saved to: {}", self.audio_dir.join(&original_file_name).display());

        self.cleanup_file(input).await;

        Ok(ConvertedAudio {
            wav_file_name,
            playback_file_name,
            original_file_name,
            playback_format,
        })
    }

    /// Encoder chain: libfdk_aac, then the stock aac encoder, then mp3.
    async fn convert_playback(
        &self,
        input: &Path,
        base_name: &str,
    ) -> Result<(String, PlaybackFormat), ConversionError> {
        let encoders: &[(&[&str], &str, PlaybackFormat)] = &[
            (&["-c:a", "libfdk_aac", "-b:a", "256k"], "m4a", PlaybackFormat::M4a),
            (&["-c:a", "aac", "-b:a", "192k"], "m4a", PlaybackFormat::M4a),
            (&["-c:a", "libmp3lame", "-b:a", "192k"], "mp3", PlaybackFormat::Mp3),
        ];

        let mut failures: Vec<String> = Vec::new();
        for (encoder_args, ext, format) in encoders {
            let file_name = format!("{}.{}", base_name, ext);
            let dest = self.audio_dir.join(&file_name);
            let args: Vec<String> = encoder_args.iter().map(|s| s.to_string()).collect();

            match self.run_ffmpeg(input, &args, &dest).await {
                Ok(()) => return Ok((file_name, *format)),
                Err(e) => {
                    warn!(
                        "Playback encode with {} failed, falling back: {}",
                        encoder_args[1], e
                    );
                    failures.push(format!("{}: {}", encoder_args[1], e));
                    // A failed run may leave a partial file behind.
                    self.cleanup_file(&dest).await;
                }
            }
        }

        Err(ConversionError::AllEncodersFailed(failures.join("; ")))
    }

    async fn run_ffmpeg(
        &self,
        input: &Path,
        codec_args: &[String],
        dest: &Path,
    ) -> Result<(), ConversionError> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
        ];
        args.extend_from_slice(codec_args);
        args.push("-vn".to_string());
        args.push(dest.to_string_lossy().to_string());

        let output = self.runner.run("ffmpeg", &args, FFMPEG_TIMEOUT).await?;
        if !output.success {
            return Err(ConversionError::ConversionFailed(output.stderr_excerpt()));
        }

        match tokio::fs::metadata(dest).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(ConversionError::ConversionFailed(format!(
                "no output produced at {}",
                dest.display()
            ))),
        }
    }

    /// Remove a pipeline artifact. Removal of an already-missing file is
    /// not an error; any other failure is only a warning.
    pub async fn cleanup_file(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => info!("Cleaned up file: {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to clean up {}: {}", path.display(), e),
        }
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }
}

/// Collision-resistant artifact base name: timestamp plus random suffix,
/// so concurrent workers never need write locking.
fn generate_base_name() -> String {
    format!(
        "audio_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>() % 1_000_000
    )
}
