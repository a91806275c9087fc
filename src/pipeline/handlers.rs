//! The two job handlers of the pipeline.
//!
//! Download: acquire audio from one of the track's sources, convert it,
//! then chain exactly one analyze job. Analyze: extract features, write
//! them back, and always clean up the waveform file.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::analysis_client::TrackAnalyzer;
use super::converter::FormatConverter;
use super::error::PipelineError;
use super::result_writer::ResultWriter;
use super::source_strategy::{AudioSourceStrategy, SourceUrls};
use crate::job_queue::{
    priority, AnalyzeJobPayload, DownloadJobPayload, JobHandler, JobQueueStore, JobRow,
    ProgressReporter, QueueKind,
};
use crate::settings::AcquisitionSettings;

/// Worker logic for the download queue.
pub struct DownloadJobHandler {
    queue_store: Arc<dyn JobQueueStore>,
    strategy: Arc<AudioSourceStrategy>,
    converter: Arc<FormatConverter>,
    /// Attempt budget stamped onto chained analyze jobs.
    analyze_max_attempts: i32,
}

impl DownloadJobHandler {
    pub fn new(
        queue_store: Arc<dyn JobQueueStore>,
        strategy: Arc<AudioSourceStrategy>,
        converter: Arc<FormatConverter>,
        analyze_max_attempts: i32,
    ) -> Self {
        Self {
            queue_store,
            strategy,
            converter,
            analyze_max_attempts,
        }
    }
}

#[async_trait]
impl JobHandler for DownloadJobHandler {
    fn queue(&self) -> QueueKind {
        QueueKind::Download
    }

    async fn process(
        &self,
        job: &JobRow,
        progress: &ProgressReporter,
    ) -> Result<serde_json::Value, PipelineError> {
        let payload: DownloadJobPayload = serde_json::from_value(job.data.clone())
            .map_err(|e| PipelineError::InvalidPayload(e.to_string()))?;

        if !payload.has_source_url() {
            return Err(PipelineError::NoSourceUrls);
        }

        progress.report(10);

        let urls = SourceUrls {
            apple_music: payload.apple_music_url.clone(),
            spotify: payload.spotify_url.clone(),
            youtube: payload.youtube_url.clone(),
            soundcloud: payload.soundcloud_url.clone(),
        };
        let settings = match &payload.options {
            Some(options) => {
                AcquisitionSettings::defaults_for(payload.friend_id).with_overrides(options)
            }
            None => AcquisitionSettings::defaults_for(payload.friend_id),
        };

        progress.report(30);
        let downloaded = self
            .strategy
            .acquire(&urls, payload.preferred_downloader, &settings)
            .await?;

        progress.report(70);
        let converted = self.converter.convert(&downloaded).await?;

        progress.report(90);
        let analyze_payload = AnalyzeJobPayload {
            track_id: payload.track_id.clone(),
            friend_id: payload.friend_id,
            wav_file_name: converted.wav_file_name.clone(),
            playback_file_name: converted.playback_file_name.clone(),
        };
        let analyze_job_id = self
            .queue_store
            .enqueue(
                QueueKind::Analyze,
                serde_json::to_value(&analyze_payload)
                    .map_err(|e| PipelineError::Queue(e.to_string()))?,
                priority::NORMAL,
                self.analyze_max_attempts,
            )
            .map_err(|e| PipelineError::Queue(e.to_string()))?;

        info!(
            "Download completed for track {}, queued analysis job {}",
            payload.track_id, analyze_job_id
        );

        Ok(json!({
            "success": true,
            "wav_file_name": converted.wav_file_name,
            "playback_file_name": converted.playback_file_name,
            "format": converted.playback_format.as_str(),
            "analyze_job_id": analyze_job_id,
        }))
    }
}

/// Worker logic for the analyze queue.
pub struct AnalyzeJobHandler {
    analyzer: Arc<dyn TrackAnalyzer>,
    writer: Arc<ResultWriter>,
    converter: Arc<FormatConverter>,
}

impl AnalyzeJobHandler {
    pub fn new(
        analyzer: Arc<dyn TrackAnalyzer>,
        writer: Arc<ResultWriter>,
        converter: Arc<FormatConverter>,
    ) -> Self {
        Self {
            analyzer,
            writer,
            converter,
        }
    }

    async fn run(
        &self,
        payload: &AnalyzeJobPayload,
        progress: &ProgressReporter,
    ) -> Result<serde_json::Value, PipelineError> {
        progress.report(10);

        progress.report(30);
        let analysis = self
            .analyzer
            .analyze(&payload.wav_file_name)
            .await
            .map_err(|e| PipelineError::Analysis(e.to_string()))?;

        progress.report(70);
        self.writer
            .apply(
                &payload.track_id,
                payload.friend_id,
                Some(payload.playback_file_name.clone()),
                &analysis,
            )
            .await?;

        progress.report(90);

        Ok(json!({
            "success": true,
            "local_audio_url": payload.playback_file_name,
            "analysis": analysis,
        }))
    }
}

#[async_trait]
impl JobHandler for AnalyzeJobHandler {
    fn queue(&self) -> QueueKind {
        QueueKind::Analyze
    }

    async fn process(
        &self,
        job: &JobRow,
        progress: &ProgressReporter,
    ) -> Result<serde_json::Value, PipelineError> {
        let payload: AnalyzeJobPayload = serde_json::from_value(job.data.clone())
            .map_err(|e| PipelineError::InvalidPayload(e.to_string()))?;

        let result = self.run(&payload, progress).await;

        // The waveform is consumed either way; keep the audio dir tidy.
        let wav_path = self.converter.audio_dir().join(&payload.wav_file_name);
        self.converter.cleanup_file(&wav_path).await;

        if result.is_ok() {
            info!("Analysis completed for track {}", payload.track_id);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_queue::{JobState, SqliteJobQueueStore};
    use crate::pipeline::analysis_client::{AnalysisError, TrackAnalysisUpdate};
    use crate::pipeline::tools::{CommandOutput, CommandRunner, ToolError};
    use crate::search_index::NoOpSearchIndex;
    use crate::track_store::{SqliteTrackStore, Track, TrackStore};
    use std::path::PathBuf;
    use std::time::Duration;

    /// Simulates a host where only yt-dlp and ffmpeg work.
    struct YoutubeOnlyHost;

    #[async_trait]
    impl CommandRunner for YoutubeOnlyHost {
        async fn run(
            &self,
            program: &str,
            args: &[String],
            _timeout: Duration,
        ) -> Result<CommandOutput, ToolError> {
            let write_dest = |dest: &str| std::fs::write(dest, b"bytes").unwrap();
            match program {
                "yt-dlp" => {
                    let out = args
                        .iter()
                        .position(|a| a == "-o")
                        .and_then(|i| args.get(i + 1))
                        .unwrap();
                    write_dest(out);
                    ok()
                }
                "ffmpeg" => {
                    write_dest(args.last().unwrap());
                    ok()
                }
                _ => Ok(CommandOutput {
                    success: false,
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: "not installed".to_string(),
                }),
            }
        }
    }

    fn ok() -> Result<CommandOutput, ToolError> {
        Ok(CommandOutput {
            success: true,
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    fn download_handler(
        tmp: &tempfile::TempDir,
        queue_store: Arc<SqliteJobQueueStore>,
    ) -> DownloadJobHandler {
        let runner = Arc::new(YoutubeOnlyHost);
        let strategy = Arc::new(AudioSourceStrategy::new(
            runner.clone(),
            tmp.path().join("tmp"),
            Duration::from_secs(300),
        ));
        let converter = Arc::new(FormatConverter::new(runner, tmp.path().join("audio")));
        DownloadJobHandler::new(queue_store, strategy, converter, 2)
    }

    fn job_row(data: serde_json::Value) -> JobRow {
        JobRow {
            id: "job-1".to_string(),
            queue: QueueKind::Download,
            name: "download-audio".to_string(),
            data,
            priority: priority::NORMAL,
            state: JobState::Active,
            progress: 0,
            attempts_made: 1,
            max_attempts: 3,
            created_at: 0,
            processed_on: None,
            finished_on: None,
            next_attempt_at: None,
            failed_reason: None,
            return_value: None,
        }
    }

    fn reporter(store: &Arc<SqliteJobQueueStore>) -> ProgressReporter {
        ProgressReporter::new(store.clone(), "nonexistent".to_string())
    }

    #[tokio::test]
    async fn test_download_chains_exactly_one_analyze_job() {
        let tmp = tempfile::tempdir().unwrap();
        let queue_store = Arc::new(SqliteJobQueueStore::in_memory().unwrap());
        let handler = download_handler(&tmp, queue_store.clone());

        let job = job_row(json!({
            "track_id": "T1",
            "friend_id": 7,
            "youtube_url": "https://y/1"
        }));
        let result = handler.process(&job, &reporter(&queue_store)).await.unwrap();

        assert_eq!(result["success"], true);
        let wav = result["wav_file_name"].as_str().unwrap();
        let playback = result["playback_file_name"].as_str().unwrap();
        assert!(wav.ends_with(".wav"));
        assert!(playback.ends_with(".m4a"));

        // Exactly one analyze job, referencing the converter's artifacts.
        let analyze = queue_store.claim_next(QueueKind::Analyze).unwrap().unwrap();
        assert_eq!(analyze.data["track_id"], "T1");
        assert_eq!(analyze.data["friend_id"], 7);
        assert_eq!(analyze.data["wav_file_name"], wav);
        assert_eq!(analyze.data["playback_file_name"], playback);
        assert_eq!(analyze.max_attempts, 2);
        assert!(queue_store.claim_next(QueueKind::Analyze).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_download_without_urls_fails_validation() {
        let tmp = tempfile::tempdir().unwrap();
        let queue_store = Arc::new(SqliteJobQueueStore::in_memory().unwrap());
        let handler = download_handler(&tmp, queue_store.clone());

        let job = job_row(json!({"track_id": "T1", "friend_id": 7}));
        let err = handler
            .process(&job, &reporter(&queue_store))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NoSourceUrls));
        assert!(!err.is_retryable());
        // No analyze job was chained.
        assert!(queue_store.claim_next(QueueKind::Analyze).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_download_malformed_payload_fails_validation() {
        let tmp = tempfile::tempdir().unwrap();
        let queue_store = Arc::new(SqliteJobQueueStore::in_memory().unwrap());
        let handler = download_handler(&tmp, queue_store.clone());

        let job = job_row(json!({"friend_id": "not-a-number"}));
        let err = handler
            .process(&job, &reporter(&queue_store))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPayload(_)));
    }

    struct ScriptedAnalyzer {
        fail: bool,
    }

    #[async_trait]
    impl TrackAnalyzer for ScriptedAnalyzer {
        async fn analyze(
            &self,
            _wav_file_name: &str,
        ) -> Result<TrackAnalysisUpdate, AnalysisError> {
            if self.fail {
                Err(AnalysisError::Status {
                    status: 500,
                    body: "extractor crashed".to_string(),
                })
            } else {
                Ok(TrackAnalysisUpdate {
                    bpm: Some(120),
                    key: Some("A minor".to_string()),
                    danceability: Some(1.2),
                    duration_seconds: Some(200),
                })
            }
        }
    }

    struct AnalyzeFixture {
        handler: AnalyzeJobHandler,
        tracks: Arc<SqliteTrackStore>,
        wav_path: PathBuf,
        queue_store: Arc<SqliteJobQueueStore>,
    }

    async fn analyze_fixture(tmp: &tempfile::TempDir, fail: bool) -> AnalyzeFixture {
        let tracks = Arc::new(SqliteTrackStore::in_memory().unwrap());
        tracks
            .upsert_track(&Track {
                track_id: "T1".to_string(),
                friend_id: 7,
                ..Default::default()
            })
            .unwrap();

        let audio_dir = tmp.path().join("audio");
        tokio::fs::create_dir_all(&audio_dir).await.unwrap();
        let wav_path = audio_dir.join("audio_1_2.wav");
        tokio::fs::write(&wav_path, b"wav").await.unwrap();

        let converter = Arc::new(FormatConverter::new(Arc::new(YoutubeOnlyHost), audio_dir));
        let writer = Arc::new(ResultWriter::new(
            tracks.clone(),
            Arc::new(NoOpSearchIndex),
        ));
        let handler = AnalyzeJobHandler::new(
            Arc::new(ScriptedAnalyzer { fail }),
            writer,
            converter,
        );

        AnalyzeFixture {
            handler,
            tracks,
            wav_path,
            queue_store: Arc::new(SqliteJobQueueStore::in_memory().unwrap()),
        }
    }

    fn analyze_job_data() -> serde_json::Value {
        json!({
            "track_id": "T1",
            "friend_id": 7,
            "wav_file_name": "audio_1_2.wav",
            "playback_file_name": "audio_1_2.m4a"
        })
    }

    #[tokio::test]
    async fn test_analyze_success_updates_track_and_cleans_wav() {
        let tmp = tempfile::tempdir().unwrap();
        let fixture = analyze_fixture(&tmp, false).await;

        let mut job = job_row(analyze_job_data());
        job.queue = QueueKind::Analyze;
        let result = fixture
            .handler
            .process(&job, &reporter(&fixture.queue_store))
            .await
            .unwrap();

        assert_eq!(result["success"], true);
        assert_eq!(result["local_audio_url"], "audio_1_2.m4a");
        assert_eq!(result["analysis"]["bpm"], 120);

        let track = fixture.tracks.get_track("T1", 7).unwrap().unwrap();
        assert_eq!(track.bpm, Some(120.0));
        assert_eq!(track.local_audio_url.as_deref(), Some("audio_1_2.m4a"));

        assert!(!fixture.wav_path.exists());
    }

    #[tokio::test]
    async fn test_analyze_failure_still_cleans_wav_and_skips_update() {
        let tmp = tempfile::tempdir().unwrap();
        let fixture = analyze_fixture(&tmp, true).await;

        let mut job = job_row(analyze_job_data());
        job.queue = QueueKind::Analyze;
        let err = fixture
            .handler
            .process(&job, &reporter(&fixture.queue_store))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Analysis(_)));
        assert!(err.is_retryable());

        // Record untouched, waveform removed regardless.
        let track = fixture.tracks.get_track("T1", 7).unwrap().unwrap();
        assert!(track.bpm.is_none());
        assert!(track.local_audio_url.is_none());
        assert!(!fixture.wav_path.exists());
    }
}
