//! Applies analysis results to the track record and the search index.
//!
//! Two phases: a durable partial update on the track row, then a
//! best-effort push of the re-read row into the search index. Only the
//! first phase can fail the job.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::analysis_client::TrackAnalysisUpdate;
use super::error::PipelineError;
use crate::search_index::SearchIndex;
use crate::track_store::{TrackAudioUpdate, TrackStore};

pub struct ResultWriter {
    tracks: Arc<dyn TrackStore>,
    index: Arc<dyn SearchIndex>,
}

impl ResultWriter {
    pub fn new(tracks: Arc<dyn TrackStore>, index: Arc<dyn SearchIndex>) -> Self {
        Self { tracks, index }
    }

    /// Write the produced fields to the track row and re-push the row to
    /// the index when anything changed.
    pub async fn apply(
        &self,
        track_id: &str,
        friend_id: i64,
        local_audio_url: Option<String>,
        analysis: &TrackAnalysisUpdate,
    ) -> Result<(), PipelineError> {
        let update = TrackAudioUpdate::from_analysis(local_audio_url, analysis);
        if update.is_empty() {
            debug!(
                "No analysis-driven updates to apply for track {} (friend {})",
                track_id, friend_id
            );
            return Ok(());
        }

        let changed = self
            .tracks
            .apply_audio_update(track_id, friend_id, &update)
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        if changed == 0 {
            debug!(
                "Track {} (friend {}) not found, nothing updated",
                track_id, friend_id
            );
            return Ok(());
        }

        info!(
            "Updated track {} (friend {}) from analysis",
            track_id, friend_id
        );

        // Phase two is advisory; the record store already holds the truth.
        match self
            .tracks
            .get_track(track_id, friend_id)
            .map_err(|e| PipelineError::Storage(e.to_string()))?
        {
            Some(track) => {
                if let Err(e) = self.index.upsert_track(&track).await {
                    warn!(
                        "Failed to update search index for track {}: {}",
                        track_id, e
                    );
                }
            }
            None => warn!(
                "Track {} (friend {}) disappeared before index push",
                track_id, friend_id
            ),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis_client::TrackAnalysisUpdate;
    use crate::track_store::{SqliteTrackStore, Track};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingIndex {
        pushes: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SearchIndex for RecordingIndex {
        async fn upsert_track(&self, _track: &Track) -> anyhow::Result<()> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(anyhow!("index down"))
            } else {
                Ok(())
            }
        }
    }

    fn seeded_store() -> Arc<SqliteTrackStore> {
        let store = Arc::new(SqliteTrackStore::in_memory().unwrap());
        store
            .upsert_track(&Track {
                track_id: "T1".to_string(),
                friend_id: 7,
                key: Some("C major".to_string()),
                ..Default::default()
            })
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_apply_updates_record_and_index() {
        let store = seeded_store();
        let index = Arc::new(RecordingIndex {
            pushes: AtomicUsize::new(0),
            fail: false,
        });
        let writer = ResultWriter::new(store.clone(), index.clone());

        let analysis = TrackAnalysisUpdate {
            bpm: Some(120),
            ..Default::default()
        };
        writer
            .apply("T1", 7, Some("audio_1.m4a".to_string()), &analysis)
            .await
            .unwrap();

        let track = store.get_track("T1", 7).unwrap().unwrap();
        assert_eq!(track.bpm, Some(120.0));
        assert_eq!(track.local_audio_url.as_deref(), Some("audio_1.m4a"));
        // Prior key survives a partial update.
        assert_eq!(track.key.as_deref(), Some("C major"));
        assert_eq!(index.pushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_index_failure_does_not_fail_job() {
        let store = seeded_store();
        let index = Arc::new(RecordingIndex {
            pushes: AtomicUsize::new(0),
            fail: true,
        });
        let writer = ResultWriter::new(store.clone(), index.clone());

        let analysis = TrackAnalysisUpdate {
            bpm: Some(99),
            ..Default::default()
        };
        writer.apply("T1", 7, None, &analysis).await.unwrap();

        assert_eq!(index.pushes.load(Ordering::SeqCst), 1);
        assert_eq!(store.get_track("T1", 7).unwrap().unwrap().bpm, Some(99.0));
    }

    #[tokio::test]
    async fn test_no_row_changed_skips_index() {
        let store = Arc::new(SqliteTrackStore::in_memory().unwrap());
        let index = Arc::new(RecordingIndex {
            pushes: AtomicUsize::new(0),
            fail: false,
        });
        let writer = ResultWriter::new(store, index.clone());

        let analysis = TrackAnalysisUpdate {
            bpm: Some(99),
            ..Default::default()
        };
        writer.apply("unknown", 1, None, &analysis).await.unwrap();
        assert_eq!(index.pushes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_update_is_noop() {
        let store = seeded_store();
        let index = Arc::new(RecordingIndex {
            pushes: AtomicUsize::new(0),
            fail: false,
        });
        let writer = ResultWriter::new(store, index.clone());

        writer
            .apply("T1", 7, None, &TrackAnalysisUpdate::default())
            .await
            .unwrap();
        assert_eq!(index.pushes.load(Ordering::SeqCst), 0);
    }
}
