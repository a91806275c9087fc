//! Client for the external feature-extraction service.
//!
//! Sends the service a URL it can fetch the waveform file from and maps
//! the returned analysis JSON onto the track fields the pipeline stores.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Errors from the analysis call.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("analysis service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed analysis response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Raw response shape of the extraction service.
#[derive(Debug, Default, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default)]
    pub rhythm: Option<RhythmSection>,
    #[serde(default)]
    pub tonal: Option<TonalSection>,
    #[serde(default)]
    pub metadata: Option<MetadataSection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RhythmSection {
    #[serde(default)]
    pub bpm: Option<f64>,
    #[serde(default)]
    pub danceability: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TonalSection {
    #[serde(default)]
    pub key_edma: Option<KeyEdma>,
}

#[derive(Debug, Default, Deserialize)]
pub struct KeyEdma {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub scale: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetadataSection {
    #[serde(default)]
    pub audio_properties: Option<AudioProperties>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AudioProperties {
    #[serde(default)]
    pub length: Option<f64>,
}

/// The track attributes an analysis run may produce. Absent fields leave
/// the corresponding track attribute untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackAnalysisUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub danceability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
}

impl TrackAnalysisUpdate {
    pub fn is_empty(&self) -> bool {
        self.bpm.is_none()
            && self.key.is_none()
            && self.danceability.is_none()
            && self.duration_seconds.is_none()
    }
}

/// Map raw analysis output onto track fields.
///
/// bpm and duration round to the nearest integer, danceability to three
/// decimals, key and scale join into one label when both are present.
pub fn map_analysis(response: &AnalysisResponse) -> TrackAnalysisUpdate {
    let rhythm = response.rhythm.as_ref();
    let bpm = rhythm.and_then(|r| r.bpm).map(|b| b.round() as i64);
    let danceability = rhythm
        .and_then(|r| r.danceability)
        .map(|d| (d * 1000.0).round() / 1000.0);

    let key = response
        .tonal
        .as_ref()
        .and_then(|t| t.key_edma.as_ref())
        .and_then(|k| match (&k.key, &k.scale) {
            (Some(key), Some(scale)) => Some(format!("{} {}", key, scale)),
            _ => None,
        });

    let duration_seconds = response
        .metadata
        .as_ref()
        .and_then(|m| m.audio_properties.as_ref())
        .and_then(|p| p.length)
        .map(|l| l.round() as i64);

    TrackAnalysisUpdate {
        bpm,
        key,
        danceability,
        duration_seconds,
    }
}

/// Seam for the analyze worker; the HTTP client below is the production
/// implementation.
#[async_trait]
pub trait TrackAnalyzer: Send + Sync {
    async fn analyze(&self, wav_file_name: &str) -> Result<TrackAnalysisUpdate, AnalysisError>;
}

/// HTTP client for the feature-extraction service.
pub struct AnalysisClient {
    client: reqwest::Client,
    api_url: String,
    /// Prefix the service can fetch audio files from, e.g.
    /// `http://app:3000/api/audio/`.
    audio_base_url: String,
}

impl AnalysisClient {
    pub fn new(api_url: String, audio_base_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let audio_base_url = if audio_base_url.ends_with('/') {
            audio_base_url
        } else {
            format!("{}/", audio_base_url)
        };
        Ok(Self {
            client,
            api_url,
            audio_base_url,
        })
    }

    fn audio_url(&self, wav_file_name: &str) -> String {
        format!("{}{}", self.audio_base_url, wav_file_name)
    }
}

#[async_trait]
impl TrackAnalyzer for AnalysisClient {
    async fn analyze(&self, wav_file_name: &str) -> Result<TrackAnalysisUpdate, AnalysisError> {
        let audio_url = self.audio_url(wav_file_name);
        info!("Calling analysis service {} for {}", self.api_url, audio_url);

        let response = self
            .client
            .post(&self.api_url)
            .json(&serde_json::json!({ "filename": audio_url }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: AnalysisResponse = serde_json::from_str(&body)?;
        Ok(map_analysis(&parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> AnalysisResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_map_full_response() {
        let response = parse(json!({
            "rhythm": {"bpm": 120.4, "danceability": 1.23456},
            "tonal": {"key_edma": {"key": "A", "scale": "minor"}},
            "metadata": {"audio_properties": {"length": 215.6}}
        }));

        let update = map_analysis(&response);
        assert_eq!(update.bpm, Some(120));
        assert_eq!(update.key.as_deref(), Some("A minor"));
        assert_eq!(update.danceability, Some(1.235));
        assert_eq!(update.duration_seconds, Some(216));
    }

    #[test]
    fn test_map_rounds_bpm_up() {
        let response = parse(json!({"rhythm": {"bpm": 127.5}}));
        assert_eq!(map_analysis(&response).bpm, Some(128));
    }

    #[test]
    fn test_map_missing_fields_left_unset() {
        let response = parse(json!({"rhythm": {"bpm": 98.0}}));
        let update = map_analysis(&response);
        assert_eq!(update.bpm, Some(98));
        assert!(update.key.is_none());
        assert!(update.danceability.is_none());
        assert!(update.duration_seconds.is_none());
        assert!(!update.is_empty());
    }

    #[test]
    fn test_map_key_requires_both_parts() {
        let response = parse(json!({"tonal": {"key_edma": {"key": "F#"}}}));
        assert!(map_analysis(&response).key.is_none());
    }

    #[test]
    fn test_map_empty_response() {
        let update = map_analysis(&parse(json!({})));
        assert!(update.is_empty());
    }

    #[test]
    fn test_audio_url_joins_base() {
        let client = AnalysisClient::new(
            "http://essentia:8001/analyze".to_string(),
            "http://app:3000/api/audio".to_string(),
            Duration::from_secs(60),
        )
        .unwrap();
        assert_eq!(
            client.audio_url("audio_1_2.wav"),
            "http://app:3000/api/audio/audio_1_2.wav"
        );
    }

    #[test]
    fn test_malformed_body_is_parse_error() {
        let result: Result<AnalysisResponse, _> =
            serde_json::from_str("{\"rhythm\": \"not-an-object\"}");
        assert!(result.is_err());
    }
}
