//! Per-friend acquisition preferences.
//!
//! Quality/format/cover/lyrics preferences handed to the download tools.
//! Every friend gets a defaults row on first read; callers can override
//! individual fields per request.

mod store;

pub use store::{SettingsStore, SqliteSettingsStore};

use serde::{Deserialize, Serialize};

/// Audio quality preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Best,
    High,
    Standard,
    Lossless,
}

impl AudioQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioQuality::Best => "best",
            AudioQuality::High => "high",
            AudioQuality::Standard => "standard",
            AudioQuality::Lossless => "lossless",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "best" => Some(AudioQuality::Best),
            "high" => Some(AudioQuality::High),
            "standard" => Some(AudioQuality::Standard),
            "lossless" => Some(AudioQuality::Lossless),
            _ => None,
        }
    }
}

/// Audio container/format preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    M4a,
    Mp3,
    Aac,
    Flac,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::M4a => "m4a",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Aac => "aac",
            AudioFormat::Flac => "flac",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "m4a" => Some(AudioFormat::M4a),
            "mp3" => Some(AudioFormat::Mp3),
            "aac" => Some(AudioFormat::Aac),
            "flac" => Some(AudioFormat::Flac),
            _ => None,
        }
    }
}

/// Cover art format preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverFormat {
    Jpg,
    Png,
    Raw,
}

impl CoverFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverFormat::Jpg => "jpg",
            CoverFormat::Png => "png",
            CoverFormat::Raw => "raw",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "jpg" => Some(CoverFormat::Jpg),
            "png" => Some(CoverFormat::Png),
            "raw" => Some(CoverFormat::Raw),
            _ => None,
        }
    }
}

/// Lyrics format preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LyricsFormat {
    Lrc,
    Srt,
    Ttml,
}

impl LyricsFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LyricsFormat::Lrc => "lrc",
            LyricsFormat::Srt => "srt",
            LyricsFormat::Ttml => "ttml",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "lrc" => Some(LyricsFormat::Lrc),
            "srt" => Some(LyricsFormat::Srt),
            "ttml" => Some(LyricsFormat::Ttml),
            _ => None,
        }
    }
}

/// Resolved acquisition settings for one friend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    pub friend_id: i64,
    pub audio_quality: AudioQuality,
    pub audio_format: AudioFormat,
    pub save_cover: bool,
    pub cover_format: CoverFormat,
    pub save_lyrics: bool,
    pub lyrics_format: LyricsFormat,
    pub overwrite_existing: bool,
    pub skip_music_videos: bool,
    pub max_retries: i32,
}

impl AcquisitionSettings {
    /// Defaults seeded on first read for a friend.
    pub fn defaults_for(friend_id: i64) -> Self {
        Self {
            friend_id,
            audio_quality: AudioQuality::Best,
            audio_format: AudioFormat::M4a,
            save_cover: false,
            cover_format: CoverFormat::Jpg,
            save_lyrics: false,
            lyrics_format: LyricsFormat::Lrc,
            overwrite_existing: false,
            skip_music_videos: true,
            max_retries: 3,
        }
    }

    /// Overlay caller-supplied overrides on top of these settings.
    pub fn with_overrides(mut self, overrides: &AcquisitionOptions) -> Self {
        if let Some(v) = overrides.audio_quality {
            self.audio_quality = v;
        }
        if let Some(v) = overrides.audio_format {
            self.audio_format = v;
        }
        if let Some(v) = overrides.save_cover {
            self.save_cover = v;
        }
        if let Some(v) = overrides.cover_format {
            self.cover_format = v;
        }
        if let Some(v) = overrides.save_lyrics {
            self.save_lyrics = v;
        }
        if let Some(v) = overrides.lyrics_format {
            self.lyrics_format = v;
        }
        if let Some(v) = overrides.overwrite_existing {
            self.overwrite_existing = v;
        }
        if let Some(v) = overrides.skip_music_videos {
            self.skip_music_videos = v;
        }
        if let Some(v) = overrides.max_retries {
            self.max_retries = v;
        }
        self
    }

    /// The per-job option set derived from these settings.
    pub fn to_options(&self) -> AcquisitionOptions {
        AcquisitionOptions {
            audio_quality: Some(self.audio_quality),
            audio_format: Some(self.audio_format),
            save_cover: Some(self.save_cover),
            cover_format: Some(self.cover_format),
            save_lyrics: Some(self.save_lyrics),
            lyrics_format: Some(self.lyrics_format),
            overwrite_existing: Some(self.overwrite_existing),
            skip_music_videos: Some(self.skip_music_videos),
            max_retries: Some(self.max_retries),
        }
    }
}

/// Partial acquisition options.
///
/// Used both as the caller-supplied override set on job creation and as
/// the PUT body for settings updates. Absent fields keep their stored or
/// tool-default value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_quality: Option<AudioQuality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_format: Option<AudioFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_cover: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_format: Option<CoverFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_lyrics: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics_format: Option<LyricsFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite_existing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_music_videos: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<i32>,
}

impl AcquisitionOptions {
    pub fn is_empty(&self) -> bool {
        *self == AcquisitionOptions::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_roundtrips() {
        for quality in [
            AudioQuality::Best,
            AudioQuality::High,
            AudioQuality::Standard,
            AudioQuality::Lossless,
        ] {
            assert_eq!(AudioQuality::parse(quality.as_str()), Some(quality));
        }
        for format in [
            AudioFormat::M4a,
            AudioFormat::Mp3,
            AudioFormat::Aac,
            AudioFormat::Flac,
        ] {
            assert_eq!(AudioFormat::parse(format.as_str()), Some(format));
        }
        assert_eq!(AudioQuality::parse("extreme"), None);
        assert_eq!(AudioFormat::parse("ogg"), None);
    }

    #[test]
    fn test_defaults() {
        let settings = AcquisitionSettings::defaults_for(7);
        assert_eq!(settings.friend_id, 7);
        assert_eq!(settings.audio_quality, AudioQuality::Best);
        assert_eq!(settings.audio_format, AudioFormat::M4a);
        assert!(!settings.save_cover);
        assert!(settings.skip_music_videos);
        assert_eq!(settings.max_retries, 3);
    }

    #[test]
    fn test_with_overrides_only_touches_present_fields() {
        let overrides = AcquisitionOptions {
            audio_format: Some(AudioFormat::Flac),
            max_retries: Some(5),
            ..Default::default()
        };

        let merged = AcquisitionSettings::defaults_for(1).with_overrides(&overrides);
        assert_eq!(merged.audio_format, AudioFormat::Flac);
        assert_eq!(merged.max_retries, 5);
        // Untouched fields keep their defaults.
        assert_eq!(merged.audio_quality, AudioQuality::Best);
        assert!(!merged.save_lyrics);
    }

    #[test]
    fn test_options_serde_lowercase() {
        let options = AcquisitionOptions {
            audio_quality: Some(AudioQuality::Lossless),
            ..Default::default()
        };
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["audio_quality"], "lossless");
        assert!(json.get("audio_format").is_none());
    }
}
