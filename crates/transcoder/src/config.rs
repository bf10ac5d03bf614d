use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::hardware::HardwareTag;

/// Extensions that are never transcode candidates (images, audio, text, subtitles)
const DEFAULT_EXCLUDED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp", "heic",
    "mp3", "flac", "wav", "aac", "m4a", "ogg", "opus", "wma",
    "txt", "nfo", "md", "log", "json", "xml", "csv", "pdf",
    "srt", "ass", "ssa", "sub", "idx", "vtt", "sup",
];

/// How the quality value is interpreted by the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityKind {
    Crf,
    Qp,
}

/// Rate control family requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateControl {
    /// Fixed CRF/QP, independent of the source bitrate
    Quality,
    /// Target bitrate derived from the source bitrate
    Bitrate,
}

/// Quality options supplied once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// CRF or QP value; when absent the policy falls back to bitrate-relative mode
    pub quality_value: Option<f64>,
    pub quality_kind: QualityKind,
    /// Encoder speed/quality preset label (x265 naming, translated per encoder)
    pub preset: String,
    /// Audio codec to re-encode with; `None` or `"copy"` keeps the source audio
    pub audio_codec: Option<String>,
    pub audio_bitrate: Option<String>,
    /// Keep the original next to the converted file instead of replacing it
    pub save_originals: bool,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            quality_value: Some(22.0),
            quality_kind: QualityKind::Crf,
            preset: "medium".to_string(),
            audio_codec: None,
            audio_bitrate: None,
            save_originals: false,
        }
    }
}

/// Configuration for the HEVC batch transcoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Path to the ffmpeg binary
    pub ffmpeg_bin: PathBuf,
    /// Path to the ffprobe binary
    pub ffprobe_bin: PathBuf,
    pub quality: QualityConfig,
    pub rate_control: RateControl,
    /// Fraction of the source bitrate used as target in bitrate-relative mode
    pub bitrate_factor: f64,
    /// Forced hardware tag; `None` means auto-detect
    pub hardware: Option<HardwareTag>,
    /// Lowercase extensions (without dot) that are never transcoded
    pub excluded_extensions: Vec<String>,
    /// Maximum accepted difference between source and output duration
    pub duration_tolerance_secs: f64,
    /// Reject outputs that are not strictly smaller than the original
    pub require_smaller_output: bool,
    /// Suffix appended to the base name of the staging artifact
    pub staging_suffix: String,
    /// Deadline for a single ffprobe call
    pub probe_timeout_secs: Option<u64>,
    /// Deadline for a single encode; `None` waits indefinitely
    pub encode_timeout_secs: Option<u64>,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl TranscodeConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            quality: QualityConfig::default(),
            rate_control: RateControl::Quality,
            bitrate_factor: 0.6,
            hardware: None,
            excluded_extensions: DEFAULT_EXCLUDED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            duration_tolerance_secs: 1.0,
            require_smaller_output: true,
            staging_suffix: "_HEVC".to_string(),
            probe_timeout_secs: Some(120),
            encode_timeout_secs: None,
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            }
        }

        config.normalize();
        Ok(config)
    }

    /// Check whether a lowercase extension is in the exclusion set
    pub fn is_excluded_extension(&self, ext: &str) -> bool {
        self.excluded_extensions.iter().any(|e| e == ext)
    }

    fn normalize(&mut self) {
        for ext in &mut self.excluded_extensions {
            *ext = ext.trim_start_matches('.').to_lowercase();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = TranscodeConfig::default();
        assert_eq!(cfg.bitrate_factor, 0.6);
        assert_eq!(cfg.duration_tolerance_secs, 1.0);
        assert_eq!(cfg.staging_suffix, "_HEVC");
        assert_eq!(cfg.rate_control, RateControl::Quality);
        assert!(cfg.hardware.is_none());
        assert!(!cfg.quality.save_originals);
        assert!(cfg.is_excluded_extension("srt"));
        assert!(cfg.is_excluded_extension("jpg"));
        assert!(!cfg.is_excluded_extension("mkv"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let cfg = TranscodeConfig::load_config(Some(Path::new("/nonexistent/hevcify.toml"))).unwrap();
        assert_eq!(cfg, TranscodeConfig::default());

        let cfg = TranscodeConfig::load_config(None).unwrap();
        assert_eq!(cfg, TranscodeConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hevcify.toml");
        std::fs::write(
            &path,
            r#"
rate_control = "bitrate"
hardware = "nvidia"
excluded_extensions = [".SRT", "Nfo"]

[quality]
preset = "slow"
save_originals = true
"#,
        )
        .unwrap();

        let cfg = TranscodeConfig::load_config(Some(&path)).unwrap();
        assert_eq!(cfg.rate_control, RateControl::Bitrate);
        assert_eq!(cfg.hardware, Some(HardwareTag::Nvidia));
        assert_eq!(cfg.quality.preset, "slow");
        assert!(cfg.quality.save_originals);
        assert_eq!(cfg.quality.quality_value, Some(22.0));
        assert_eq!(cfg.excluded_extensions, vec!["srt".to_string(), "nfo".to_string()]);
        assert_eq!(cfg.ffmpeg_bin, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hevcify.json");
        std::fs::write(
            &path,
            r#"{ "ffmpeg_bin": "/opt/ffmpeg/bin/ffmpeg", "encode_timeout_secs": 3600,
                 "quality": { "quality_value": 18, "quality_kind": "qp" } }"#,
        )
        .unwrap();

        let cfg = TranscodeConfig::load_config(Some(&path)).unwrap();
        assert_eq!(cfg.ffmpeg_bin, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(cfg.encode_timeout_secs, Some(3600));
        assert_eq!(cfg.quality.quality_value, Some(18.0));
        assert_eq!(cfg.quality.quality_kind, QualityKind::Qp);
        assert_eq!(cfg.quality.preset, "medium");
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "rate_control = [").unwrap();
        assert!(TranscodeConfig::load_config(Some(&path)).is_err());
    }
}
