use std::path::{Path, PathBuf};
use std::collections::HashMap;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use crate::config::TranscodeConfig;
use crate::ffmpeg::run_tool;

/// Complete ffprobe output structure
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeData {
    #[serde(default)]
    pub streams: Vec<FFProbeStream>,
    pub format: Option<FFProbeFormat>,
}

/// Format-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeFormat {
    pub format_name: Option<String>,
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
}

/// Stream-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeStream {
    pub index: i32,
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
    pub disposition: Option<HashMap<String, i32>>,
}

impl FFProbeStream {
    fn is_video(&self) -> bool {
        self.codec_type.as_deref() == Some("video")
    }

    /// Cover art and thumbnails show up as video streams
    fn is_attached_picture(&self) -> bool {
        self.disposition
            .as_ref()
            .and_then(|d| d.get("attached_pic"))
            .copied()
            == Some(1)
    }
}

/// What the pipeline needs to know about a file, extracted from one probe
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProbeResult {
    pub has_video_stream: bool,
    pub video_stream_count: u32,
    pub primary_codec: Option<String>,
    /// Absolute ffprobe index of the primary video stream
    pub primary_stream_index: Option<u32>,
    /// Absolute indices of cover art and thumbnail streams
    pub attached_picture_indices: Vec<u32>,
    /// Bitrate of the primary video stream; `None` when not reported
    pub video_bitrate: Option<u64>,
    /// Overall container bitrate; `None` when not reported
    pub container_bitrate: Option<u64>,
    pub duration_seconds: Option<f64>,
}

impl ProbeResult {
    pub fn from_ffprobe(data: &FFProbeData) -> Self {
        let video_streams: Vec<&FFProbeStream> = data
            .streams
            .iter()
            .filter(|s| s.is_video() && !s.is_attached_picture())
            .collect();

        let primary = video_streams.first().copied();
        let format = data.format.as_ref();

        // cover art is carried through by stream copy, so remember where it sits
        let attached_picture_indices = data
            .streams
            .iter()
            .filter(|s| s.is_video() && s.is_attached_picture())
            .filter_map(|s| u32::try_from(s.index).ok())
            .collect();

        let duration_seconds = format
            .and_then(|f| parse_duration(f.duration.as_deref()))
            .or_else(|| primary.and_then(|s| parse_duration(s.duration.as_deref())));

        ProbeResult {
            has_video_stream: data.streams.iter().any(|s| s.is_video()),
            video_stream_count: video_streams.len() as u32,
            primary_codec: primary.and_then(|s| s.codec_name.clone()),
            primary_stream_index: primary.and_then(|s| u32::try_from(s.index).ok()),
            attached_picture_indices,
            video_bitrate: primary.and_then(|s| parse_bitrate(s.bit_rate.as_deref())),
            container_bitrate: format.and_then(|f| parse_bitrate(f.bit_rate.as_deref())),
            duration_seconds,
        }
    }

    /// Stream bitrate when it is known and non-zero, otherwise the container bitrate.
    /// The result may still be `Some(0)`, which callers treat as invalid.
    pub fn effective_bitrate(&self) -> Option<u64> {
        match self.video_bitrate {
            Some(bitrate) if bitrate > 0 => Some(bitrate),
            _ => self.container_bitrate,
        }
    }
}

/// Parse an ffprobe bitrate field; "N/A" and garbage are absent, "0" is a real zero
pub fn parse_bitrate(value: Option<&str>) -> Option<u64> {
    value.and_then(|v| v.trim().parse::<u64>().ok())
}

/// Parse an ffprobe duration field in seconds
pub fn parse_duration(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Read-only metadata query against a media file
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeResult>;
}

/// Probes files with a local ffprobe binary
pub struct FfprobeProber {
    pub ffprobe_bin: PathBuf,
    pub timeout_secs: Option<u64>,
}

impl FfprobeProber {
    pub fn new(cfg: &TranscodeConfig) -> Self {
        Self {
            ffprobe_bin: cfg.ffprobe_bin.clone(),
            timeout_secs: cfg.probe_timeout_secs,
        }
    }

    /// Run ffprobe and parse the JSON output
    pub async fn probe_raw(&self, file_path: &Path) -> Result<FFProbeData> {
        if !file_path.exists() {
            return Err(anyhow!("File does not exist: {}", file_path.display()));
        }

        debug!("Executing FFprobe for: {}", file_path.display());

        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_streams".to_string(),
            "-show_format".to_string(),
            file_path.to_string_lossy().to_string(),
        ];

        let output = run_tool(&self.ffprobe_bin, &args, self.timeout_secs)
            .await
            .with_context(|| format!("Failed to execute FFprobe for: {}", file_path.display()))?;

        if !output.success {
            return Err(anyhow!(
                "FFprobe failed (exit code {}) for {}:\nSTDERR: {}",
                output.exit_code.unwrap_or(-1),
                file_path.display(),
                output.stderr_tail(10)
            ));
        }

        let data: FFProbeData = serde_json::from_str(&output.stdout)
            .with_context(|| format!("Failed to parse ffprobe JSON for: {}", file_path.display()))?;

        Ok(data)
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<ProbeResult> {
        let data = self.probe_raw(path).await?;
        Ok(ProbeResult::from_ffprobe(&data))
    }
}
