//! In-crate fakes for the external prober and encoder.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use crate::error::ToolError;
use crate::executor::EncodeRunner;
use crate::ffmpeg::ToolOutput;
use crate::ffprobe::{MediaProber, ProbeResult};
use crate::policy::{EncoderId, EncodingPlan, PolicyMode};
use crate::scan::MediaFile;

/// Write a file of `size` bytes and describe it as a `MediaFile`
pub fn media_file(dir: &Path, name: &str, size: usize) -> MediaFile {
    let path = dir.join(name);
    std::fs::write(&path, vec![0xAB; size]).unwrap();
    MediaFile::new(path, size as u64)
}

pub fn video_probe(codec: &str, duration: f64, bitrate: Option<u64>) -> ProbeResult {
    ProbeResult {
        has_video_stream: true,
        video_stream_count: 1,
        primary_codec: Some(codec.to_string()),
        primary_stream_index: Some(0),
        attached_picture_indices: Vec::new(),
        video_bitrate: bitrate,
        container_bitrate: bitrate,
        duration_seconds: Some(duration),
    }
}

pub fn sample_plan() -> EncodingPlan {
    EncodingPlan {
        encoder: EncoderId::Libx265,
        mode: PolicyMode::QualityFixed,
        video_stream_index: Some(0),
        attached_pictures: Vec::new(),
        params: vec!["-crf".to_string(), "22".to_string()],
        target_bitrate: None,
        verify_output_bitrate: false,
    }
}

/// Prober answering from a fixed table keyed by path
#[derive(Default)]
pub struct FakeProber {
    results: HashMap<PathBuf, ProbeResult>,
}

impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<PathBuf>, result: ProbeResult) -> Self {
        self.results.insert(path.into(), result);
        self
    }
}

#[async_trait]
impl MediaProber for FakeProber {
    async fn probe(&self, path: &Path) -> Result<ProbeResult> {
        self.results
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("invalid data found when processing input: {}", path.display()))
    }
}

/// What the fake encoder does when invoked
#[derive(Debug, Clone, Copy)]
pub enum EncodeBehavior {
    /// Exit 0 after writing this many bytes to the output
    Write(usize),
    /// Exit 0 without creating the output
    NoOutput,
    /// Write a partial output, then exit 1
    FailAfterWriting(usize),
    TimeOut,
}

/// Encoder that writes placeholder bytes instead of running ffmpeg
pub struct FakeEncoder {
    default: EncodeBehavior,
    per_file: HashMap<String, EncodeBehavior>,
    calls: AtomicUsize,
    plans: Mutex<Vec<EncodingPlan>>,
}

impl FakeEncoder {
    pub fn new(default: EncodeBehavior) -> Self {
        Self {
            default,
            per_file: HashMap::new(),
            calls: AtomicUsize::new(0),
            plans: Mutex::new(Vec::new()),
        }
    }

    /// Override the behavior for an input file name
    pub fn with(mut self, file_name: &str, behavior: EncodeBehavior) -> Self {
        self.per_file.insert(file_name.to_string(), behavior);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Plans received so far, in call order
    pub fn plans(&self) -> Vec<EncodingPlan> {
        self.plans.lock().unwrap().clone()
    }
}

#[async_trait]
impl EncodeRunner for FakeEncoder {
    async fn encode(
        &self,
        input: &Path,
        output: &Path,
        plan: &EncodingPlan,
    ) -> std::result::Result<ToolOutput, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.plans.lock().unwrap().push(plan.clone());

        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let behavior = self.per_file.get(&name).copied().unwrap_or(self.default);

        let finished = |success: bool| ToolOutput {
            success,
            exit_code: Some(if success { 0 } else { 1 }),
            stdout: String::new(),
            stderr: if success { String::new() } else { "Conversion failed!".to_string() },
        };

        match behavior {
            EncodeBehavior::Write(size) => {
                std::fs::write(output, vec![0xCD; size]).unwrap();
                Ok(finished(true))
            }
            EncodeBehavior::NoOutput => Ok(finished(true)),
            EncodeBehavior::FailAfterWriting(size) => {
                std::fs::write(output, vec![0xCD; size]).unwrap();
                Ok(finished(false))
            }
            EncodeBehavior::TimeOut => Err(ToolError::TimedOut {
                bin: "ffmpeg".to_string(),
                secs: 1,
            }),
        }
    }
}
