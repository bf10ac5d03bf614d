use std::path::{Path, PathBuf};
use std::process::Stdio;
use async_trait::async_trait;
use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use crate::config::TranscodeConfig;
use crate::error::{ToolError, TranscodeError};
use crate::executor::EncodeRunner;
use crate::policy::EncodingPlan;

/// Deadline for `-version` and `-encoders` queries
pub const QUERY_TIMEOUT_SECS: u64 = 15;

/// Containers that need the `hvc1` tag for HEVC to play on Apple devices
const HVC1_TAG_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov"];

/// Captured result of an external tool invocation
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Last `lines` lines of stderr, for error reports
    pub fn stderr_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.stderr.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// Run an external tool to completion, killing it if the deadline expires
pub async fn run_tool(
    bin: &Path,
    args: &[String],
    timeout_secs: Option<u64>,
) -> std::result::Result<ToolOutput, ToolError> {
    let bin_name = bin.display().to_string();
    debug!("Executing: {} {}", bin_name, args.join(" "));

    let mut cmd = Command::new(bin);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
        bin: bin_name.clone(),
        source,
    })?;

    // Drain stdout and stderr on their own tasks
    let stdout_handle = tokio::spawn(drain(child.stdout.take()));
    let stderr_handle = tokio::spawn(drain(child.stderr.take()));

    let status = match timeout_secs {
        Some(secs) => match timeout(Duration::from_secs(secs), child.wait()).await {
            Ok(result) => result.map_err(|source| ToolError::Io {
                bin: bin_name.clone(),
                source,
            })?,
            Err(_) => {
                // Deadline hit: kill the child before reporting
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {} after timeout: {}", bin_name, e);
                }
                return Err(ToolError::TimedOut { bin: bin_name, secs });
            }
        },
        None => child.wait().await.map_err(|source| ToolError::Io {
            bin: bin_name.clone(),
            source,
        })?,
    };

    let stdout = stdout_handle.await.unwrap_or_default();
    let stderr = stderr_handle.await.unwrap_or_default();

    debug!(
        "{} exited with {:?} (stdout {} bytes, stderr {} bytes)",
        bin_name,
        status.code(),
        stdout.len(),
        stderr.len()
    );

    Ok(ToolOutput {
        success: status.success(),
        exit_code: status.code(),
        stdout,
        stderr,
    })
}

async fn drain<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// FFmpeg/FFprobe version information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ToolVersion {
    /// Parse version from the first line of `-version` output
    /// Example: "ffmpeg version 6.1.1-3ubuntu5" -> ToolVersion { major: 6, minor: 1, patch: 1 }
    pub fn parse(version_str: &str) -> Result<Self> {
        let token = version_str
            .split_whitespace()
            .skip_while(|t| *t != "version")
            .nth(1)
            .ok_or_else(|| anyhow!("No version token found in: {}", version_str))?;

        let numeric: String = token
            .trim_start_matches('n')
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();

        let mut parts = numeric.split('.').filter(|p| !p.is_empty());

        let major = parts
            .next()
            .ok_or_else(|| anyhow!("Invalid version format: {}", version_str))?
            .parse::<u32>()
            .with_context(|| format!("Failed to parse major version from: {}", token))?;
        let minor = parts.next().map(|p| p.parse::<u32>()).transpose()?.unwrap_or(0);
        let patch = parts.next().map(|p| p.parse::<u32>()).transpose()?.unwrap_or(0);

        Ok(ToolVersion { major, minor, patch })
    }
}

impl std::fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Versions found during the startup dependency check
#[derive(Debug, Clone)]
pub struct DependencyReport {
    pub ffmpeg_version: Option<ToolVersion>,
    pub ffprobe_version: Option<ToolVersion>,
}

/// Verify that both ffmpeg and ffprobe can be executed
pub async fn check_dependencies(cfg: &TranscodeConfig) -> std::result::Result<DependencyReport, TranscodeError> {
    let ffmpeg_version = detect_version(&cfg.ffmpeg_bin).await?;
    let ffprobe_version = detect_version(&cfg.ffprobe_bin).await?;
    Ok(DependencyReport {
        ffmpeg_version,
        ffprobe_version,
    })
}

async fn detect_version(bin: &Path) -> std::result::Result<Option<ToolVersion>, TranscodeError> {
    let missing = |reason: String| TranscodeError::FatalDependencyMissing {
        tool: bin.display().to_string(),
        reason,
    };

    let output = run_tool(bin, &["-version".to_string()], Some(QUERY_TIMEOUT_SECS))
        .await
        .map_err(|e| missing(e.to_string()))?;

    if !output.success {
        return Err(missing(format!(
            "`-version` exited with status {:?}",
            output.exit_code
        )));
    }

    // First line looks like "ffmpeg version 6.1.1 Copyright ..."
    let first_line = output.stdout.lines().next().unwrap_or_default();
    match ToolVersion::parse(first_line) {
        Ok(version) => {
            info!("Found {} version {}", bin.display(), version);
            Ok(Some(version))
        }
        Err(e) => {
            info!("Found {} (unknown version: {})", bin.display(), e);
            Ok(None)
        }
    }
}

/// Command builder for generating FFmpeg command lines
pub struct CommandBuilder;

impl CommandBuilder {
    /// Create a new command builder
    pub fn new() -> Self {
        CommandBuilder
    }

    /// Build the full encode command
    ///
    /// The probed primary video stream is re-encoded with the plan's encoder. Audio is
    /// handled by the plan; cover art, subtitles, data streams, chapters and metadata are copied.
    pub fn build_encode_command(&self, input: &Path, output: &Path, plan: &EncodingPlan) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner", "-nostdin", "-nostats", "-v", "warning",
            // never overwrite: the staging path must not already exist
            "-n",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.push("-i".to_string());
        args.push(input.to_string_lossy().to_string());

        // The probed primary stream becomes output video stream 0, never
        // whatever ffmpeg happens to list first (cover art in mp4/m4v)
        let video_map = plan
            .video_stream_index
            .map(|i| format!("0:{}", i))
            .unwrap_or_else(|| "0:v:0".to_string());
        args.push("-map".to_string());
        args.push(video_map);

        // Cover art follows as output video streams 1..n
        for index in &plan.attached_pictures {
            args.push("-map".to_string());
            args.push(format!("0:{}", index));
        }

        for map in ["0:a?", "0:s?", "0:d?"] {
            args.push("-map".to_string());
            args.push(map.to_string());
        }
        args.push("-map_metadata".to_string());
        args.push("0".to_string());
        args.push("-map_chapters".to_string());
        args.push("0".to_string());

        args.push("-c:v:0".to_string());
        args.push(plan.encoder.ffmpeg_name().to_string());
        args.extend(plan.params.iter().cloned());

        for n in 1..=plan.attached_pictures.len() {
            args.push(format!("-c:v:{}", n));
            args.push("copy".to_string());
        }

        args.push("-c:s".to_string());
        args.push("copy".to_string());
        args.push("-c:d".to_string());
        args.push("copy".to_string());

        let needs_hvc1 = output
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| HVC1_TAG_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false);
        if needs_hvc1 {
            args.push("-tag:v:0".to_string());
            args.push("hvc1".to_string());
        }

        args.push(output.to_string_lossy().to_string());
        args
    }
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs encodes through a local ffmpeg binary
pub struct FfmpegEncoder {
    pub ffmpeg_bin: PathBuf,
    pub timeout_secs: Option<u64>,
}

impl FfmpegEncoder {
    pub fn new(cfg: &TranscodeConfig) -> Self {
        Self {
            ffmpeg_bin: cfg.ffmpeg_bin.clone(),
            timeout_secs: cfg.encode_timeout_secs,
        }
    }
}

#[async_trait]
impl EncodeRunner for FfmpegEncoder {
    async fn encode(
        &self,
        input: &Path,
        output: &Path,
        plan: &EncodingPlan,
    ) -> std::result::Result<ToolOutput, ToolError> {
        let args = CommandBuilder::new().build_encode_command(input, output, plan);
        info!(
            "Encoding {} -> {} with {}",
            input.display(),
            output.display(),
            plan.encoder.ffmpeg_name()
        );
        run_tool(&self.ffmpeg_bin, &args, self.timeout_secs).await
    }
}
