use std::path::{Path, PathBuf};
use async_trait::async_trait;
use log::{debug, warn};
use crate::error::{ExecutionError, ToolError};
use crate::ffmpeg::ToolOutput;
use crate::policy::EncodingPlan;
use crate::scan::MediaFile;

/// Runs one encode of `input` into `output`
#[async_trait]
pub trait EncodeRunner: Send + Sync {
    async fn encode(
        &self,
        input: &Path,
        output: &Path,
        plan: &EncodingPlan,
    ) -> Result<ToolOutput, ToolError>;
}

/// `<dir>/<basename><suffix><ext>` next to the input
pub fn staging_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    input.with_file_name(name)
}

/// Invokes the encoder once and checks that it left a non-empty staging artifact
pub struct TranscodeExecutor<'a, E: EncodeRunner> {
    runner: &'a E,
    staging_suffix: &'a str,
}

impl<'a, E: EncodeRunner> TranscodeExecutor<'a, E> {
    pub fn new(runner: &'a E, staging_suffix: &'a str) -> Self {
        Self { runner, staging_suffix }
    }

    pub fn staging_path_for(&self, file: &MediaFile) -> PathBuf {
        staging_path(&file.path, self.staging_suffix)
    }

    pub async fn execute(&self, file: &MediaFile, plan: &EncodingPlan) -> Result<PathBuf, ExecutionError> {
        let staging = self.staging_path_for(file);
        debug!("Staging artifact for {}: {}", file.path.display(), staging.display());

        let output = self.runner.encode(&file.path, &staging, plan).await?;

        if !output.success {
            let stderr_tail = output.stderr_tail(20);
            warn!(
                "Encoder failed for {} (exit code {:?}): {}",
                file.path.display(),
                output.exit_code,
                stderr_tail
            );
            return Err(ExecutionError::Failed {
                code: output.exit_code,
                stderr_tail,
            });
        }

        match std::fs::metadata(&staging) {
            Ok(meta) if meta.len() > 0 => Ok(staging),
            Ok(_) => Err(ExecutionError::EmptyOutput(staging)),
            Err(_) => Err(ExecutionError::MissingOutput(staging)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{media_file, sample_plan, EncodeBehavior, FakeEncoder};

    #[test]
    fn test_staging_path_naming() {
        assert_eq!(
            staging_path(Path::new("/media/movie.mkv"), "_HEVC"),
            PathBuf::from("/media/movie_HEVC.mkv")
        );
        assert_eq!(
            staging_path(Path::new("my.home.video.MP4"), "_HEVC"),
            PathBuf::from("my.home.video_HEVC.MP4")
        );
        assert_eq!(staging_path(Path::new("/media/raw"), "_HEVC"), PathBuf::from("/media/raw_HEVC"));
    }

    #[tokio::test]
    async fn test_successful_encode_returns_staging() {
        let dir = tempfile::tempdir().unwrap();
        let file = media_file(dir.path(), "movie.mkv", 1000);
        let encoder = FakeEncoder::new(EncodeBehavior::Write(400));

        let staging = TranscodeExecutor::new(&encoder, "_HEVC")
            .execute(&file, &sample_plan())
            .await
            .unwrap();
        assert_eq!(staging, dir.path().join("movie_HEVC.mkv"));
        assert_eq!(std::fs::metadata(&staging).unwrap().len(), 400);
    }

    #[tokio::test]
    async fn test_no_output_is_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let file = media_file(dir.path(), "broken.avi", 1000);
        let encoder = FakeEncoder::new(EncodeBehavior::NoOutput);

        let result = TranscodeExecutor::new(&encoder, "_HEVC").execute(&file, &sample_plan()).await;
        assert!(matches!(result, Err(ExecutionError::MissingOutput(_))));
    }

    #[tokio::test]
    async fn test_empty_output_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = media_file(dir.path(), "movie.mkv", 1000);
        let encoder = FakeEncoder::new(EncodeBehavior::Write(0));

        let result = TranscodeExecutor::new(&encoder, "_HEVC").execute(&file, &sample_plan()).await;
        assert!(matches!(result, Err(ExecutionError::EmptyOutput(_))));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure_even_with_output() {
        let dir = tempfile::tempdir().unwrap();
        let file = media_file(dir.path(), "movie.mkv", 1000);
        let encoder = FakeEncoder::new(EncodeBehavior::FailAfterWriting(100));

        let result = TranscodeExecutor::new(&encoder, "_HEVC").execute(&file, &sample_plan()).await;
        assert!(matches!(result, Err(ExecutionError::Failed { code: Some(1), .. })));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timed_out() {
        let dir = tempfile::tempdir().unwrap();
        let file = media_file(dir.path(), "movie.mkv", 1000);
        let encoder = FakeEncoder::new(EncodeBehavior::TimeOut);

        let result = TranscodeExecutor::new(&encoder, "_HEVC").execute(&file, &sample_plan()).await;
        assert!(matches!(result, Err(ExecutionError::TimedOut(_))));
    }
}
