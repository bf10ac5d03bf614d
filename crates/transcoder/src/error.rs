use std::path::PathBuf;
use thiserror::Error;

/// Errors of the transcoding run, one variant per failure class
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// A required external tool is absent; aborts the run before any file is touched
    #[error("required tool `{tool}` is not available: {reason}")]
    FatalDependencyMissing { tool: String, reason: String },

    /// An input path does not exist or cannot be read
    #[error("cannot access {}: {reason}", path.display())]
    FileAccess { path: PathBuf, reason: String },
}

/// Source bitrate is missing or non-positive in bitrate-relative mode.
/// The file is skipped before the encoder is ever invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("source bitrate is missing or non-positive ({source_bitrate:?})")]
pub struct InvalidBitrate {
    pub source_bitrate: Option<u64>,
}

/// Failure of the encoder invocation
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to launch encoder: {0}")]
    Launch(String),

    #[error("encoder exited with status {code:?}: {stderr_tail}")]
    Failed { code: Option<i32>, stderr_tail: String },

    #[error("encoder timed out after {0}s and was killed")]
    TimedOut(u64),

    #[error("encoder reported success but produced no output at {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("encoder produced an empty file at {}", .0.display())]
    EmptyOutput(PathBuf),
}

/// Failure to run an external tool at all
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to spawn {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while waiting for {bin}: {source}")]
    Io {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{bin} timed out after {secs}s")]
    TimedOut { bin: String, secs: u64 },
}

impl From<ToolError> for ExecutionError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::TimedOut { secs, .. } => ExecutionError::TimedOut(secs),
            other => ExecutionError::Launch(other.to_string()),
        }
    }
}
