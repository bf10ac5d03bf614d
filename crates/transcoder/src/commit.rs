use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use log::{error, info, warn};
use crate::eligibility::EligibilityVerdict;
use crate::error::ExecutionError;
use crate::scan::MediaFile;
use crate::verify::VerificationVerdict;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Run-wide totals, updated once per committed file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStatistics {
    pub total_space_saved_mb: f64,
    pub processed_files_count: u64,
}

impl RunStatistics {
    fn record(&mut self, space_saved_mb: f64) {
        self.total_space_saved_mb += space_saved_mb;
        self.processed_files_count += 1;
    }
}

/// Why a file was left alone without encoding
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Ineligible(EligibilityVerdict),
    InvalidBitrate(Option<u64>),
    UnknownDuration,
    ProbeFailed(String),
    StagingPathOccupied(PathBuf),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Ineligible(verdict) => write!(f, "{}", verdict),
            SkipReason::InvalidBitrate(source) => write!(f, "invalid source bitrate ({:?})", source),
            SkipReason::UnknownDuration => write!(f, "source duration is unknown"),
            SkipReason::ProbeFailed(e) => write!(f, "probe failed: {}", e),
            SkipReason::StagingPathOccupied(path) => {
                write!(f, "staging path already exists: {}", path.display())
            }
        }
    }
}

/// Why an encoded output was discarded
#[derive(Debug, Clone, PartialEq)]
pub enum RollbackReason {
    Execution(String),
    Verification(VerificationVerdict),
    /// The replace failed and the original is back at its own name
    CommitFailed(String),
    /// The replace failed and the original could not be moved back; both files are kept
    OriginalStranded {
        reason: String,
        backup: PathBuf,
        staging: PathBuf,
    },
}

impl From<&ExecutionError> for RollbackReason {
    fn from(err: &ExecutionError) -> Self {
        RollbackReason::Execution(err.to_string())
    }
}

impl fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackReason::Execution(e) => write!(f, "encoding failed: {}", e),
            RollbackReason::Verification(verdict) => write!(f, "verification rejected: {}", verdict),
            RollbackReason::CommitFailed(e) => write!(f, "replace failed: {}", e),
            RollbackReason::OriginalStranded { reason, backup, staging } => write!(
                f,
                "replace failed and the original could not be restored: {}; original kept at {}, converted copy kept at {}",
                reason,
                backup.display(),
                staging.display()
            ),
        }
    }
}

/// Final state of one file
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    Committed { space_saved_mb: f64 },
    RolledBack(RollbackReason),
    Skipped(SkipReason),
}

impl ConversionOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, ConversionOutcome::Committed { .. })
    }
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Hidden sibling that holds the original while the output is moved into place
pub fn backup_path(original: &Path) -> PathBuf {
    let name = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    original.with_file_name(format!(".{}.orig", name))
}

/// Sole owner of the replace-or-rollback decision
pub struct CommitManager;

impl CommitManager {
    /// Accept or discard the staging artifact according to the verdict
    pub fn commit(
        file: &MediaFile,
        staging: &Path,
        verdict: &VerificationVerdict,
        save_originals: bool,
        stats: &mut RunStatistics,
    ) -> ConversionOutcome {
        Self::commit_with(file, staging, verdict, save_originals, stats, |from, to| fs::rename(from, to))
    }

    fn commit_with<R>(
        file: &MediaFile,
        staging: &Path,
        verdict: &VerificationVerdict,
        save_originals: bool,
        stats: &mut RunStatistics,
        rename: R,
    ) -> ConversionOutcome
    where
        R: Fn(&Path, &Path) -> io::Result<()>,
    {
        let output_bytes = match verdict {
            VerificationVerdict::Approved { output_bytes, .. } => *output_bytes,
            rejected => {
                return Self::roll_back(file, staging, RollbackReason::Verification(rejected.clone()));
            }
        };

        // Rounded per file; the run total is the sum of these
        let space_saved_mb = round2(bytes_to_mb(file.size) - bytes_to_mb(output_bytes));

        if save_originals {
            info!(
                "Kept original {}, converted copy at {}",
                file.path.display(),
                staging.display()
            );
        } else {
            match replace_original(&file.path, staging, rename) {
                Ok(()) => {}
                Err(ReplaceError::Restored(reason)) => {
                    return Self::roll_back(file, staging, RollbackReason::CommitFailed(reason));
                }
                Err(ReplaceError::Stranded { reason, backup }) => {
                    // staging is not deleted here: it may be the only playable copy left
                    let reason = RollbackReason::OriginalStranded {
                        reason,
                        backup,
                        staging: staging.to_path_buf(),
                    };
                    error!("{}: {}", file.path.display(), reason);
                    return ConversionOutcome::RolledBack(reason);
                }
            }
        }

        stats.record(space_saved_mb);
        info!(
            "Committed {} (saved {:.2} MB)",
            file.path.display(),
            space_saved_mb
        );
        ConversionOutcome::Committed { space_saved_mb }
    }

    /// Delete the staging artifact if present; the original is never touched
    pub fn roll_back(file: &MediaFile, staging: &Path, reason: RollbackReason) -> ConversionOutcome {
        if staging.exists() {
            match fs::remove_file(staging) {
                Ok(()) => info!("Deleted staging artifact {}", staging.display()),
                Err(e) => warn!("Failed to delete staging artifact {}: {}", staging.display(), e),
            }
        }
        warn!("Rolled back {}: {}", file.path.display(), reason);
        ConversionOutcome::RolledBack(reason)
    }
}

/// Failure of the replace step
enum ReplaceError {
    /// The original is at its own name again
    Restored(String),
    /// The original only survives at the backup path
    Stranded { reason: String, backup: PathBuf },
}

/// Swap the staging artifact into the original's name, restoring the original on failure
fn replace_original<R>(original: &Path, staging: &Path, rename: R) -> Result<(), ReplaceError>
where
    R: Fn(&Path, &Path) -> io::Result<()>,
{
    let backup = backup_path(original);
    if backup.exists() {
        return Err(ReplaceError::Restored(format!(
            "backup path already exists: {}",
            backup.display()
        )));
    }

    rename(original, backup.as_path()).map_err(|e| {
        ReplaceError::Restored(format!(
            "failed to move original {} -> {}: {}",
            original.display(),
            backup.display(),
            e
        ))
    })?;

    if let Err(e) = rename(staging, original) {
        let reason = format!("failed to move {} -> {}: {}", staging.display(), original.display(), e);
        // put the original back under its own name
        return match rename(backup.as_path(), original) {
            Ok(()) => Err(ReplaceError::Restored(reason)),
            Err(restore) => Err(ReplaceError::Stranded {
                reason: format!("{}; restore failed: {}", reason, restore),
                backup,
            }),
        };
    }

    // Converted file is in place, drop the backup
    if let Err(e) = fs::remove_file(&backup) {
        warn!("Converted file is in place but the backup {} could not be deleted: {}", backup.display(), e);
    }
    Ok(())
}
