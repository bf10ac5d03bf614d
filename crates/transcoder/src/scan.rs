use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use walkdir::WalkDir;
use crate::config::TranscodeConfig;
use crate::error::TranscodeError;

/// A file discovered for this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub path: PathBuf,
    pub size: u64,
    /// Lowercase, without the leading dot; empty when the file has none
    pub extension: String,
}

impl MediaFile {
    pub fn new(path: PathBuf, size: u64) -> Self {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();
        Self { path, size, extension }
    }

    /// Stat a path and describe it, failing for anything that is not a readable regular file
    pub fn from_path(path: &Path) -> Result<Self, TranscodeError> {
        let access = |reason: String| TranscodeError::FileAccess {
            path: path.to_path_buf(),
            reason,
        };
        let metadata = std::fs::metadata(path).map_err(|e| access(e.to_string()))?;
        if !metadata.is_file() {
            return Err(access("not a regular file".to_string()));
        }
        Ok(Self::new(path.to_path_buf(), metadata.len()))
    }
}

/// Result of collecting one input
#[derive(Debug)]
pub enum ScanResult {
    Candidate(MediaFile),
    Inaccessible(TranscodeError),
}

/// Resolve explicit paths, or list the working directory when none are given
pub fn collect_inputs(explicit: &[PathBuf], working_dir: &Path, cfg: &TranscodeConfig) -> Vec<ScanResult> {
    if !explicit.is_empty() {
        return explicit
            .iter()
            .map(|path| match MediaFile::from_path(path) {
                Ok(file) => ScanResult::Candidate(file),
                Err(e) => {
                    warn!("{}", e);
                    ScanResult::Inaccessible(e)
                }
            })
            .collect();
    }

    info!("Scanning directory: {}", working_dir.display());

    let mut results = Vec::new();
    let walker = WalkDir::new(working_dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Error reading directory entry: {}", e);
                continue;
            }
        };

        // Skip directories and symlinks
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if let Some(reason) = listing_skip_reason(path, cfg) {
            debug!("Ignoring {}: {}", path.display(), reason);
            continue;
        }

        match MediaFile::from_path(path) {
            Ok(file) => results.push(ScanResult::Candidate(file)),
            Err(e) => {
                warn!("{}", e);
                results.push(ScanResult::Inaccessible(e));
            }
        }
    }

    info!("Scan complete: {} candidate(s) in {}", results.len(), working_dir.display());
    results
}

/// Files a directory listing never hands to the pipeline
fn listing_skip_reason(path: &Path, cfg: &TranscodeConfig) -> Option<&'static str> {
    let name = path.file_name()?.to_string_lossy();
    if name.starts_with('.') {
        return Some("hidden file");
    }

    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    if cfg.is_excluded_extension(&ext) {
        return Some("excluded extension");
    }

    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    if !cfg.staging_suffix.is_empty() && stem.ends_with(cfg.staging_suffix.as_str()) {
        return Some("leftover staging artifact");
    }

    None
}
