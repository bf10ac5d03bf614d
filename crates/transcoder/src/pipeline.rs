use std::path::PathBuf;
use humansize::{format_size, DECIMAL};
use log::{info, warn};
use crate::commit::{CommitManager, ConversionOutcome, RollbackReason, RunStatistics, SkipReason};
use crate::config::TranscodeConfig;
use crate::eligibility::{self, EligibilityVerdict};
use crate::error::InvalidBitrate;
use crate::executor::{EncodeRunner, TranscodeExecutor};
use crate::ffprobe::MediaProber;
use crate::hardware::HardwareTag;
use crate::policy;
use crate::scan::MediaFile;
use crate::verify::IntegrityVerifier;

/// Outcomes of a whole run plus the final statistics
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub outcomes: Vec<(PathBuf, ConversionOutcome)>,
    pub stats: RunStatistics,
}

/// Per-file probe, filter, plan, encode, verify and commit
pub struct Pipeline<'a, P: MediaProber, E: EncodeRunner> {
    cfg: &'a TranscodeConfig,
    hardware: HardwareTag,
    prober: &'a P,
    encoder: &'a E,
}

impl<'a, P: MediaProber, E: EncodeRunner> Pipeline<'a, P, E> {
    pub fn new(cfg: &'a TranscodeConfig, hardware: HardwareTag, prober: &'a P, encoder: &'a E) -> Self {
        Self {
            cfg,
            hardware,
            prober,
            encoder,
        }
    }

    /// Process files strictly one after another
    pub async fn run(&self, files: &[MediaFile]) -> RunReport {
        let mut stats = RunStatistics::default();
        let mut outcomes = Vec::with_capacity(files.len());

        for (i, file) in files.iter().enumerate() {
            info!(
                "[{}/{}] {} ({})",
                i + 1,
                files.len(),
                file.path.display(),
                format_size(file.size, DECIMAL)
            );
            let outcome = self.process_file(file, &mut stats).await;
            outcomes.push((file.path.clone(), outcome));
        }

        info!(
            "Run finished: {} file(s) converted, {:.2} MB saved",
            stats.processed_files_count, stats.total_space_saved_mb
        );
        RunReport { outcomes, stats }
    }

    /// Never returns an error: every failure becomes a skip or a rollback
    pub async fn process_file(&self, file: &MediaFile, stats: &mut RunStatistics) -> ConversionOutcome {
        let skip = |reason: SkipReason| {
            info!("Skipping {}: {}", file.path.display(), reason);
            ConversionOutcome::Skipped(reason)
        };

        // Excluded files are never handed to ffprobe
        let by_extension = eligibility::check_extension(file, self.cfg);
        if by_extension != EligibilityVerdict::Eligible {
            return skip(SkipReason::Ineligible(by_extension));
        }

        // Probe source
        let probe = match self.prober.probe(&file.path).await {
            Ok(probe) => probe,
            Err(e) => return skip(SkipReason::ProbeFailed(format!("{:#}", e))),
        };

        let verdict = eligibility::is_eligible(file, &probe, self.cfg);
        if verdict != EligibilityVerdict::Eligible {
            return skip(SkipReason::Ineligible(verdict));
        }

        // Nothing to verify the output against
        if probe.duration_seconds.is_none() {
            return skip(SkipReason::UnknownDuration);
        }

        let plan = match policy::select_plan(self.hardware, self.cfg, &probe) {
            Ok(plan) => plan,
            Err(InvalidBitrate { source_bitrate }) => {
                return skip(SkipReason::InvalidBitrate(source_bitrate));
            }
        };

        // Never encode over a file we did not create
        let executor = TranscodeExecutor::new(self.encoder, &self.cfg.staging_suffix);
        let staging = executor.staging_path_for(file);
        if staging.exists() {
            return skip(SkipReason::StagingPathOccupied(staging));
        }

        if let Err(e) = executor.execute(file, &plan).await {
            warn!("Encoding {} failed: {}", file.path.display(), e);
            return CommitManager::roll_back(file, &staging, RollbackReason::from(&e));
        }

        // Re-probe the output before the original is touched
        let verdict = IntegrityVerifier::new(self.prober, self.cfg)
            .verify(&probe, file.size, &staging, &plan)
            .await;
        info!("Verification of {}: {}", staging.display(), verdict);

        CommitManager::commit(file, &staging, &verdict, self.cfg.quality.save_originals, stats)
    }
}
