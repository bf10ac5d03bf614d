use std::fmt;
use std::path::Path;
use log::{debug, warn};
use crate::config::TranscodeConfig;
use crate::ffprobe::{MediaProber, ProbeResult};
use crate::policy::EncodingPlan;

/// Result of checking a staging artifact against its source
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationVerdict {
    Approved { output_bytes: u64, output_duration: f64 },
    RejectedMissingOutput,
    RejectedDurationMismatch { source: Option<f64>, output: Option<f64> },
    RejectedInvalidOutputBitrate,
    RejectedNotSmaller { original_bytes: u64, output_bytes: u64 },
}

impl VerificationVerdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, VerificationVerdict::Approved { .. })
    }
}

impl fmt::Display for VerificationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationVerdict::Approved { .. } => write!(f, "approved"),
            VerificationVerdict::RejectedMissingOutput => write!(f, "output file is missing"),
            VerificationVerdict::RejectedDurationMismatch { source, output } => write!(
                f,
                "duration mismatch (source {}, output {})",
                fmt_secs(*source),
                fmt_secs(*output)
            ),
            VerificationVerdict::RejectedInvalidOutputBitrate => write!(f, "output bitrate is missing or zero"),
            VerificationVerdict::RejectedNotSmaller { original_bytes, output_bytes } => write!(
                f,
                "output is not smaller ({} bytes vs {} bytes original)",
                output_bytes, original_bytes
            ),
        }
    }
}

fn fmt_secs(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}s", v))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Re-probes a staging artifact and decides whether it may replace the original
pub struct IntegrityVerifier<'a, P: MediaProber> {
    prober: &'a P,
    tolerance_secs: f64,
    require_smaller: bool,
}

impl<'a, P: MediaProber> IntegrityVerifier<'a, P> {
    pub fn new(prober: &'a P, cfg: &TranscodeConfig) -> Self {
        Self {
            prober,
            tolerance_secs: cfg.duration_tolerance_secs,
            require_smaller: cfg.require_smaller_output,
        }
    }

    /// Never touches the original; the caller removes a rejected staging artifact
    pub async fn verify(
        &self,
        source: &ProbeResult,
        original_bytes: u64,
        staging: &Path,
        plan: &EncodingPlan,
    ) -> VerificationVerdict {
        // Output must exist as a regular file
        let output_bytes = match std::fs::metadata(staging) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return VerificationVerdict::RejectedMissingOutput,
        };

        let output = match self.prober.probe(staging).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to re-probe {}: {:#}", staging.display(), e);
                return VerificationVerdict::RejectedDurationMismatch {
                    source: source.duration_seconds,
                    output: None,
                };
            }
        };

        let output_duration = match (source.duration_seconds, output.duration_seconds) {
            (Some(src), Some(out)) if (src - out).abs() <= self.tolerance_secs => out,
            (src, out) => {
                return VerificationVerdict::RejectedDurationMismatch { source: src, output: out };
            }
        };

        // Secondary check, only for bitrate-driven plans
        if plan.verify_output_bitrate {
            match output.effective_bitrate() {
                Some(bitrate) if bitrate > 0 => debug!("Output bitrate: {} bps", bitrate),
                _ => return VerificationVerdict::RejectedInvalidOutputBitrate,
            }
        }

        if self.require_smaller && output_bytes >= original_bytes {
            return VerificationVerdict::RejectedNotSmaller {
                original_bytes,
                output_bytes,
            };
        }

        VerificationVerdict::Approved {
            output_bytes,
            output_duration,
        }
    }
}
