pub mod config;
pub mod error;
pub mod ffprobe;
pub mod ffmpeg;
pub mod hardware;
pub mod eligibility;
pub mod policy;
pub mod executor;
pub mod verify;
pub mod commit;
pub mod scan;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{QualityConfig, QualityKind, RateControl, TranscodeConfig};
pub use error::{ExecutionError, InvalidBitrate, ToolError, TranscodeError};
pub use ffmpeg::{check_dependencies, DependencyReport, FfmpegEncoder, ToolVersion};
pub use ffprobe::{FFProbeData, FFProbeFormat, FFProbeStream, FfprobeProber, MediaProber, ProbeResult};
pub use hardware::{FixedHardware, HardwareCapabilityProvider, HardwareTag, SystemHardwareProvider};
pub use eligibility::{CodecFamily, EligibilityVerdict};
pub use policy::{EncoderId, EncodingPlan, PolicyMode};
pub use executor::{EncodeRunner, TranscodeExecutor};
pub use verify::{IntegrityVerifier, VerificationVerdict};
pub use commit::{CommitManager, ConversionOutcome, RollbackReason, RunStatistics, SkipReason};
pub use scan::{MediaFile, ScanResult};
pub use pipeline::{Pipeline, RunReport};
