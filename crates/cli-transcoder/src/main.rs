use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{debug, info, warn};
use std::path::PathBuf;
use transcoder::{
    check_dependencies,
    scan::{collect_inputs, ScanResult},
    ConversionOutcome, FfmpegEncoder, FfprobeProber, FixedHardware, HardwareCapabilityProvider,
    HardwareTag, Pipeline, QualityKind, RateControl, SystemHardwareProvider, TranscodeConfig,
};

/// Batch re-encode video files to HEVC in place
#[derive(Parser, Debug)]
#[command(name = "hevcify", author, version, about, long_about = None)]
struct Args {
    /// Files to convert; defaults to every file in the current directory
    files: Vec<PathBuf>,

    /// Keep originals and leave the converted copy next to them
    #[arg(short = 'S', long = "save")]
    save: bool,

    /// Constant rate factor
    #[arg(long, conflicts_with = "qp")]
    crf: Option<f64>,

    /// Constant quantizer
    #[arg(long)]
    qp: Option<f64>,

    /// Encoder preset label (ultrafast .. veryslow)
    #[arg(long)]
    preset: Option<String>,

    /// Audio codec; audio streams are copied when omitted
    #[arg(long)]
    acodec: Option<String>,

    /// Audio bitrate, e.g. 192k
    #[arg(long)]
    abitrate: Option<String>,

    /// Target a fraction of the source bitrate instead of a fixed quality
    #[arg(long)]
    bitrate_relative: bool,

    /// Force a hardware family: none, nvidia, amd or intel
    #[arg(long)]
    hardware: Option<String>,

    /// Per-file encode deadline in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Rewrite single-dash long flags (`-crf=20`, `-help`) into the double-dash form
fn normalize_legacy_flags<I: IntoIterator<Item = String>>(args: I) -> Vec<String> {
    const LEGACY: &[&str] = &["crf", "qp", "preset", "acodec", "abitrate", "help", "save"];

    args.into_iter()
        .map(|arg| {
            let Some(body) = arg.strip_prefix('-') else {
                return arg;
            };
            if body.starts_with('-') {
                return arg;
            }
            let name = body.split('=').next().unwrap_or(body);
            if LEGACY.contains(&name) {
                format!("-{}", arg)
            } else {
                arg
            }
        })
        .collect()
}

fn apply_overrides(cfg: &mut TranscodeConfig, args: &Args) -> Result<()> {
    if let Some(crf) = args.crf {
        cfg.quality.quality_value = Some(crf);
        cfg.quality.quality_kind = QualityKind::Crf;
    }
    if let Some(qp) = args.qp {
        cfg.quality.quality_value = Some(qp);
        cfg.quality.quality_kind = QualityKind::Qp;
    }
    if let Some(preset) = &args.preset {
        cfg.quality.preset = preset.clone();
    }
    if let Some(acodec) = &args.acodec {
        cfg.quality.audio_codec = Some(acodec.clone());
    }
    if let Some(abitrate) = &args.abitrate {
        cfg.quality.audio_bitrate = Some(abitrate.clone());
    }
    if args.save {
        cfg.quality.save_originals = true;
    }
    if args.bitrate_relative {
        cfg.rate_control = RateControl::Bitrate;
    }
    if let Some(hardware) = &args.hardware {
        cfg.hardware = Some(hardware.parse::<HardwareTag>().context("Invalid --hardware value")?);
    }
    if let Some(timeout) = args.timeout {
        cfg.encode_timeout_secs = Some(timeout);
    }
    Ok(())
}

fn format_duration(d: chrono::Duration) -> String {
    let hours = d.num_hours();
    let minutes = d.num_minutes() % 60;
    let seconds = d.num_seconds() % 60;
    format!("{}h {}m {}s", hours, minutes, seconds)
}

async fn resolve_hardware(cfg: &TranscodeConfig) -> HardwareTag {
    let provider: Box<dyn HardwareCapabilityProvider> = match cfg.hardware {
        Some(tag) => Box::new(FixedHardware(tag)),
        None => Box::new(SystemHardwareProvider::new(cfg)),
    };
    match provider.detect().await {
        Ok(tag) => tag,
        Err(e) => {
            warn!("Hardware detection failed, using software encoding: {:#}", e);
            HardwareTag::None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_from(normalize_legacy_flags(std::env::args()));

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    let started = Utc::now();

    // Load configuration, then let flags override it
    let mut cfg = TranscodeConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    apply_overrides(&mut cfg, &args)?;

    // Missing ffmpeg/ffprobe aborts before any file is touched
    let deps = check_dependencies(&cfg).await?;
    info!(
        "Using {} ({}) and {} ({})",
        cfg.ffmpeg_bin.display(),
        deps.ffmpeg_version.map(|v| v.to_string()).unwrap_or_else(|| "unknown version".to_string()),
        cfg.ffprobe_bin.display(),
        deps.ffprobe_version.map(|v| v.to_string()).unwrap_or_else(|| "unknown version".to_string()),
    );

    let hardware = resolve_hardware(&cfg).await;
    info!("Hardware: {}", hardware);
    debug!("Configuration: {:?}", cfg);

    // Collect inputs; unreadable paths are reported and left out
    let working_dir = std::env::current_dir().context("Failed to read current directory")?;
    let mut files = Vec::new();
    for result in collect_inputs(&args.files, &working_dir, &cfg) {
        match result {
            ScanResult::Candidate(file) => files.push(file),
            ScanResult::Inaccessible(e) => println!("{}", e),
        }
    }

    let prober = FfprobeProber::new(&cfg);
    let encoder = FfmpegEncoder::new(&cfg);
    let report = Pipeline::new(&cfg, hardware, &prober, &encoder).run(&files).await;

    // Report every file that was not converted
    for (path, outcome) in &report.outcomes {
        match outcome {
            ConversionOutcome::Committed { .. } => {}
            ConversionOutcome::RolledBack(reason) => println!("{}: {}", path.display(), reason),
            ConversionOutcome::Skipped(reason) => println!("{}: skipped, {}", path.display(), reason),
        }
    }

    let elapsed = Utc::now() - started;
    println!("Total space saved: {:.2} MB", report.stats.total_space_saved_mb);
    println!("Files converted: {}", report.stats.processed_files_count);
    println!("Elapsed: {}", format_duration(elapsed));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_legacy_flags() {
        let normalized = normalize_legacy_flags(strings(&[
            "hevcify", "-crf=20", "-preset=slow", "-S", "-v", "--qp", "25", "-save", "movie.mkv",
        ]));
        assert_eq!(
            normalized,
            strings(&["hevcify", "--crf=20", "--preset=slow", "-S", "-v", "--qp", "25", "--save", "movie.mkv"])
        );
    }

    #[test]
    fn test_legacy_flags_parse() {
        let args = Args::try_parse_from(normalize_legacy_flags(strings(&[
            "hevcify", "-qp=24", "-acodec=aac", "-abitrate=160k", "a.mkv", "b.avi",
        ])))
        .unwrap();
        assert_eq!(args.qp, Some(24.0));
        assert_eq!(args.acodec.as_deref(), Some("aac"));
        assert_eq!(args.abitrate.as_deref(), Some("160k"));
        assert_eq!(args.files, vec![PathBuf::from("a.mkv"), PathBuf::from("b.avi")]);
    }

    #[test]
    fn test_crf_and_qp_conflict() {
        assert!(Args::try_parse_from(strings(&["hevcify", "--crf", "20", "--qp", "20"])).is_err());
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from(strings(&[
            "hevcify", "--qp", "28", "--bitrate-relative", "--hardware", "nvidia", "-S", "--timeout", "600",
        ]))
        .unwrap();
        let mut cfg = TranscodeConfig::default();
        apply_overrides(&mut cfg, &args).unwrap();

        assert_eq!(cfg.quality.quality_value, Some(28.0));
        assert_eq!(cfg.quality.quality_kind, QualityKind::Qp);
        assert_eq!(cfg.rate_control, RateControl::Bitrate);
        assert_eq!(cfg.hardware, Some(HardwareTag::Nvidia));
        assert!(cfg.quality.save_originals);
        assert_eq!(cfg.encode_timeout_secs, Some(600));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(chrono::Duration::seconds(3725)), "1h 2m 5s");
        assert_eq!(format_duration(chrono::Duration::seconds(59)), "0h 0m 59s");
    }

    #[test]
    fn test_bad_hardware_override() {
        let args = Args::try_parse_from(strings(&["hevcify", "--hardware", "voodoo"])).unwrap();
        let mut cfg = TranscodeConfig::default();
        assert!(apply_overrides(&mut cfg, &args).is_err());
    }
}
