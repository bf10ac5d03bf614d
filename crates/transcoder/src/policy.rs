use log::info;
use crate::config::{QualityConfig, QualityKind, RateControl, TranscodeConfig};
use crate::error::InvalidBitrate;
use crate::ffprobe::ProbeResult;
use crate::hardware::HardwareTag;

/// HEVC encoders, one per hardware family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderId {
    Libx265,
    HevcNvenc,
    HevcAmf,
    HevcQsv,
}

impl EncoderId {
    pub fn for_hardware(tag: HardwareTag) -> Self {
        match tag {
            HardwareTag::None => EncoderId::Libx265,
            HardwareTag::Nvidia => EncoderId::HevcNvenc,
            HardwareTag::Amd => EncoderId::HevcAmf,
            HardwareTag::Intel => EncoderId::HevcQsv,
        }
    }

    /// Get the FFmpeg encoder name for this encoder
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            EncoderId::Libx265 => "libx265",
            EncoderId::HevcNvenc => "hevc_nvenc",
            EncoderId::HevcAmf => "hevc_amf",
            EncoderId::HevcQsv => "hevc_qsv",
        }
    }

    fn pixel_format(&self) -> &'static str {
        match self {
            EncoderId::Libx265 => "yuv420p10le",
            _ => "p010le",
        }
    }
}

/// Rate control family of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyMode {
    QualityFixed,
    BitrateRelative,
}

/// Sample adaptive offset strength for libx265, banded by quality value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaoMode {
    Disabled,
    Limited,
    Full,
}

impl SaoMode {
    /// Step function: <=16 disabled, <=20 limited, above that full
    pub fn for_quality(quality: f64) -> Self {
        if quality <= 16.0 {
            SaoMode::Disabled
        } else if quality <= 20.0 {
            SaoMode::Limited
        } else {
            SaoMode::Full
        }
    }

    fn x265_param(&self) -> &'static str {
        match self {
            SaoMode::Disabled => "no-sao=1",
            SaoMode::Limited => "limit-sao=1",
            SaoMode::Full => "sao=1",
        }
    }
}

/// Concrete encoder invocation for one file
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingPlan {
    pub encoder: EncoderId,
    pub mode: PolicyMode,
    /// Absolute index of the stream to encode; `None` means the first video stream
    pub video_stream_index: Option<u32>,
    /// Cover art streams copied next to the encoded video
    pub attached_pictures: Vec<u32>,
    /// Encoder-scoped parameters, in order, following `-c:v:0 <encoder>`
    pub params: Vec<String>,
    /// Present only in bitrate-relative mode
    pub target_bitrate: Option<u64>,
    /// Re-probe the output bitrate during verification
    pub verify_output_bitrate: bool,
}

/// Bitrate-relative unless a fixed quality is both requested and configured
pub fn resolve_mode(cfg: &TranscodeConfig) -> PolicyMode {
    match (cfg.rate_control, cfg.quality.quality_value) {
        (RateControl::Quality, Some(_)) => PolicyMode::QualityFixed,
        _ => PolicyMode::BitrateRelative,
    }
}

/// Target bitrate as `floor(factor * source)`; zero or absent is an error
pub fn target_bitrate(source_bitrate: Option<u64>, factor: f64) -> Result<u64, InvalidBitrate> {
    let invalid = || InvalidBitrate { source_bitrate };
    let source = source_bitrate.filter(|b| *b > 0).ok_or_else(invalid)?;
    let target = (factor * source as f64).floor();
    if !target.is_finite() || target < 1.0 {
        return Err(invalid());
    }
    Ok(target as u64)
}

/// Produce the encoding plan for one file
pub fn select_plan(
    hardware: HardwareTag,
    cfg: &TranscodeConfig,
    probe: &ProbeResult,
) -> Result<EncodingPlan, InvalidBitrate> {
    let encoder = EncoderId::for_hardware(hardware);
    let mode = resolve_mode(cfg);
    let quality = &cfg.quality;

    let mut params = preset_params(encoder, &quality.preset);
    let mut target = None;

    match (mode, quality.quality_value) {
        (PolicyMode::QualityFixed, Some(value)) => {
            params.extend(quality_params(encoder, value, quality.quality_kind));
        }
        _ => {
            let bitrate = target_bitrate(probe.effective_bitrate(), cfg.bitrate_factor)?;
            params.extend(bitrate_params(encoder, bitrate));
            target = Some(bitrate);
        }
    }

    params.push("-pix_fmt".to_string());
    params.push(encoder.pixel_format().to_string());
    params.extend(audio_params(quality));

    let plan = EncodingPlan {
        encoder,
        mode,
        video_stream_index: probe.primary_stream_index,
        attached_pictures: probe.attached_picture_indices.clone(),
        params,
        target_bitrate: target,
        verify_output_bitrate: mode == PolicyMode::BitrateRelative,
    };

    info!(
        "Plan: {} ({:?}), quality {:?}, target bitrate {:?}, preset {}",
        encoder.ffmpeg_name(),
        mode,
        quality.quality_value.filter(|_| mode == PolicyMode::QualityFixed),
        target,
        quality.preset
    );

    Ok(plan)
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn preset_params(encoder: EncoderId, label: &str) -> Vec<String> {
    match encoder {
        EncoderId::HevcAmf => args(&["-quality", map_preset(encoder, label)]),
        _ => args(&["-preset", map_preset(encoder, label)]),
    }
}

fn quality_params(encoder: EncoderId, value: f64, kind: QualityKind) -> Vec<String> {
    let qp = value.round().clamp(0.0, 51.0) as u32;
    match encoder {
        EncoderId::Libx265 => {
            let sao = SaoMode::for_quality(value).x265_param();
            match kind {
                QualityKind::Crf => {
                    let mut p = args(&["-crf", &format_quality(value)]);
                    p.extend(args(&["-x265-params", sao]));
                    p
                }
                QualityKind::Qp => args(&["-x265-params", &format!("qp={}:{}", qp, sao)]),
            }
        }
        EncoderId::HevcNvenc => args(&["-rc", "constqp", "-qp", &qp.to_string()]),
        EncoderId::HevcAmf => {
            let qp = qp.to_string();
            args(&["-rc", "cqp", "-qp_i", &qp, "-qp_p", &qp])
        }
        EncoderId::HevcQsv => args(&["-global_quality", &qp.to_string()]),
    }
}

fn bitrate_params(encoder: EncoderId, bitrate: u64) -> Vec<String> {
    let b = bitrate.to_string();
    match encoder {
        EncoderId::Libx265 => args(&["-b:v", &b]),
        EncoderId::HevcNvenc => args(&["-rc", "vbr", "-b:v", &b]),
        EncoderId::HevcAmf => args(&["-rc", "vbr_peak", "-b:v", &b, "-maxrate", &b]),
        EncoderId::HevcQsv => args(&["-b:v", &b, "-maxrate", &b]),
    }
}

fn audio_params(quality: &QualityConfig) -> Vec<String> {
    match quality.audio_codec.as_deref() {
        Some(codec) if !codec.eq_ignore_ascii_case("copy") => {
            let mut p = args(&["-c:a", codec]);
            if let Some(bitrate) = quality.audio_bitrate.as_deref() {
                p.extend(args(&["-b:a", bitrate]));
            }
            p
        }
        _ => args(&["-c:a", "copy"]),
    }
}

/// "22" for whole numbers, "22.5" otherwise
fn format_quality(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Translate an x265-style preset label into the encoder's own dialect
pub fn map_preset(encoder: EncoderId, label: &str) -> &str {
    let lower = label.trim().to_lowercase();
    match encoder {
        EncoderId::Libx265 => label,
        EncoderId::HevcNvenc => match lower.as_str() {
            "ultrafast" | "superfast" => "p1",
            "veryfast" => "p2",
            "faster" | "fast" => "p3",
            "medium" => "p4",
            "slow" => "p5",
            "slower" => "p6",
            "veryslow" | "placebo" => "p7",
            _ => label,
        },
        EncoderId::HevcAmf => match lower.as_str() {
            "ultrafast" | "superfast" | "veryfast" | "faster" => "speed",
            "fast" | "medium" => "balanced",
            "slow" | "slower" | "veryslow" | "placebo" => "quality",
            _ => label,
        },
        EncoderId::HevcQsv => match lower.as_str() {
            "ultrafast" | "superfast" => "veryfast",
            "placebo" => "veryslow",
            _ => label,
        },
    }
}
