use std::fmt;
use crate::config::TranscodeConfig;
use crate::ffprobe::ProbeResult;
use crate::scan::MediaFile;

/// Video codec family of the primary stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecFamily {
    H264,
    Hevc,
    Vp9,
    Av1,
    Other(String),
}

impl CodecFamily {
    pub fn from_codec_name(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        match name.as_str() {
            "h264" | "avc" | "avc1" | "x264" => CodecFamily::H264,
            "hevc" | "h265" | "hev1" | "hvc1" | "x265" => CodecFamily::Hevc,
            "vp9" | "libvpx-vp9" => CodecFamily::Vp9,
            "av1" | "av01" | "libdav1d" | "libaom-av1" => CodecFamily::Av1,
            _ => CodecFamily::Other(name),
        }
    }

    /// Codecs that gain nothing from a HEVC re-encode
    pub fn is_modern(&self) -> bool {
        matches!(self, CodecFamily::Hevc | CodecFamily::Vp9 | CodecFamily::Av1)
    }
}

/// Outcome of the eligibility rules for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EligibilityVerdict {
    Eligible,
    SkippedExcludedExtension,
    SkippedNotVideo,
    SkippedNoVideoStream,
    SkippedMultipleVideoStreams,
    SkippedAlreadyModernCodec,
}

impl fmt::Display for EligibilityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            EligibilityVerdict::Eligible => "eligible",
            EligibilityVerdict::SkippedExcludedExtension => "excluded extension",
            EligibilityVerdict::SkippedNotVideo => "not a video",
            EligibilityVerdict::SkippedNoVideoStream => "no video stream",
            EligibilityVerdict::SkippedMultipleVideoStreams => "multiple video streams",
            EligibilityVerdict::SkippedAlreadyModernCodec => "already a modern codec",
        };
        f.write_str(reason)
    }
}

/// Extension check alone; lets the pipeline skip excluded files before probing them
pub fn check_extension(file: &MediaFile, cfg: &TranscodeConfig) -> EligibilityVerdict {
    if cfg.is_excluded_extension(&file.extension) {
        EligibilityVerdict::SkippedExcludedExtension
    } else {
        EligibilityVerdict::Eligible
    }
}

/// Decide whether a file is a transcode candidate. First matching rule wins.
pub fn is_eligible(file: &MediaFile, probe: &ProbeResult, cfg: &TranscodeConfig) -> EligibilityVerdict {
    let by_extension = check_extension(file, cfg);
    if by_extension != EligibilityVerdict::Eligible {
        return by_extension;
    }
    if !probe.has_video_stream {
        return EligibilityVerdict::SkippedNotVideo;
    }
    if probe.video_stream_count == 0 {
        return EligibilityVerdict::SkippedNoVideoStream;
    }
    if probe.video_stream_count > 1 {
        return EligibilityVerdict::SkippedMultipleVideoStreams;
    }

    let family = probe
        .primary_codec
        .as_deref()
        .map(CodecFamily::from_codec_name);
    if family.map(|f| f.is_modern()).unwrap_or(false) {
        return EligibilityVerdict::SkippedAlreadyModernCodec;
    }

    EligibilityVerdict::Eligible
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use proptest::prelude::*;

    fn file(name: &str) -> MediaFile {
        MediaFile::new(PathBuf::from(name), 1_000)
    }

    fn video(codec: &str, count: u32) -> ProbeResult {
        ProbeResult {
            has_video_stream: true,
            video_stream_count: count,
            primary_codec: Some(codec.to_string()),
            primary_stream_index: Some(0),
            attached_picture_indices: Vec::new(),
            video_bitrate: Some(4_000_000),
            container_bitrate: Some(4_200_000),
            duration_seconds: Some(60.0),
        }
    }

    #[test]
    fn test_codec_families() {
        assert_eq!(CodecFamily::from_codec_name("h264"), CodecFamily::H264);
        assert_eq!(CodecFamily::from_codec_name("HEVC"), CodecFamily::Hevc);
        assert_eq!(CodecFamily::from_codec_name("av01"), CodecFamily::Av1);
        assert_eq!(CodecFamily::from_codec_name("vp9"), CodecFamily::Vp9);
        assert_eq!(
            CodecFamily::from_codec_name("MPEG4"),
            CodecFamily::Other("mpeg4".to_string())
        );
        assert!(!CodecFamily::from_codec_name("vp8").is_modern());
        assert!(!CodecFamily::from_codec_name("h264").is_modern());
    }

    #[test]
    fn test_eligible_h264() {
        let cfg = TranscodeConfig::default();
        assert_eq!(is_eligible(&file("movie.mkv"), &video("h264", 1), &cfg), EligibilityVerdict::Eligible);
    }

    #[test]
    fn test_excluded_extension_wins_over_everything() {
        let cfg = TranscodeConfig::default();
        assert_eq!(
            is_eligible(&file("poster.JPG"), &video("mjpeg", 1), &cfg),
            EligibilityVerdict::SkippedExcludedExtension
        );
        assert_eq!(
            check_extension(&file("movie.srt"), &cfg),
            EligibilityVerdict::SkippedExcludedExtension
        );
    }

    #[test]
    fn test_not_video() {
        let cfg = TranscodeConfig::default();
        let probe = ProbeResult::default();
        assert_eq!(is_eligible(&file("sound.mka"), &probe, &cfg), EligibilityVerdict::SkippedNotVideo);
    }

    #[test]
    fn test_no_countable_video_stream() {
        let cfg = TranscodeConfig::default();
        let probe = ProbeResult {
            has_video_stream: true,
            video_stream_count: 0,
            ..Default::default()
        };
        assert_eq!(is_eligible(&file("album.mka"), &probe, &cfg), EligibilityVerdict::SkippedNoVideoStream);
    }

    #[test]
    fn test_multiple_video_streams_checked_before_codec() {
        let cfg = TranscodeConfig::default();
        assert_eq!(
            is_eligible(&file("multi.mkv"), &video("hevc", 2), &cfg),
            EligibilityVerdict::SkippedMultipleVideoStreams
        );
    }

    #[test]
    fn test_unknown_codec_is_eligible() {
        let cfg = TranscodeConfig::default();
        let mut probe = video("h264", 1);
        probe.primary_codec = None;
        assert_eq!(is_eligible(&file("odd.avi"), &probe, &cfg), EligibilityVerdict::Eligible);
    }

    proptest! {
        /// Modern codecs are skipped whatever their spelling case
        #[test]
        fn test_modern_codecs_always_skipped(
            codec in prop::sample::select(vec!["hevc", "vp9", "av1"]),
            upper in prop::bool::ANY,
        ) {
            let cfg = TranscodeConfig::default();
            let name = if upper { codec.to_uppercase() } else { codec.to_string() };
            prop_assert_eq!(
                is_eligible(&file("clip.mp4"), &video(&name, 1), &cfg),
                EligibilityVerdict::SkippedAlreadyModernCodec
            );
        }
    }
}
