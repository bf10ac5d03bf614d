use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use crate::config::TranscodeConfig;
use crate::ffmpeg::{run_tool, QUERY_TIMEOUT_SECS};

/// Hardware encoder family available for this run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareTag {
    None,
    Nvidia,
    Amd,
    Intel,
}

impl HardwareTag {
    /// Detection priority when several GPUs are present
    const PRIORITY: [HardwareTag; 3] = [HardwareTag::Nvidia, HardwareTag::Amd, HardwareTag::Intel];

    /// PCI vendor id of the GPU family
    fn from_pci_vendor(vendor: &str) -> Option<Self> {
        match vendor.trim().to_lowercase().as_str() {
            "0x10de" => Some(HardwareTag::Nvidia),
            "0x1002" => Some(HardwareTag::Amd),
            "0x8086" => Some(HardwareTag::Intel),
            _ => None,
        }
    }

    /// ffmpeg encoder that must be compiled in for the tag to be usable
    fn required_encoder(&self) -> Option<&'static str> {
        match self {
            HardwareTag::None => None,
            HardwareTag::Nvidia => Some("hevc_nvenc"),
            HardwareTag::Amd => Some("hevc_amf"),
            HardwareTag::Intel => Some("hevc_qsv"),
        }
    }
}

impl fmt::Display for HardwareTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HardwareTag::None => "none",
            HardwareTag::Nvidia => "nvidia",
            HardwareTag::Amd => "amd",
            HardwareTag::Intel => "intel",
        };
        f.write_str(name)
    }
}

impl FromStr for HardwareTag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "cpu" | "software" => Ok(HardwareTag::None),
            "nvidia" => Ok(HardwareTag::Nvidia),
            "amd" => Ok(HardwareTag::Amd),
            "intel" => Ok(HardwareTag::Intel),
            other => Err(anyhow!("unknown hardware tag: {}", other)),
        }
    }
}

/// Resolves the hardware tag once per run
#[async_trait]
pub trait HardwareCapabilityProvider: Send + Sync {
    async fn detect(&self) -> Result<HardwareTag>;
}

/// Provider that always returns a configured tag
pub struct FixedHardware(pub HardwareTag);

#[async_trait]
impl HardwareCapabilityProvider for FixedHardware {
    async fn detect(&self) -> Result<HardwareTag> {
        Ok(self.0)
    }
}

/// Detects GPUs through sysfs and checks that ffmpeg has the matching encoder
pub struct SystemHardwareProvider {
    pub ffmpeg_bin: PathBuf,
    pub drm_root: PathBuf,
}

impl SystemHardwareProvider {
    pub fn new(cfg: &TranscodeConfig) -> Self {
        Self {
            ffmpeg_bin: cfg.ffmpeg_bin.clone(),
            drm_root: PathBuf::from("/sys/class/drm"),
        }
    }

    async fn list_encoders(&self) -> Result<String> {
        let args = vec!["-hide_banner".to_string(), "-encoders".to_string()];
        let output = run_tool(&self.ffmpeg_bin, &args, Some(QUERY_TIMEOUT_SECS)).await?;
        if !output.success {
            return Err(anyhow!("FFmpeg encoder query failed"));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl HardwareCapabilityProvider for SystemHardwareProvider {
    async fn detect(&self) -> Result<HardwareTag> {
        let vendors = gpu_vendors(&self.drm_root);
        debug!("GPU vendors found under {}: {:?}", self.drm_root.display(), vendors);
        if vendors.is_empty() {
            return Ok(HardwareTag::None);
        }

        let encoders = self.list_encoders().await?;
        let tag = select_tag(&vendors, &encoders);
        info!("Detected hardware: {}", tag);
        Ok(tag)
    }
}

/// Enumerate GPU vendors from `<drm_root>/card*/device/vendor`
pub fn gpu_vendors(drm_root: &Path) -> Vec<HardwareTag> {
    let entries = match std::fs::read_dir(drm_root) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut vendors = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        // card0, card1 ... but not connector nodes like card0-DP-1
        if !name.starts_with("card") || name.contains('-') {
            continue;
        }
        let vendor_file = entry.path().join("device").join("vendor");
        if let Ok(vendor) = std::fs::read_to_string(&vendor_file) {
            if let Some(tag) = HardwareTag::from_pci_vendor(&vendor) {
                if !vendors.contains(&tag) {
                    vendors.push(tag);
                }
            }
        }
    }
    vendors
}

/// Pick the highest priority vendor whose HEVC encoder ffmpeg lists
pub fn select_tag(vendors: &[HardwareTag], encoder_list: &str) -> HardwareTag {
    HardwareTag::PRIORITY
        .iter()
        .copied()
        .filter(|tag| vendors.contains(tag))
        .find(|tag| {
            tag.required_encoder()
                .map(|enc| encoder_list.split_whitespace().any(|word| word == enc))
                .unwrap_or(false)
        })
        .unwrap_or(HardwareTag::None)
}
