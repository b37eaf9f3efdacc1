use std::{path::Path, time::Duration};

use crate::foundation::{
    error::{CompressError, CompressResult},
    format::{AvcProfile, BitrateMode, MIME_AVC},
};

/// What the hand-off stage does with a decoded frame when the encoder has no free input slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffPolicy {
    /// Keep the decoder output slot claimed and retry on the next iteration.
    #[default]
    Retain,
    /// Release the decoder output slot unrendered. End-of-stream frames are still retained.
    Drop,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderSettings {
    pub mime: String,
    pub frame_rate: u32,
    pub bit_rate: u32,
    pub i_frame_interval_sec: u32,
    pub profile: AvcProfile,
    /// H.264 `level_idc`, e.g. 51 for level 5.1.
    pub level_idc: u8,
    pub bitrate_mode: BitrateMode,
    /// Optional vendor hints. An encoder that rejects them is configured again without them.
    pub quality: Option<u32>,
    pub priority: Option<u32>,
    pub quality_scale: Option<f32>,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            mime: MIME_AVC.to_string(),
            frame_rate: 60,
            bit_rate: 40_000_000,
            i_frame_interval_sec: 1,
            profile: AvcProfile::High,
            level_idc: 51,
            bitrate_mode: BitrateMode::Cbr,
            quality: Some(100),
            priority: Some(0),
            quality_scale: Some(1.0),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressConfig {
    /// Appended to the input file stem to name the output.
    pub output_suffix: String,
    /// Timeout for every slot claim.
    pub poll_timeout_us: u64,
    /// Log a progress line every this many decoded frames.
    pub progress_interval: u64,
    pub handoff: HandoffPolicy,
    /// Fail after this many consecutive iterations without progress. `None` disables the guard.
    pub stall_limit: Option<u64>,
    pub encoder: EncoderSettings,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            output_suffix: "_compress".to_string(),
            poll_timeout_us: 10_000,
            progress_interval: 100,
            handoff: HandoffPolicy::Retain,
            stall_limit: Some(10_000),
            encoder: EncoderSettings::default(),
        }
    }
}

impl CompressConfig {
    pub fn from_json_path(path: &Path) -> CompressResult<Self> {
        let bytes = std::fs::read(path)?;
        let cfg: Self = serde_json::from_slice(&bytes).map_err(|e| {
            CompressError::serde(format!("parse config '{}': {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CompressResult<()> {
        if self.output_suffix.is_empty() {
            // An empty suffix would make the output path collide with the input.
            return Err(CompressError::validation("output_suffix must be non-empty"));
        }
        if self.output_suffix.contains(['/', '\\']) {
            return Err(CompressError::validation(
                "output_suffix must not contain path separators",
            ));
        }
        if self.progress_interval == 0 {
            return Err(CompressError::validation(
                "progress_interval must be non-zero",
            ));
        }
        if self.stall_limit == Some(0) {
            return Err(CompressError::validation("stall_limit must be non-zero"));
        }
        if !self.encoder.mime.starts_with(crate::foundation::format::MIME_VIDEO_PREFIX) {
            return Err(CompressError::validation(format!(
                "encoder mime '{}' is not a video type",
                self.encoder.mime
            )));
        }
        if self.encoder.frame_rate == 0 {
            return Err(CompressError::validation("encoder frame_rate must be non-zero"));
        }
        if self.encoder.bit_rate == 0 {
            return Err(CompressError::validation("encoder bit_rate must be non-zero"));
        }
        if let Some(scale) = self.encoder.quality_scale
            && !(scale.is_finite() && scale > 0.0)
        {
            return Err(CompressError::validation(format!(
                "encoder quality_scale must be positive, got {scale}"
            )));
        }
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_micros(self.poll_timeout_us)
    }
}
