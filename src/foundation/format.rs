use crate::foundation::error::{CompressError, CompressResult};

/// Mime prefix shared by every video track.
pub const MIME_VIDEO_PREFIX: &str = "video/";
/// H.264 / AVC elementary stream.
pub const MIME_AVC: &str = "video/avc";
/// Uncompressed frames handed from a decoder to an encoder.
pub const MIME_RAW_VIDEO: &str = "video/raw";

/// Clockwise display rotation of a video track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Accepts any multiple of 90 degrees, normalized into `[0, 360)`.
    pub fn from_degrees(degrees: i32) -> CompressResult<Self> {
        match degrees.rem_euclid(360) {
            0 => Ok(Self::None),
            90 => Ok(Self::Cw90),
            180 => Ok(Self::Cw180),
            270 => Ok(Self::Cw270),
            _ => Err(CompressError::validation(format!(
                "rotation must be a multiple of 90 degrees, got {degrees}"
            ))),
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }
}

impl TryFrom<u16> for Rotation {
    type Error = CompressError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::from_degrees(i32::from(value))
    }
}

impl From<Rotation> for u16 {
    fn from(value: Rotation) -> Self {
        value.degrees()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorRange {
    Full,
    Limited,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorStandard {
    Bt709,
    Bt601Pal,
    Bt601Ntsc,
    Bt2020,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorTransfer {
    Linear,
    SdrVideo,
    St2084,
    Hlg,
}

/// Pixel-format code understood by a codec port.
///
/// Kept as an open integer code because capability lists may advertise vendor formats the
/// planner knows nothing about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ColorFormat(pub i32);

impl ColorFormat {
    pub const YUV420_PLANAR: Self = Self(19);
    pub const YUV420_PACKED_PLANAR: Self = Self(20);
    pub const YUV420_SEMI_PLANAR: Self = Self(21);
    pub const YUV420_FLEXIBLE: Self = Self(0x7F42_0888);

    pub fn name(self) -> &'static str {
        match self {
            Self::YUV420_PLANAR => "yuv420-planar",
            Self::YUV420_PACKED_PLANAR => "yuv420-packed-planar",
            Self::YUV420_SEMI_PLANAR => "yuv420-semi-planar",
            Self::YUV420_FLEXIBLE => "yuv420-flexible",
            _ => "vendor",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvcProfile {
    Baseline,
    Main,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitrateMode {
    /// Constant quality.
    Cq,
    Vbr,
    Cbr,
}

/// Typed format descriptor exchanged between sources, codec ports and sinks.
///
/// Absent fields are meaningful: a codec or container must not receive a default in their
/// place, so every optional key is skipped when serializing.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MediaFormat {
    pub mime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Rotation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub i_frame_interval_sec: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_format: Option<ColorFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_range: Option<ColorRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_standard: Option<ColorStandard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_transfer: Option<ColorTransfer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<AvcProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_idc: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_mode: Option<BitrateMode>,
    /// Vendor quality hint (`quality`). Encoders are free to reject it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u32>,
    /// Vendor scheduling hint (`priority`), 0 being realtime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    /// Vendor quality hint (`quality-scale`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_scale: Option<f32>,
    /// Codec-specific configuration (SPS/PPS for H.264).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec_config: Option<Vec<u8>>,
}

impl MediaFormat {
    pub fn new(mime: impl Into<String>) -> Self {
        Self {
            mime: mime.into(),
            ..Self::default()
        }
    }

    pub fn video(mime: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            mime: mime.into(),
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    pub fn has_quality_hints(&self) -> bool {
        self.quality.is_some() || self.priority.is_some() || self.quality_scale.is_some()
    }

    /// Copy of this format with the vendor quality hints cleared.
    pub fn without_quality_hints(&self) -> Self {
        Self {
            quality: None,
            priority: None,
            quality_scale: None,
            ..self.clone()
        }
    }

    pub fn is_video(&self) -> bool {
        self.mime.starts_with(MIME_VIDEO_PREFIX)
    }

    /// Returns `(width, height)` or a validation error naming the missing key.
    pub fn dimensions(&self) -> CompressResult<(u32, u32)> {
        let width = self.width.ok_or_else(|| {
            CompressError::validation(format!("format '{}' has no width", self.mime))
        })?;
        let height = self.height.ok_or_else(|| {
            CompressError::validation(format!("format '{}' has no height", self.mime))
        })?;
        if width == 0 || height == 0 {
            return Err(CompressError::validation(format!(
                "format '{}' has zero dimensions {width}x{height}",
                self.mime
            )));
        }
        Ok((width, height))
    }
}
