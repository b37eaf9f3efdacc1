use crate::{
    config::EncoderSettings,
    foundation::{
        error::CompressResult,
        format::{ColorFormat, ColorRange, ColorStandard, ColorTransfer, MediaFormat, Rotation},
    },
    media::codec::CodecPort,
};

/// Pixel formats in order of preference. The first one the encoder advertises wins.
pub const COLOR_FORMAT_PREFERENCE: [ColorFormat; 4] = [
    ColorFormat::YUV420_PLANAR,
    ColorFormat::YUV420_PACKED_PLANAR,
    ColorFormat::YUV420_SEMI_PLANAR,
    ColorFormat::YUV420_FLEXIBLE,
];

/// Used when the capability query fails or advertises nothing we know.
pub const FALLBACK_COLOR_FORMAT: ColorFormat = ColorFormat::YUV420_FLEXIBLE;

/// Target parameters for the re-encoded track. Computed once per job.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct OutputParams {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub bit_rate: u32,
    pub rotation: Rotation,
    pub color_format: ColorFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_range: Option<ColorRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_standard: Option<ColorStandard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_transfer: Option<ColorTransfer>,
}

/// Pick a pixel format from an encoder capability list.
///
/// `None` means the capability query itself failed.
pub fn select_color_format(supported: Option<&[ColorFormat]>) -> ColorFormat {
    let Some(supported) = supported else {
        return FALLBACK_COLOR_FORMAT;
    };
    COLOR_FORMAT_PREFERENCE
        .into_iter()
        .find(|f| supported.contains(f))
        .unwrap_or(FALLBACK_COLOR_FORMAT)
}

/// Derive output parameters from the source track and the encoder's capabilities.
///
/// Dimensions pass through unchanged. Rotation defaults to 0 and the color fields stay unset
/// when the source does not carry them.
#[tracing::instrument(skip_all, fields(mime = %source.mime))]
pub fn plan_output_params(
    source: &MediaFormat,
    encoder: &dyn CodecPort,
    settings: &EncoderSettings,
) -> CompressResult<OutputParams> {
    let (width, height) = source.dimensions()?;

    let supported = match encoder.color_formats(&settings.mime) {
        Ok(formats) => {
            tracing::debug!(?formats, encoder = encoder.name(), "encoder color formats");
            Some(formats)
        }
        Err(e) => {
            tracing::warn!(error = %e, encoder = encoder.name(), "color format query failed");
            None
        }
    };
    let color_format = select_color_format(supported.as_deref());

    let params = OutputParams {
        width,
        height,
        frame_rate: settings.frame_rate,
        bit_rate: settings.bit_rate,
        rotation: source.rotation.unwrap_or_default(),
        color_format,
        color_range: source.color_range,
        color_standard: source.color_standard,
        color_transfer: source.color_transfer,
    };

    tracing::info!(
        width,
        height,
        rotation = params.rotation.degrees(),
        color_format = color_format.name(),
        color_range = ?params.color_range,
        color_standard = ?params.color_standard,
        color_transfer = ?params.color_transfer,
        "planned output parameters"
    );

    Ok(params)
}

/// Build the format the encoder is configured with.
pub fn encoder_format(params: &OutputParams, settings: &EncoderSettings) -> MediaFormat {
    MediaFormat {
        mime: settings.mime.clone(),
        width: Some(params.width),
        height: Some(params.height),
        rotation: Some(params.rotation),
        frame_rate: Some(params.frame_rate),
        bit_rate: Some(params.bit_rate),
        i_frame_interval_sec: Some(settings.i_frame_interval_sec),
        color_format: Some(params.color_format),
        color_range: params.color_range,
        color_standard: params.color_standard,
        color_transfer: params.color_transfer,
        profile: Some(settings.profile),
        level_idc: Some(settings.level_idc),
        bitrate_mode: Some(settings.bitrate_mode),
        quality: settings.quality,
        priority: settings.priority,
        quality_scale: settings.quality_scale,
        codec_config: None,
    }
}
