use std::collections::BTreeMap;

use crate::foundation::{
    error::{CompressError, CompressResult},
    format::{ColorRange, ColorStandard, ColorTransfer, MIME_AVC, MediaFormat, Rotation},
};

#[derive(serde::Deserialize)]
struct ProbeSideData {
    side_data_type: Option<String>,
    rotation: Option<f64>,
}

#[derive(serde::Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    bit_rate: Option<String>,
    color_range: Option<String>,
    color_space: Option<String>,
    color_transfer: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(serde::Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

/// Parse `ffprobe -print_format json -show_streams` output into one format per stream, in
/// stream order.
pub fn parse_probe_json(bytes: &[u8]) -> CompressResult<Vec<MediaFormat>> {
    let parsed: ProbeOut = serde_json::from_slice(bytes)
        .map_err(|e| CompressError::serde(format!("ffprobe json parse failed: {e}")))?;
    Ok(parsed.streams.iter().map(stream_format).collect())
}

fn stream_format(stream: &ProbeStream) -> MediaFormat {
    let codec_type = stream.codec_type.as_deref().unwrap_or("data");
    let codec_name = stream.codec_name.as_deref().unwrap_or("unknown");
    let mut format = MediaFormat::new(mime_for(codec_type, codec_name));

    if codec_type == "video" {
        format.width = stream.width;
        format.height = stream.height;
        format.rotation = stream_rotation(stream);
        format.frame_rate = stream
            .r_frame_rate
            .as_deref()
            .and_then(parse_ff_ratio)
            .map(|(num, den)| (f64::from(num) / f64::from(den)).round() as u32)
            .filter(|&fps| fps > 0);
        format.color_range = stream.color_range.as_deref().and_then(color_range);
        format.color_standard = stream.color_space.as_deref().and_then(color_standard);
        format.color_transfer = stream.color_transfer.as_deref().and_then(color_transfer);
    }
    format.bit_rate = stream.bit_rate.as_deref().and_then(|s| s.parse().ok());
    format
}

fn mime_for(codec_type: &str, codec_name: &str) -> String {
    let known = match codec_name {
        "h264" => MIME_AVC,
        "hevc" => "video/hevc",
        "vp8" => "video/x-vnd.on2.vp8",
        "vp9" => "video/x-vnd.on2.vp9",
        "av1" => "video/av01",
        "mpeg4" => "video/mp4v-es",
        "h263" => "video/3gpp",
        "aac" => "audio/mp4a-latm",
        "opus" => "audio/opus",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        _ => return format!("{codec_type}/x-{codec_name}"),
    };
    known.to_string()
}

/// Clockwise rotation. The display matrix reports counter-clockwise degrees and wins over the
/// legacy `rotate` tag.
fn stream_rotation(stream: &ProbeStream) -> Option<Rotation> {
    let from_matrix = stream
        .side_data_list
        .iter()
        .filter(|sd| sd.side_data_type.as_deref() == Some("Display Matrix"))
        .find_map(|sd| sd.rotation)
        .map(|ccw| -(ccw.round() as i32));
    let from_tag = || stream.tags.get("rotate").and_then(|s| s.parse::<i32>().ok());

    let degrees = from_matrix.or_else(from_tag)?;
    match Rotation::from_degrees(degrees) {
        Ok(rotation) => Some(rotation),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring stream rotation");
            None
        }
    }
}

fn color_range(s: &str) -> Option<ColorRange> {
    match s {
        "tv" | "mpeg" => Some(ColorRange::Limited),
        "pc" | "jpeg" => Some(ColorRange::Full),
        _ => None,
    }
}

fn color_standard(s: &str) -> Option<ColorStandard> {
    match s {
        "bt709" => Some(ColorStandard::Bt709),
        "bt470bg" => Some(ColorStandard::Bt601Pal),
        "smpte170m" => Some(ColorStandard::Bt601Ntsc),
        "bt2020nc" | "bt2020c" => Some(ColorStandard::Bt2020),
        _ => None,
    }
}

fn color_transfer(s: &str) -> Option<ColorTransfer> {
    match s {
        "bt709" | "smpte170m" | "bt470bg" | "bt2020-10" => Some(ColorTransfer::SdrVideo),
        "smpte2084" => Some(ColorTransfer::St2084),
        "arib-std-b67" => Some(ColorTransfer::Hlg),
        "linear" => Some(ColorTransfer::Linear),
        _ => None,
    }
}

fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let (a, b) = s.split_once('/')?;
    let a = a.parse::<u32>().ok()?;
    let b = b.parse::<u32>().ok()?;
    if b == 0 {
        return None;
    }
    Some((a, b))
}
