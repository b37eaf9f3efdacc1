//! Track inspection of real files through the system `ffprobe`.
//!
//! Probing yields formats only. [`ProbedSource`] is enough for track selection and parameter
//! planning; it cannot deliver samples.

use std::path::{Path, PathBuf};

use crate::{
    foundation::{
        buffer::BufferFlags,
        error::{CompressError, CompressResult},
        format::MediaFormat,
    },
    media::source::DemuxSource,
};

mod ffprobe;

pub use ffprobe::parse_probe_json;

#[cfg(feature = "media-ffmpeg")]
pub fn probe_tracks(path: &Path) -> CompressResult<Vec<MediaFormat>> {
    let out = std::process::Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams"])
        .arg(path)
        .output()
        .map_err(|e| CompressError::io(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(CompressError::io(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    let formats = parse_probe_json(&out.stdout)?;
    tracing::debug!(path = %path.display(), tracks = formats.len(), "probed");
    Ok(formats)
}

#[cfg(not(feature = "media-ffmpeg"))]
pub fn probe_tracks(_path: &Path) -> CompressResult<Vec<MediaFormat>> {
    Err(CompressError::validation(
        "probing files requires the 'media-ffmpeg' feature",
    ))
}

/// [`DemuxSource`] over probed track formats, without sample access.
#[derive(Clone, Debug)]
pub struct ProbedSource {
    path: PathBuf,
    tracks: Vec<MediaFormat>,
    selected: Option<usize>,
    released: bool,
}

impl ProbedSource {
    pub fn new(path: impl Into<PathBuf>, tracks: Vec<MediaFormat>) -> Self {
        Self {
            path: path.into(),
            tracks,
            selected: None,
            released: false,
        }
    }

    pub fn open(path: &Path) -> CompressResult<Self> {
        Ok(Self::new(path, probe_tracks(path)?))
    }

    pub fn selected_track(&self) -> Option<usize> {
        self.selected
    }
}

impl DemuxSource for ProbedSource {
    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, index: usize) -> CompressResult<MediaFormat> {
        self.tracks
            .get(index)
            .cloned()
            .ok_or_else(|| CompressError::validation(format!("no track at index {index}")))
    }

    fn select_track(&mut self, index: usize) -> CompressResult<()> {
        if index >= self.tracks.len() {
            return Err(CompressError::validation(format!(
                "no track at index {index}"
            )));
        }
        self.selected = Some(index);
        Ok(())
    }

    fn read_sample(&mut self, _buf: &mut [u8]) -> CompressResult<Option<usize>> {
        Err(CompressError::io(format!(
            "'{}' was probed, not opened; samples are unavailable",
            self.path.display()
        )))
    }

    fn sample_time_us(&self) -> Option<i64> {
        None
    }

    fn sample_flags(&self) -> BufferFlags {
        BufferFlags::empty()
    }

    fn advance(&mut self) -> bool {
        false
    }

    fn release(&mut self) -> CompressResult<()> {
        if self.released {
            return Err(CompressError::io("source released twice"));
        }
        self.released = true;
        Ok(())
    }
}
