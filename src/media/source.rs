use crate::foundation::{
    buffer::BufferFlags,
    error::{CompressError, CompressResult},
    format::MediaFormat,
};

/// Demultiplexed input: a set of tracks, one of which is selected for sample delivery.
pub trait DemuxSource {
    fn track_count(&self) -> usize;

    fn track_format(&self, index: usize) -> CompressResult<MediaFormat>;

    /// Enable sample delivery from `index`.
    fn select_track(&mut self, index: usize) -> CompressResult<()>;

    /// Copy the current sample of the selected track into `buf`.
    ///
    /// Returns `Ok(None)` once the track is exhausted.
    fn read_sample(&mut self, buf: &mut [u8]) -> CompressResult<Option<usize>>;

    /// Presentation timestamp of the current sample in microseconds.
    fn sample_time_us(&self) -> Option<i64>;

    fn sample_flags(&self) -> BufferFlags;

    /// Move to the next sample. Returns `false` when no sample follows.
    fn advance(&mut self) -> bool;

    fn release(&mut self) -> CompressResult<()>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectedTrack {
    pub index: usize,
    pub format: MediaFormat,
}

/// Select the first track whose mime type is a video type.
#[tracing::instrument(skip(source))]
pub fn select_video_track(source: &mut dyn DemuxSource) -> CompressResult<SelectedTrack> {
    for index in 0..source.track_count() {
        let format = source.track_format(index)?;
        if format.is_video() {
            source.select_track(index)?;
            tracing::debug!(index, mime = %format.mime, "selected video track");
            return Ok(SelectedTrack { index, format });
        }
    }
    Err(CompressError::NoVideoTrack)
}
