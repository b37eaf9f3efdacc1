use crate::{
    foundation::{
        buffer::BufferFlags,
        error::{CompressError, CompressResult},
        format::{MIME_AVC, MediaFormat},
    },
    loopback::journal::{Call, Journal, Resource},
    media::source::DemuxSource,
};

#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub data: Vec<u8>,
    pub pts_us: i64,
    pub flags: BufferFlags,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticTrack {
    pub format: MediaFormat,
    pub samples: Vec<Sample>,
}

impl SyntheticTrack {
    pub fn new(format: MediaFormat, samples: Vec<Sample>) -> Self {
        Self { format, samples }
    }
}

/// In-memory stand-in for a demuxed container.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyntheticMedia {
    pub tracks: Vec<SyntheticTrack>,
}

impl SyntheticMedia {
    /// One H.264 video track of `frames` samples with timestamps `i * step_us`.
    ///
    /// Sample `i` carries `i` as little-endian bytes so it can be traced through the pipeline.
    pub fn clip(frames: usize, width: u32, height: u32, step_us: i64) -> Self {
        let samples = (0..frames)
            .map(|i| Sample {
                data: sample_payload(i),
                pts_us: i as i64 * step_us,
                flags: if i == 0 {
                    BufferFlags::KEY_FRAME
                } else {
                    BufferFlags::empty()
                },
            })
            .collect();
        Self {
            tracks: vec![SyntheticTrack::new(
                MediaFormat::video(MIME_AVC, width, height),
                samples,
            )],
        }
    }

    pub fn with_track(mut self, track: SyntheticTrack) -> Self {
        self.tracks.push(track);
        self
    }

    /// Mutable access to the format of the first video track, if any.
    pub fn video_format_mut(&mut self) -> Option<&mut MediaFormat> {
        self.tracks
            .iter_mut()
            .map(|t| &mut t.format)
            .find(|f| f.is_video())
    }
}

pub fn sample_payload(index: usize) -> Vec<u8> {
    let mut data = vec![0xA5u8; 4];
    data.extend_from_slice(&(index as u64).to_le_bytes());
    data
}

/// [`DemuxSource`] over a [`SyntheticMedia`].
#[derive(Debug)]
pub struct SyntheticSource {
    media: SyntheticMedia,
    selected: Option<usize>,
    cursor: usize,
    released: bool,
    journal: Journal,
}

impl SyntheticSource {
    pub fn new(media: SyntheticMedia) -> Self {
        Self {
            media,
            selected: None,
            cursor: 0,
            released: false,
            journal: Journal::default(),
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn selected_track(&self) -> Option<usize> {
        self.selected
    }

    fn ensure_open(&self, op: &str) -> CompressResult<()> {
        if self.released {
            return Err(CompressError::io(format!("{op} on a released source")));
        }
        Ok(())
    }

    fn current(&self) -> Option<&Sample> {
        let track = self.media.tracks.get(self.selected?)?;
        track.samples.get(self.cursor)
    }
}

impl DemuxSource for SyntheticSource {
    fn track_count(&self) -> usize {
        self.media.tracks.len()
    }

    fn track_format(&self, index: usize) -> CompressResult<MediaFormat> {
        self.ensure_open("track_format")?;
        self.media
            .tracks
            .get(index)
            .map(|t| t.format.clone())
            .ok_or_else(|| CompressError::validation(format!("no track at index {index}")))
    }

    fn select_track(&mut self, index: usize) -> CompressResult<()> {
        self.ensure_open("select_track")?;
        if index >= self.media.tracks.len() {
            return Err(CompressError::validation(format!(
                "no track at index {index}"
            )));
        }
        self.selected = Some(index);
        self.cursor = 0;
        Ok(())
    }

    fn read_sample(&mut self, buf: &mut [u8]) -> CompressResult<Option<usize>> {
        self.ensure_open("read_sample")?;
        if self.selected.is_none() {
            return Err(CompressError::io("read_sample before select_track"));
        }
        let Some(sample) = self.current() else {
            return Ok(None);
        };
        let Some(dst) = buf.get_mut(..sample.data.len()) else {
            return Err(CompressError::io(format!(
                "sample of {} bytes does not fit a {} byte buffer",
                sample.data.len(),
                buf.len()
            )));
        };
        dst.copy_from_slice(&sample.data);
        Ok(Some(sample.data.len()))
    }

    fn sample_time_us(&self) -> Option<i64> {
        self.current().map(|s| s.pts_us)
    }

    fn sample_flags(&self) -> BufferFlags {
        self.current().map(|s| s.flags).unwrap_or_default()
    }

    fn advance(&mut self) -> bool {
        let Some(len) = self
            .selected
            .and_then(|i| self.media.tracks.get(i))
            .map(|t| t.samples.len())
        else {
            return false;
        };
        if self.cursor < len {
            self.cursor += 1;
        }
        self.cursor < len
    }

    fn release(&mut self) -> CompressResult<()> {
        self.journal.record(Resource::Source, Call::Release);
        if self.released {
            return Err(CompressError::io("source released twice"));
        }
        self.released = true;
        Ok(())
    }
}
