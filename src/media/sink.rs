use crate::foundation::{
    buffer::{BufferInfo, TrackIndex},
    error::{CompressError, CompressResult},
    format::{MediaFormat, Rotation},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerFormat {
    #[default]
    Mp4,
}

/// Container writer for encoded samples.
///
/// Call order: `set_orientation_hint`, `add_track`, `start`, any number of `write_sample`,
/// then `stop` and `release` once each.
pub trait MuxSink {
    fn set_orientation_hint(&mut self, rotation: Rotation) -> CompressResult<()>;

    fn add_track(&mut self, format: &MediaFormat) -> CompressResult<TrackIndex>;

    fn start(&mut self) -> CompressResult<()>;

    /// Write `buffer[info.offset..info.offset + info.size]` as one sample of `track`.
    fn write_sample(
        &mut self,
        track: TrackIndex,
        buffer: &[u8],
        info: &BufferInfo,
    ) -> CompressResult<()>;

    fn stop(&mut self) -> CompressResult<()>;

    fn release(&mut self) -> CompressResult<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkState {
    Created,
    Started,
    Stopped,
    Released,
}

/// Call-order checks shared by [`MuxSink`] implementations.
#[derive(Clone, Debug)]
pub struct SinkLifecycle {
    state: SinkState,
    tracks: usize,
}

impl Default for SinkLifecycle {
    fn default() -> Self {
        Self {
            state: SinkState::Created,
            tracks: 0,
        }
    }
}

impl SinkLifecycle {
    pub fn state(&self) -> SinkState {
        self.state
    }

    pub fn set_orientation_hint(&self) -> CompressResult<()> {
        self.expect("set_orientation_hint", SinkState::Created)
    }

    pub fn add_track(&mut self) -> CompressResult<TrackIndex> {
        self.expect("add_track", SinkState::Created)?;
        let index = TrackIndex(self.tracks);
        self.tracks += 1;
        Ok(index)
    }

    pub fn start(&mut self) -> CompressResult<()> {
        self.expect("start", SinkState::Created)?;
        if self.tracks == 0 {
            return Err(CompressError::muxer_state("start called before any add_track"));
        }
        self.state = SinkState::Started;
        Ok(())
    }

    pub fn write_sample(&self, track: TrackIndex) -> CompressResult<()> {
        self.expect("write_sample", SinkState::Started)?;
        if track.0 >= self.tracks {
            return Err(CompressError::muxer_state(format!(
                "write_sample to unknown track {}",
                track.0
            )));
        }
        Ok(())
    }

    /// A sink that never started finalizes as an empty container.
    pub fn stop(&mut self) -> CompressResult<()> {
        match self.state {
            SinkState::Created | SinkState::Started => {
                self.state = SinkState::Stopped;
                Ok(())
            }
            other => Err(CompressError::muxer_state(format!(
                "stop called in state {other:?}"
            ))),
        }
    }

    pub fn release(&mut self) -> CompressResult<()> {
        if self.state == SinkState::Released {
            return Err(CompressError::muxer_state("release called twice"));
        }
        self.state = SinkState::Released;
        Ok(())
    }

    fn expect(&self, op: &str, state: SinkState) -> CompressResult<()> {
        if self.state != state {
            return Err(CompressError::muxer_state(format!(
                "{op} called in state {:?}",
                self.state
            )));
        }
        Ok(())
    }
}
