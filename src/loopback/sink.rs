use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use crate::{
    foundation::{
        buffer::{BufferFlags, BufferInfo, TrackIndex},
        error::{CompressError, CompressResult},
        format::{MediaFormat, Rotation},
    },
    loopback::journal::{Call, Journal, Resource},
    media::sink::{ContainerFormat, MuxSink, SinkLifecycle, SinkState},
};

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct WrittenSample {
    pub track: TrackIndex,
    pub pts_us: i64,
    pub flags: BufferFlags,
    pub size: usize,
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// Everything a [`RecordingSink`] was asked to do.
#[derive(Clone, Debug, serde::Serialize)]
pub struct SinkRecording {
    pub path: PathBuf,
    pub container: ContainerFormat,
    pub orientation: Option<Rotation>,
    pub tracks: Vec<MediaFormat>,
    pub starts: usize,
    pub samples: Vec<WrittenSample>,
    pub state: SinkState,
    pub stops: usize,
    pub releases: usize,
}

impl SinkRecording {
    fn new(path: &Path, container: ContainerFormat) -> Self {
        Self {
            path: path.to_path_buf(),
            container,
            orientation: None,
            tracks: Vec::new(),
            starts: 0,
            samples: Vec::new(),
            state: SinkState::Created,
            stops: 0,
            releases: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.samples.iter().map(|s| s.size as u64).sum()
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.samples.iter().map(|s| s.pts_us).collect()
    }
}

/// [`MuxSink`] that keeps every written sample in memory instead of producing a file.
#[derive(Debug)]
pub struct RecordingSink {
    lifecycle: SinkLifecycle,
    recording: Arc<Mutex<SinkRecording>>,
    fail_write_at: Option<usize>,
    journal: Journal,
}

impl RecordingSink {
    pub fn new(path: &Path, container: ContainerFormat) -> Self {
        Self {
            lifecycle: SinkLifecycle::default(),
            recording: Arc::new(Mutex::new(SinkRecording::new(path, container))),
            fail_write_at: None,
            journal: Journal::default(),
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Fail the write of the sample with this zero-based index.
    pub fn fail_write_at(mut self, index: Option<usize>) -> Self {
        self.fail_write_at = index;
        self
    }

    /// Shared handle to the recording; stays readable after the sink is dropped.
    pub fn recording(&self) -> Arc<Mutex<SinkRecording>> {
        Arc::clone(&self.recording)
    }

    fn update<R>(&self, f: impl FnOnce(&mut SinkRecording) -> R) -> R {
        let mut rec = self.recording.lock().unwrap_or_else(|e| e.into_inner());
        let out = f(&mut rec);
        rec.state = self.lifecycle.state();
        out
    }
}

impl MuxSink for RecordingSink {
    fn set_orientation_hint(&mut self, rotation: Rotation) -> CompressResult<()> {
        self.lifecycle.set_orientation_hint()?;
        self.update(|rec| rec.orientation = Some(rotation));
        Ok(())
    }

    fn add_track(&mut self, format: &MediaFormat) -> CompressResult<TrackIndex> {
        self.journal.record(Resource::Sink, Call::AddTrack);
        let track = self.lifecycle.add_track()?;
        self.update(|rec| rec.tracks.push(format.clone()));
        Ok(track)
    }

    fn start(&mut self) -> CompressResult<()> {
        self.journal.record(Resource::Sink, Call::Start);
        self.lifecycle.start()?;
        self.update(|rec| rec.starts += 1);
        Ok(())
    }

    fn write_sample(
        &mut self,
        track: TrackIndex,
        buffer: &[u8],
        info: &BufferInfo,
    ) -> CompressResult<()> {
        self.lifecycle.write_sample(track)?;
        let data = info.payload(buffer).ok_or_else(|| {
            CompressError::muxer_state(format!(
                "sample range {}+{} outside a {} byte buffer",
                info.offset,
                info.size,
                buffer.len()
            ))
        })?;

        let index = self.update(|rec| rec.samples.len());
        if self.fail_write_at == Some(index) {
            return Err(CompressError::io(format!("injected write failure at sample {index}")));
        }

        self.update(|rec| {
            rec.samples.push(WrittenSample {
                track,
                pts_us: info.presentation_time_us,
                flags: info.flags,
                size: data.len(),
                data: data.to_vec(),
            })
        });
        Ok(())
    }

    fn stop(&mut self) -> CompressResult<()> {
        self.journal.record(Resource::Sink, Call::Stop);
        let result = self.lifecycle.stop();
        self.update(|rec| rec.stops += 1);
        result
    }

    fn release(&mut self) -> CompressResult<()> {
        self.journal.record(Resource::Sink, Call::Release);
        let result = self.lifecycle.release();
        self.update(|rec| rec.releases += 1);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::format::MIME_AVC;

    fn info(size: usize, pts: i64) -> BufferInfo {
        BufferInfo {
            offset: 0,
            size,
            presentation_time_us: pts,
            flags: BufferFlags::empty(),
        }
    }

    #[test]
    fn records_tracks_and_samples() {
        let mut sink = RecordingSink::new(Path::new("out.mp4"), ContainerFormat::Mp4);
        let rec = sink.recording();
        sink.set_orientation_hint(Rotation::Cw270).unwrap();
        let track = sink.add_track(&MediaFormat::video(MIME_AVC, 8, 8)).unwrap();
        sink.start().unwrap();
        sink.write_sample(track, &[1, 2, 3], &info(3, 10)).unwrap();
        sink.write_sample(track, &[4, 5], &info(2, 20)).unwrap();
        sink.stop().unwrap();
        sink.release().unwrap();
        drop(sink);

        let rec = rec.lock().unwrap();
        assert_eq!(rec.orientation, Some(Rotation::Cw270));
        assert_eq!(rec.tracks.len(), 1);
        assert_eq!(rec.timestamps(), vec![10, 20]);
        assert_eq!(rec.bytes_written(), 5);
        assert_eq!(rec.samples[0].data, vec![1, 2, 3]);
        assert_eq!((rec.starts, rec.stops, rec.releases), (1, 1, 1));
        assert_eq!(rec.state, SinkState::Released);
    }

    #[test]
    fn injected_write_failure() {
        let mut sink =
            RecordingSink::new(Path::new("out.mp4"), ContainerFormat::Mp4).fail_write_at(Some(1));
        let track = sink.add_track(&MediaFormat::video(MIME_AVC, 8, 8)).unwrap();
        sink.start().unwrap();
        sink.write_sample(track, &[1], &info(1, 0)).unwrap();
        assert!(matches!(
            sink.write_sample(track, &[2], &info(1, 1)),
            Err(CompressError::Io(_))
        ));
        assert_eq!(sink.recording().lock().unwrap().samples.len(), 1);
    }

    #[test]
    fn never_started_sink_still_stops() {
        let journal = Journal::default();
        let mut sink = RecordingSink::new(Path::new("out.mp4"), ContainerFormat::Mp4)
            .with_journal(journal.clone());
        sink.stop().unwrap();
        sink.release().unwrap();
        assert!(sink.release().is_err());
        assert_eq!(journal.count(Resource::Sink, Call::Release), 2);
        assert_eq!(sink.recording().lock().unwrap().releases, 2);
    }
}
