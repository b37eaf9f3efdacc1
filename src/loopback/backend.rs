use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use crate::{
    foundation::{
        error::{CompressError, CompressResult},
        format::{MIME_AVC, MIME_VIDEO_PREFIX},
    },
    loopback::{
        codec::{LoopbackCodec, LoopbackOptions},
        journal::{Call, Journal, Resource},
        sink::{RecordingSink, SinkRecording},
        source::{SyntheticMedia, SyntheticSource},
    },
    media::{
        backend::MediaBackend,
        codec::CodecPort,
        sink::{ContainerFormat, MuxSink},
        source::DemuxSource,
    },
};

/// In-process [`MediaBackend`]: every path opens the same synthetic media and every sink
/// records into memory.
#[derive(Debug, Default)]
pub struct LoopbackBackend {
    pub media: SyntheticMedia,
    pub decoder: LoopbackOptions,
    pub encoder: LoopbackOptions,
    /// Forwarded to every sink this backend creates.
    pub fail_write_at: Option<usize>,
    journal: Journal,
    recordings: Mutex<Vec<Arc<Mutex<SinkRecording>>>>,
}

impl LoopbackBackend {
    pub fn new(media: SyntheticMedia) -> Self {
        Self {
            media,
            ..Self::default()
        }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn recordings(&self) -> Vec<Arc<Mutex<SinkRecording>>> {
        self.recordings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Snapshot of the most recently created sink.
    pub fn last_recording(&self) -> Option<SinkRecording> {
        let last = self.recordings().pop()?;
        let rec = last.lock().unwrap_or_else(|e| e.into_inner()).clone();
        Some(rec)
    }
}

impl MediaBackend for LoopbackBackend {
    fn open_source(&self, path: &Path) -> CompressResult<Box<dyn DemuxSource>> {
        self.journal.record(Resource::Source, Call::Open);
        tracing::debug!(path = %path.display(), "opening synthetic source");
        Ok(Box::new(
            SyntheticSource::new(self.media.clone()).with_journal(self.journal.clone()),
        ))
    }

    fn create_decoder(&self, mime: &str) -> CompressResult<Box<dyn CodecPort>> {
        if !mime.starts_with(MIME_VIDEO_PREFIX) {
            return Err(CompressError::validation(format!(
                "no loopback decoder for '{mime}'"
            )));
        }
        self.journal.record(Resource::Decoder, Call::Open);
        Ok(Box::new(
            LoopbackCodec::new(format!("loopback.decoder.{mime}"), self.decoder.clone())
                .with_journal(self.journal.clone(), Resource::Decoder),
        ))
    }

    fn create_encoder(&self, mime: &str) -> CompressResult<Box<dyn CodecPort>> {
        if mime != MIME_AVC {
            return Err(CompressError::validation(format!(
                "no loopback encoder for '{mime}'"
            )));
        }
        self.journal.record(Resource::Encoder, Call::Open);
        Ok(Box::new(
            LoopbackCodec::new(format!("loopback.encoder.{mime}"), self.encoder.clone())
                .with_journal(self.journal.clone(), Resource::Encoder),
        ))
    }

    fn create_sink(
        &self,
        path: &Path,
        container: ContainerFormat,
    ) -> CompressResult<Box<dyn MuxSink>> {
        self.journal.record(Resource::Sink, Call::Open);
        let sink = RecordingSink::new(path, container)
            .with_journal(self.journal.clone())
            .fail_write_at(self.fail_write_at);
        self.recordings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sink.recording());
        Ok(Box::new(sink))
    }
}
