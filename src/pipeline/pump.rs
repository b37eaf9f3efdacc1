use std::time::{Duration, Instant};

use crate::{
    config::{CompressConfig, HandoffPolicy},
    foundation::{
        buffer::{BufferFlags, BufferInfo, SlotIndex, TrackIndex},
        error::{CompressError, CompressResult},
        format::MediaFormat,
    },
    media::{
        codec::{CodecPort, OutputEvent},
        sink::MuxSink,
        source::DemuxSource,
    },
};

/// What a single stage accomplished in one iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageOutcome {
    Progressed,
    WouldBlock,
    Done,
}

/// Mutable state of one transcode run. Owned by the [`Pump`].
#[derive(Clone, Debug, Default)]
pub struct PipelineState {
    pub decoder_input_done: bool,
    pub decoder_output_done: bool,
    pub encoder_output_done: bool,
    /// Bound once the encoder's real output format is known.
    pub muxer_track: Option<TrackIndex>,
    pub frames_processed: u64,
    /// Decoder output slot still waiting for a free encoder input slot.
    pub held_frame: Option<(SlotIndex, BufferInfo)>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PumpStats {
    pub iterations: u64,
    pub samples_fed: u64,
    /// Decoder output slots handled by the hand-off stage, end-of-stream slot included.
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub samples_written: u64,
    pub bytes_written: u64,
    pub codec_config_buffers: u64,
    /// Samples whose timestamp went backwards relative to the previous write.
    pub out_of_order: u64,
    pub last_pts_us: Option<i64>,
}

#[derive(Clone, Copy, Debug)]
pub struct PumpOptions {
    pub timeout: Duration,
    pub handoff: HandoffPolicy,
    pub progress_interval: u64,
    pub stall_limit: Option<u64>,
}

impl Default for PumpOptions {
    fn default() -> Self {
        Self::from(&CompressConfig::default())
    }
}

impl From<&CompressConfig> for PumpOptions {
    fn from(cfg: &CompressConfig) -> Self {
        Self {
            timeout: cfg.poll_timeout(),
            handoff: cfg.handoff,
            progress_interval: cfg.progress_interval.max(1),
            stall_limit: cfg.stall_limit,
        }
    }
}

/// Drives samples from a source through a decoder and encoder into a sink.
///
/// Each iteration runs three stages in order:
/// 1. [`Pump::feed`]: source sample → decoder input
/// 2. [`Pump::hand_off`]: decoder output → encoder input
/// 3. [`Pump::drain`]: encoder output → sink
///
/// The ports must already be started. The pump never stops or releases them; teardown is the
/// caller's job so it happens on every exit path.
pub struct Pump<'a> {
    source: &'a mut dyn DemuxSource,
    decoder: &'a mut dyn CodecPort,
    encoder: &'a mut dyn CodecPort,
    sink: &'a mut dyn MuxSink,
    opts: PumpOptions,
    state: PipelineState,
    stats: PumpStats,
    started: Instant,
}

impl<'a> Pump<'a> {
    pub fn new(
        source: &'a mut dyn DemuxSource,
        decoder: &'a mut dyn CodecPort,
        encoder: &'a mut dyn CodecPort,
        sink: &'a mut dyn MuxSink,
        opts: PumpOptions,
    ) -> Self {
        Self {
            source,
            decoder,
            encoder,
            sink,
            opts,
            state: PipelineState::default(),
            stats: PumpStats::default(),
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.state.decoder_input_done && self.state.encoder_output_done
    }

    /// Run all stages until the decoder input is fully fed and the encoder reported end of
    /// stream.
    #[tracing::instrument(skip_all)]
    pub fn run(mut self) -> CompressResult<PumpStats> {
        let mut idle = 0u64;
        while !self.is_finished() {
            let outcomes = [self.feed()?, self.hand_off()?, self.drain()?];
            self.stats.iterations += 1;

            if outcomes.contains(&StageOutcome::Progressed) {
                idle = 0;
            } else {
                idle += 1;
                if let Some(limit) = self.opts.stall_limit
                    && idle >= limit
                {
                    return Err(CompressError::Stalled { iterations: idle });
                }
            }
        }

        self.stats.frames_processed = self.state.frames_processed;
        tracing::info!(
            frames = self.stats.frames_processed,
            samples = self.stats.samples_written,
            dropped = self.stats.frames_dropped,
            elapsed_sec = format!("{:.1}", self.started.elapsed().as_secs_f64()),
            "encoding finished"
        );
        if self.stats.frames_dropped > 0 {
            tracing::warn!(
                dropped = self.stats.frames_dropped,
                "frames were dropped at the decoder/encoder hand-off"
            );
        }
        Ok(self.stats)
    }

    /// Move the next source sample into a decoder input slot.
    pub fn feed(&mut self) -> CompressResult<StageOutcome> {
        if self.state.decoder_input_done {
            return Ok(StageOutcome::Done);
        }
        let Some(slot) = self.decoder.claim_input_slot(self.opts.timeout)? else {
            return Ok(StageOutcome::WouldBlock);
        };

        let buf = self.decoder.input_buffer(slot)?;
        match self.source.read_sample(buf)? {
            None => {
                self.decoder
                    .submit_input(slot, 0, 0, BufferFlags::END_OF_STREAM)?;
                self.state.decoder_input_done = true;
                tracing::debug!(samples = self.stats.samples_fed, "decoder input finished");
                Ok(StageOutcome::Done)
            }
            Some(size) => {
                let pts = self.source.sample_time_us().unwrap_or(0);
                // end of stream is signalled by the empty submission above
                let flags = self
                    .source
                    .sample_flags()
                    .difference(BufferFlags::END_OF_STREAM);
                self.decoder.submit_input(slot, size, pts, flags)?;
                self.source.advance();
                self.stats.samples_fed += 1;
                Ok(StageOutcome::Progressed)
            }
        }
    }

    /// Copy one decoded frame into an encoder input slot.
    pub fn hand_off(&mut self) -> CompressResult<StageOutcome> {
        if self.state.decoder_output_done {
            return Ok(StageOutcome::Done);
        }

        let (slot, info) = match self.state.held_frame.take() {
            Some(held) => held,
            None => match self.decoder.claim_output_slot(self.opts.timeout)? {
                OutputEvent::Available(slot, info) => (slot, info),
                OutputEvent::TryAgainLater => return Ok(StageOutcome::WouldBlock),
                OutputEvent::FormatChanged(format) => {
                    tracing::debug!(mime = %format.mime, "decoder output format changed");
                    return Ok(StageOutcome::Progressed);
                }
                OutputEvent::BuffersChanged => return Ok(StageOutcome::Progressed),
            },
        };

        match self.encoder.claim_input_slot(self.opts.timeout)? {
            Some(enc_slot) => {
                let src = self.decoder.output_buffer(slot)?;
                let frame = info.payload(src).ok_or_else(|| {
                    CompressError::io(format!(
                        "decoder slot {} reports {} bytes at offset {} but holds {}",
                        slot.0,
                        info.size,
                        info.offset,
                        src.len()
                    ))
                })?;
                let dst = self.encoder.input_buffer(enc_slot)?;
                let dst = dst.get_mut(..frame.len()).ok_or_else(|| {
                    CompressError::io(format!(
                        "decoded frame of {} bytes does not fit encoder slot {}",
                        frame.len(),
                        enc_slot.0
                    ))
                })?;
                dst.copy_from_slice(frame);
                self.encoder.submit_input(
                    enc_slot,
                    info.size,
                    info.presentation_time_us,
                    info.flags,
                )?;
            }
            None if self.opts.handoff == HandoffPolicy::Retain || info.is_end_of_stream() => {
                self.state.held_frame = Some((slot, info));
                return Ok(StageOutcome::WouldBlock);
            }
            None => {
                self.stats.frames_dropped += 1;
                tracing::warn!(
                    pts_us = info.presentation_time_us,
                    "encoder input busy, dropping decoded frame"
                );
            }
        }

        self.decoder.release_output_slot(slot, false)?;
        self.state.frames_processed += 1;
        if self
            .state
            .frames_processed
            .is_multiple_of(self.opts.progress_interval)
        {
            tracing::debug!(
                frames = self.state.frames_processed,
                elapsed_sec = format!("{:.1}", self.started.elapsed().as_secs_f64()),
                "progress"
            );
        }

        if info.is_end_of_stream() {
            self.state.decoder_output_done = true;
            return Ok(StageOutcome::Done);
        }
        Ok(StageOutcome::Progressed)
    }

    /// Write every encoder output available right now to the sink.
    pub fn drain(&mut self) -> CompressResult<StageOutcome> {
        if self.state.encoder_output_done {
            return Ok(StageOutcome::Done);
        }

        let mut outcome = StageOutcome::WouldBlock;
        loop {
            match self.encoder.claim_output_slot(self.opts.timeout)? {
                OutputEvent::TryAgainLater => return Ok(outcome),
                OutputEvent::BuffersChanged => {}
                OutputEvent::FormatChanged(format) => {
                    if self.state.muxer_track.is_some() {
                        return Err(CompressError::FormatChangedTwice);
                    }
                    self.bind_sink(&format)?;
                    outcome = StageOutcome::Progressed;
                }
                OutputEvent::Available(slot, mut info) => {
                    if info.is_codec_config() {
                        info.size = 0;
                        self.stats.codec_config_buffers += 1;
                    } else if self.state.muxer_track.is_none() {
                        let format = self.encoder.output_format()?;
                        self.bind_sink(&format)?;
                    }

                    if info.size > 0 {
                        self.write(slot, &info)?;
                    }
                    self.encoder.release_output_slot(slot, false)?;

                    if info.is_end_of_stream() {
                        self.state.encoder_output_done = true;
                        return Ok(StageOutcome::Done);
                    }
                    outcome = StageOutcome::Progressed;
                }
            }
        }
    }

    fn bind_sink(&mut self, format: &MediaFormat) -> CompressResult<()> {
        let track = self.sink.add_track(format)?;
        self.sink.start()?;
        self.state.muxer_track = Some(track);
        tracing::debug!(track = track.0, mime = %format.mime, "muxer started");
        Ok(())
    }

    fn write(&mut self, slot: SlotIndex, info: &BufferInfo) -> CompressResult<()> {
        let track = self
            .state
            .muxer_track
            .ok_or_else(|| CompressError::muxer_state("sample ready before track was bound"))?;
        let data = self.encoder.output_buffer(slot)?;
        self.sink.write_sample(track, data, info)?;

        if let Some(last) = self.stats.last_pts_us
            && info.presentation_time_us < last
        {
            self.stats.out_of_order += 1;
            tracing::warn!(
                pts_us = info.presentation_time_us,
                last_pts_us = last,
                "encoder emitted a sample with a decreasing timestamp"
            );
        }
        self.stats.last_pts_us = Some(info.presentation_time_us);
        self.stats.samples_written += 1;
        self.stats.bytes_written += info.size as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::Path,
        sync::{Arc, Mutex},
    };

    use super::*;
    use crate::{
        foundation::format::MIME_AVC,
        loopback::{
            LoopbackCodec, LoopbackOptions, RecordingSink, Sample, SinkRecording, SyntheticMedia,
            SyntheticSource, SyntheticTrack, sample_payload,
        },
        media::{codec::CodecMode, sink::ContainerFormat},
    };

    struct Rig {
        source: SyntheticSource,
        decoder: LoopbackCodec,
        encoder: LoopbackCodec,
        sink: RecordingSink,
        recording: Arc<Mutex<SinkRecording>>,
    }

    impl Rig {
        fn new(media: SyntheticMedia, dec: LoopbackOptions, enc: LoopbackOptions) -> Self {
            let format = media.tracks[0].format.clone();
            let mut source = SyntheticSource::new(media);
            source.select_track(0).unwrap();

            let mut decoder = LoopbackCodec::new("dec", dec);
            decoder.configure(&format, CodecMode::Decode).unwrap();
            decoder.start().unwrap();
            let mut encoder = LoopbackCodec::new("enc", enc);
            encoder
                .configure(&MediaFormat::video(MIME_AVC, 16, 16), CodecMode::Encode)
                .unwrap();
            encoder.start().unwrap();

            let sink = RecordingSink::new(Path::new("out.mp4"), ContainerFormat::Mp4);
            let recording = sink.recording();
            Self {
                source,
                decoder,
                encoder,
                sink,
                recording,
            }
        }

        fn clip(frames: usize) -> Self {
            Self::new(
                SyntheticMedia::clip(frames, 16, 16, 1_000),
                LoopbackOptions::default(),
                LoopbackOptions::default(),
            )
        }

        fn pump(&mut self, opts: PumpOptions) -> Pump<'_> {
            Pump::new(
                &mut self.source,
                &mut self.decoder,
                &mut self.encoder,
                &mut self.sink,
                opts,
            )
        }

        fn run(&mut self, opts: PumpOptions) -> CompressResult<PumpStats> {
            self.pump(opts).run()
        }

        fn recording(&self) -> SinkRecording {
            self.recording.lock().unwrap().clone()
        }
    }

    fn stalled_encoder(stall: usize) -> LoopbackOptions {
        LoopbackOptions {
            input_stall: stall,
            ..LoopbackOptions::default()
        }
    }

    #[test]
    fn every_sample_reaches_the_sink_in_order() {
        let mut rig = Rig::clip(10);
        let stats = rig.run(PumpOptions::default()).unwrap();

        assert_eq!(stats.samples_fed, 10);
        assert_eq!(stats.samples_written, 10);
        // ten frames plus the end-of-stream slot
        assert_eq!(stats.frames_processed, 11);
        assert_eq!(stats.frames_dropped, 0);
        assert_eq!(stats.out_of_order, 0);
        assert_eq!(stats.last_pts_us, Some(9_000));

        let rec = rig.recording();
        assert_eq!(rec.tracks.len(), 1);
        assert_eq!(rec.starts, 1);
        assert_eq!(
            rec.timestamps(),
            (0..10).map(|i| i * 1_000).collect::<Vec<_>>()
        );
        for (i, sample) in rec.samples.iter().enumerate() {
            assert_eq!(sample.data, sample_payload(i));
        }
        assert!(rec.samples[0].flags.contains(BufferFlags::KEY_FRAME));
    }

    #[test]
    fn feed_forwards_sample_flags_to_the_decoder() {
        let mut rig = Rig::clip(2);
        {
            let mut pump = rig.pump(PumpOptions::default());
            assert_eq!(pump.feed().unwrap(), StageOutcome::Progressed);
            assert_eq!(pump.feed().unwrap(), StageOutcome::Progressed);
        }

        let timeout = Duration::ZERO;
        assert!(matches!(
            rig.decoder.claim_output_slot(timeout).unwrap(),
            OutputEvent::FormatChanged(_)
        ));
        let OutputEvent::Available(_, first) = rig.decoder.claim_output_slot(timeout).unwrap()
        else {
            panic!("expected first decoded frame");
        };
        assert_eq!(first.flags, BufferFlags::KEY_FRAME);
        let OutputEvent::Available(_, second) = rig.decoder.claim_output_slot(timeout).unwrap()
        else {
            panic!("expected second decoded frame");
        };
        assert!(second.flags.is_empty());
    }

    #[test]
    fn codec_config_is_never_written_as_a_sample() {
        let mut rig = Rig::clip(3);
        let stats = rig.run(PumpOptions::default()).unwrap();

        assert_eq!(stats.codec_config_buffers, 1);
        let rec = rig.recording();
        assert!(
            rec.samples
                .iter()
                .all(|s| !s.flags.contains(BufferFlags::CODEC_CONFIG))
        );
        assert!(rec.tracks[0].codec_config.is_some());
    }

    #[test]
    fn sink_binds_from_output_format_without_announcement() {
        let enc = LoopbackOptions {
            announce_format: false,
            ..LoopbackOptions::default()
        };
        let mut rig = Rig::new(
            SyntheticMedia::clip(4, 16, 16, 1_000),
            LoopbackOptions::default(),
            enc,
        );
        rig.run(PumpOptions::default()).unwrap();

        let rec = rig.recording();
        assert_eq!(rec.tracks.len(), 1);
        assert!(rec.tracks[0].codec_config.is_some());
        assert_eq!(rec.samples.len(), 4);
    }

    #[test]
    fn second_format_change_fails() {
        let enc = LoopbackOptions {
            extra_format_changes: 1,
            ..LoopbackOptions::default()
        };
        let mut rig = Rig::new(
            SyntheticMedia::clip(4, 16, 16, 1_000),
            LoopbackOptions::default(),
            enc,
        );
        assert!(matches!(
            rig.run(PumpOptions::default()),
            Err(CompressError::FormatChangedTwice)
        ));
        assert_eq!(rig.recording().tracks.len(), 1);
    }

    #[test]
    fn drop_policy_discards_frames_when_encoder_is_busy() {
        let mut rig = Rig::new(
            SyntheticMedia::clip(5, 16, 16, 1_000),
            LoopbackOptions::default(),
            stalled_encoder(2),
        );
        let opts = PumpOptions {
            handoff: HandoffPolicy::Drop,
            ..PumpOptions::default()
        };
        let stats = rig.run(opts).unwrap();

        assert_eq!(stats.frames_dropped, 2);
        assert_eq!(stats.samples_written, 3);
        assert_eq!(stats.frames_processed, 6);
        assert_eq!(rig.recording().timestamps(), vec![2_000, 3_000, 4_000]);
    }

    #[test]
    fn retain_policy_keeps_every_frame() {
        let mut rig = Rig::new(
            SyntheticMedia::clip(5, 16, 16, 1_000),
            LoopbackOptions::default(),
            stalled_encoder(2),
        );
        let stats = rig.run(PumpOptions::default()).unwrap();

        assert_eq!(stats.frames_dropped, 0);
        assert_eq!(stats.samples_written, 5);
        assert_eq!(
            rig.recording().timestamps(),
            vec![0, 1_000, 2_000, 3_000, 4_000]
        );
    }

    #[test]
    fn end_of_stream_is_never_dropped() {
        let mut rig = Rig::new(
            SyntheticMedia::clip(0, 16, 16, 1_000),
            LoopbackOptions::default(),
            stalled_encoder(1),
        );
        let opts = PumpOptions {
            handoff: HandoffPolicy::Drop,
            ..PumpOptions::default()
        };
        let stats = rig.run(opts).unwrap();

        assert_eq!(stats.frames_dropped, 0);
        assert_eq!(stats.samples_written, 0);
        assert_eq!(stats.frames_processed, 1);
    }

    #[test]
    fn wedged_encoder_trips_the_stall_guard() {
        let mut rig = Rig::new(
            SyntheticMedia::clip(3, 16, 16, 1_000),
            LoopbackOptions::default(),
            stalled_encoder(usize::MAX),
        );
        let opts = PumpOptions {
            stall_limit: Some(5),
            ..PumpOptions::default()
        };
        assert!(matches!(
            rig.run(opts),
            Err(CompressError::Stalled { iterations: 5 })
        ));
        assert!(rig.recording().samples.is_empty());
    }

    #[test]
    fn feed_waits_for_a_decoder_slot() {
        let dec = LoopbackOptions {
            input_stall: 1,
            ..LoopbackOptions::default()
        };
        let mut rig = Rig::new(
            SyntheticMedia::clip(1, 16, 16, 1_000),
            dec,
            LoopbackOptions::default(),
        );
        let mut pump = rig.pump(PumpOptions::default());

        assert_eq!(pump.feed().unwrap(), StageOutcome::WouldBlock);
        assert_eq!(pump.feed().unwrap(), StageOutcome::Progressed);
        assert_eq!(pump.feed().unwrap(), StageOutcome::Done);
        assert!(pump.state().decoder_input_done);
        assert_eq!(pump.feed().unwrap(), StageOutcome::Done);
        assert!(!pump.is_finished());
    }

    #[test]
    fn decreasing_timestamps_are_counted_not_reordered() {
        let samples = [0, 2_000, 1_000]
            .into_iter()
            .enumerate()
            .map(|(i, pts_us)| Sample {
                data: sample_payload(i),
                pts_us,
                flags: BufferFlags::empty(),
            })
            .collect();
        let media = SyntheticMedia {
            tracks: vec![SyntheticTrack::new(
                MediaFormat::video(MIME_AVC, 16, 16),
                samples,
            )],
        };
        let mut rig = Rig::new(media, LoopbackOptions::default(), LoopbackOptions::default());
        let stats = rig.run(PumpOptions::default()).unwrap();

        assert_eq!(stats.out_of_order, 1);
        assert_eq!(rig.recording().timestamps(), vec![0, 2_000, 1_000]);
    }

    #[test]
    fn sink_write_failure_propagates() {
        let mut rig = Rig::clip(5);
        rig.sink = RecordingSink::new(Path::new("out.mp4"), ContainerFormat::Mp4)
            .fail_write_at(Some(2));
        rig.recording = rig.sink.recording();

        assert!(matches!(
            rig.run(PumpOptions::default()),
            Err(CompressError::Io(_))
        ));
        assert_eq!(rig.recording().samples.len(), 2);
    }
}
