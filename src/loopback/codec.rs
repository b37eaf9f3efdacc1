use std::{collections::VecDeque, time::Duration};

use crate::{
    foundation::{
        buffer::{BufferFlags, BufferInfo, SlotIndex},
        error::{CompressError, CompressResult},
        format::{ColorFormat, MIME_RAW_VIDEO, MediaFormat},
    },
    loopback::journal::{Call, Journal, Resource},
    media::codec::{CodecMode, CodecPort, OutputEvent, PortLifecycle},
};

/// SPS/PPS-shaped bytes reported as codec-specific config by loopback encoders.
pub const LOOPBACK_CODEC_CONFIG: [u8; 12] = [
    0x00, 0x00, 0x00, 0x01, 0x67, 0x64, 0x00, 0x33, 0x00, 0x00, 0x00, 0x01,
];

#[derive(Clone, Debug)]
pub struct LoopbackOptions {
    pub input_slots: usize,
    pub output_slots: usize,
    pub slot_capacity: usize,
    /// Capability list reported by `color_formats`. `None` makes the query fail.
    pub color_formats: Option<Vec<ColorFormat>>,
    /// Number of input claims that report no free slot before slots are handed out.
    pub input_stall: usize,
    /// Emit a `FormatChanged` event ahead of the first output buffer.
    pub announce_format: bool,
    /// Further `FormatChanged` events emitted after the first media output.
    pub extra_format_changes: usize,
    /// Fail `configure` for formats carrying vendor quality hints.
    pub reject_quality_hints: bool,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            input_slots: 4,
            output_slots: 4,
            slot_capacity: 64 * 1024,
            color_formats: Some(vec![
                ColorFormat::YUV420_SEMI_PLANAR,
                ColorFormat::YUV420_FLEXIBLE,
            ]),
            input_stall: 0,
            announce_format: true,
            extra_format_changes: 0,
            reject_quality_hints: false,
        }
    }
}

#[derive(Debug)]
enum Pending {
    Format(MediaFormat),
    Frame {
        data: Vec<u8>,
        pts_us: i64,
        flags: BufferFlags,
    },
}

/// Software codec port that copies payloads through unchanged.
///
/// Processing is synchronous: a submitted input is turned into pending output immediately and
/// its slot is free again. Output slots are a bounded pool, so a consumer that never releases
/// them sees `TryAgainLater`.
#[derive(Debug)]
pub struct LoopbackCodec {
    name: String,
    opts: LoopbackOptions,
    lifecycle: PortLifecycle,
    mode: Option<CodecMode>,
    format: Option<MediaFormat>,
    inputs: Vec<Vec<u8>>,
    free_inputs: VecDeque<usize>,
    inputs_claimed: Vec<bool>,
    outputs: Vec<Vec<u8>>,
    free_outputs: VecDeque<usize>,
    outputs_claimed: Vec<bool>,
    pending: VecDeque<Pending>,
    frames_in: u64,
    stall_remaining: usize,
    extra_changes_remaining: usize,
    journal: Journal,
    resource: Resource,
}

impl LoopbackCodec {
    pub fn new(name: impl Into<String>, opts: LoopbackOptions) -> Self {
        let name = name.into();
        Self {
            lifecycle: PortLifecycle::new(name.clone()),
            name,
            inputs: vec![vec![0u8; opts.slot_capacity]; opts.input_slots],
            free_inputs: (0..opts.input_slots).collect(),
            inputs_claimed: vec![false; opts.input_slots],
            outputs: vec![Vec::with_capacity(opts.slot_capacity); opts.output_slots],
            free_outputs: (0..opts.output_slots).collect(),
            outputs_claimed: vec![false; opts.output_slots],
            pending: VecDeque::new(),
            frames_in: 0,
            stall_remaining: opts.input_stall,
            extra_changes_remaining: opts.extra_format_changes,
            mode: None,
            format: None,
            journal: Journal::default(),
            resource: Resource::Decoder,
            opts,
        }
    }

    pub fn with_journal(mut self, journal: Journal, resource: Resource) -> Self {
        self.journal = journal;
        self.resource = resource;
        self
    }

    pub fn lifecycle(&self) -> &PortLifecycle {
        &self.lifecycle
    }

    fn configured_format(&self) -> CompressResult<&MediaFormat> {
        self.format
            .as_ref()
            .ok_or_else(|| CompressError::codec_state(format!("{}: not configured", self.name)))
    }

    fn check_input_slot(&self, slot: SlotIndex) -> CompressResult<()> {
        if self.inputs_claimed.get(slot.0).copied().unwrap_or(false) {
            return Ok(());
        }
        Err(CompressError::codec_state(format!(
            "{}: input slot {} is not claimed",
            self.name, slot.0
        )))
    }

    fn check_output_slot(&self, slot: SlotIndex) -> CompressResult<()> {
        if self.outputs_claimed.get(slot.0).copied().unwrap_or(false) {
            return Ok(());
        }
        Err(CompressError::codec_state(format!(
            "{}: output slot {} is not claimed",
            self.name, slot.0
        )))
    }

    fn queue_outputs(
        &mut self,
        payload: Vec<u8>,
        pts_us: i64,
        flags: BufferFlags,
    ) -> CompressResult<()> {
        let mode = self
            .mode
            .ok_or_else(|| CompressError::codec_state(format!("{}: not configured", self.name)))?;
        let eos = flags & BufferFlags::END_OF_STREAM;

        if self.frames_in == 0 {
            if self.opts.announce_format {
                let format = self.output_format()?;
                self.pending.push_back(Pending::Format(format));
            }
            if mode == CodecMode::Encode {
                self.pending.push_back(Pending::Frame {
                    data: LOOPBACK_CODEC_CONFIG.to_vec(),
                    pts_us: 0,
                    flags: BufferFlags::CODEC_CONFIG,
                });
            }
        }

        if payload.is_empty() {
            if !eos.is_empty() {
                self.pending.push_back(Pending::Frame {
                    data: payload,
                    pts_us,
                    flags: eos,
                });
            }
            return Ok(());
        }

        let mut out_flags = eos;
        match mode {
            CodecMode::Decode => out_flags |= flags & BufferFlags::KEY_FRAME,
            CodecMode::Encode if self.frames_in == 0 => out_flags |= BufferFlags::KEY_FRAME,
            CodecMode::Encode => {}
        }
        self.pending.push_back(Pending::Frame {
            data: payload,
            pts_us,
            flags: out_flags,
        });
        self.frames_in += 1;

        while self.extra_changes_remaining > 0 {
            self.extra_changes_remaining -= 1;
            let format = self.output_format()?;
            self.pending.push_back(Pending::Format(format));
        }
        Ok(())
    }
}

impl CodecPort for LoopbackCodec {
    fn name(&self) -> &str {
        &self.name
    }

    fn color_formats(&self, mime: &str) -> CompressResult<Vec<ColorFormat>> {
        self.opts.color_formats.clone().ok_or_else(|| {
            CompressError::codec_state(format!(
                "{}: capabilities for '{mime}' are unavailable",
                self.name
            ))
        })
    }

    fn configure(&mut self, format: &MediaFormat, mode: CodecMode) -> CompressResult<()> {
        self.journal.record(self.resource, Call::Configure);
        if self.opts.reject_quality_hints && format.has_quality_hints() {
            return Err(CompressError::codec_state(format!(
                "{}: unsupported quality hints",
                self.name
            )));
        }
        self.lifecycle.configure()?;
        self.format = Some(format.clone());
        self.mode = Some(mode);
        Ok(())
    }

    fn start(&mut self) -> CompressResult<()> {
        self.journal.record(self.resource, Call::Start);
        self.lifecycle.start()
    }

    fn claim_input_slot(&mut self, _timeout: Duration) -> CompressResult<Option<SlotIndex>> {
        self.lifecycle.ensure_running("claim_input_slot")?;
        if self.stall_remaining > 0 {
            self.stall_remaining -= 1;
            return Ok(None);
        }
        let Some(index) = self.free_inputs.pop_front() else {
            return Ok(None);
        };
        self.inputs_claimed[index] = true;
        Ok(Some(SlotIndex(index)))
    }

    fn input_buffer(&mut self, slot: SlotIndex) -> CompressResult<&mut [u8]> {
        self.lifecycle.ensure_running("input_buffer")?;
        self.check_input_slot(slot)?;
        Ok(self.inputs[slot.0].as_mut_slice())
    }

    fn submit_input(
        &mut self,
        slot: SlotIndex,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> CompressResult<()> {
        self.lifecycle.ensure_running("submit_input")?;
        self.check_input_slot(slot)?;
        if size > self.opts.slot_capacity {
            return Err(CompressError::io(format!(
                "{}: submitted {size} bytes into a {} byte slot",
                self.name, self.opts.slot_capacity
            )));
        }

        let payload = self.inputs[slot.0][..size].to_vec();
        self.inputs_claimed[slot.0] = false;
        self.free_inputs.push_back(slot.0);
        self.queue_outputs(payload, presentation_time_us, flags)
    }

    fn claim_output_slot(&mut self, _timeout: Duration) -> CompressResult<OutputEvent> {
        self.lifecycle.ensure_running("claim_output_slot")?;
        match self.pending.front() {
            None => return Ok(OutputEvent::TryAgainLater),
            Some(Pending::Format(_)) => {
                if let Some(Pending::Format(format)) = self.pending.pop_front() {
                    return Ok(OutputEvent::FormatChanged(format));
                }
            }
            Some(Pending::Frame { .. }) => {}
        }

        let Some(index) = self.free_outputs.pop_front() else {
            return Ok(OutputEvent::TryAgainLater);
        };
        let Some(Pending::Frame {
            data,
            pts_us,
            flags,
        }) = self.pending.pop_front()
        else {
            self.free_outputs.push_front(index);
            return Ok(OutputEvent::TryAgainLater);
        };

        let info = BufferInfo {
            offset: 0,
            size: data.len(),
            presentation_time_us: pts_us,
            flags,
        };
        self.outputs[index] = data;
        self.outputs_claimed[index] = true;
        Ok(OutputEvent::Available(SlotIndex(index), info))
    }

    fn output_buffer(&self, slot: SlotIndex) -> CompressResult<&[u8]> {
        self.lifecycle.ensure_running("output_buffer")?;
        self.check_output_slot(slot)?;
        Ok(self.outputs[slot.0].as_slice())
    }

    fn release_output_slot(&mut self, slot: SlotIndex, _render: bool) -> CompressResult<()> {
        self.lifecycle.ensure_running("release_output_slot")?;
        self.check_output_slot(slot)?;
        self.outputs_claimed[slot.0] = false;
        self.outputs[slot.0].clear();
        self.free_outputs.push_back(slot.0);
        Ok(())
    }

    fn output_format(&self) -> CompressResult<MediaFormat> {
        let configured = self.configured_format()?;
        match self.mode {
            Some(CodecMode::Encode) => {
                let mut format = configured.clone();
                format.codec_config = Some(LOOPBACK_CODEC_CONFIG.to_vec());
                Ok(format)
            }
            _ => {
                let mut format = MediaFormat::new(MIME_RAW_VIDEO);
                format.width = configured.width;
                format.height = configured.height;
                format.color_format = Some(ColorFormat::YUV420_SEMI_PLANAR);
                format.color_range = configured.color_range;
                format.color_standard = configured.color_standard;
                format.color_transfer = configured.color_transfer;
                Ok(format)
            }
        }
    }

    fn stop(&mut self) -> CompressResult<()> {
        self.journal.record(self.resource, Call::Stop);
        self.lifecycle.stop()?;
        self.pending.clear();
        Ok(())
    }

    fn release(&mut self) -> CompressResult<()> {
        self.journal.record(self.resource, Call::Release);
        self.lifecycle.release()?;
        self.free_inputs = (0..self.opts.input_slots).collect();
        self.inputs_claimed.fill(false);
        self.free_outputs = (0..self.opts.output_slots).collect();
        self.outputs_claimed.fill(false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::format::MIME_AVC;

    const T: Duration = Duration::from_millis(1);

    fn running(mode: CodecMode, opts: LoopbackOptions) -> LoopbackCodec {
        let mut codec = LoopbackCodec::new("test", opts);
        codec
            .configure(&MediaFormat::video(MIME_AVC, 32, 32), mode)
            .unwrap();
        codec.start().unwrap();
        codec
    }

    fn submit(codec: &mut LoopbackCodec, bytes: &[u8], pts: i64, flags: BufferFlags) {
        let slot = codec.claim_input_slot(T).unwrap().unwrap();
        codec.input_buffer(slot).unwrap()[..bytes.len()].copy_from_slice(bytes);
        codec.submit_input(slot, bytes.len(), pts, flags).unwrap();
    }

    #[test]
    fn slot_ops_require_running_state() {
        let mut codec = LoopbackCodec::new("dec", LoopbackOptions::default());
        assert!(matches!(
            codec.claim_input_slot(T),
            Err(CompressError::CodecState(_))
        ));
        codec
            .configure(&MediaFormat::video(MIME_AVC, 32, 32), CodecMode::Decode)
            .unwrap();
        assert!(codec.claim_output_slot(T).is_err());
        codec.start().unwrap();
        assert!(codec.claim_input_slot(T).unwrap().is_some());
        codec.stop().unwrap();
        assert!(codec.claim_input_slot(T).is_err());
    }

    #[test]
    fn decoder_announces_raw_format_then_frames() {
        let mut dec = running(CodecMode::Decode, LoopbackOptions::default());
        submit(&mut dec, &[1, 2, 3], 40, BufferFlags::KEY_FRAME);
        submit(&mut dec, &[], 0, BufferFlags::END_OF_STREAM);

        let OutputEvent::FormatChanged(format) = dec.claim_output_slot(T).unwrap() else {
            panic!("expected format change");
        };
        assert_eq!(format.mime, MIME_RAW_VIDEO);
        assert_eq!(format.width, Some(32));

        let OutputEvent::Available(slot, info) = dec.claim_output_slot(T).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(info.size, 3);
        assert_eq!(info.presentation_time_us, 40);
        assert_eq!(info.flags, BufferFlags::KEY_FRAME);
        assert_eq!(dec.output_buffer(slot).unwrap(), &[1, 2, 3]);
        dec.release_output_slot(slot, false).unwrap();

        let OutputEvent::Available(slot, info) = dec.claim_output_slot(T).unwrap() else {
            panic!("expected end of stream");
        };
        assert!(info.is_end_of_stream());
        assert_eq!(info.size, 0);
        dec.release_output_slot(slot, false).unwrap();
        assert_eq!(dec.claim_output_slot(T).unwrap(), OutputEvent::TryAgainLater);
    }

    #[test]
    fn encoder_emits_codec_config_before_media() {
        let mut enc = running(CodecMode::Encode, LoopbackOptions::default());
        submit(&mut enc, &[9; 5], 0, BufferFlags::empty());
        submit(&mut enc, &[8; 5], 1, BufferFlags::empty());

        let OutputEvent::FormatChanged(format) = enc.claim_output_slot(T).unwrap() else {
            panic!("expected format change");
        };
        assert_eq!(format.codec_config.as_deref(), Some(&LOOPBACK_CODEC_CONFIG[..]));

        let OutputEvent::Available(slot, info) = enc.claim_output_slot(T).unwrap() else {
            panic!("expected codec config");
        };
        assert!(info.is_codec_config());
        enc.release_output_slot(slot, false).unwrap();

        let OutputEvent::Available(slot, info) = enc.claim_output_slot(T).unwrap() else {
            panic!("expected first sample");
        };
        assert!(info.flags.contains(BufferFlags::KEY_FRAME));
        enc.release_output_slot(slot, false).unwrap();

        let OutputEvent::Available(_, info) = enc.claim_output_slot(T).unwrap() else {
            panic!("expected second sample");
        };
        assert!(!info.flags.contains(BufferFlags::KEY_FRAME));
    }

    #[test]
    fn output_pool_exhaustion_is_try_again() {
        let opts = LoopbackOptions {
            output_slots: 1,
            announce_format: false,
            ..LoopbackOptions::default()
        };
        let mut dec = running(CodecMode::Decode, opts);
        submit(&mut dec, &[1], 0, BufferFlags::empty());
        submit(&mut dec, &[2], 1, BufferFlags::empty());

        let OutputEvent::Available(slot, _) = dec.claim_output_slot(T).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(dec.claim_output_slot(T).unwrap(), OutputEvent::TryAgainLater);
        dec.release_output_slot(slot, false).unwrap();
        assert!(matches!(
            dec.claim_output_slot(T).unwrap(),
            OutputEvent::Available(..)
        ));
    }

    #[test]
    fn input_stall_reports_no_slot() {
        let opts = LoopbackOptions {
            input_stall: 2,
            ..LoopbackOptions::default()
        };
        let mut enc = running(CodecMode::Encode, opts);
        assert_eq!(enc.claim_input_slot(T).unwrap(), None);
        assert_eq!(enc.claim_input_slot(T).unwrap(), None);
        assert!(enc.claim_input_slot(T).unwrap().is_some());
    }

    #[test]
    fn unclaimed_slots_are_rejected() {
        let mut enc = running(CodecMode::Encode, LoopbackOptions::default());
        assert!(enc.input_buffer(SlotIndex(0)).is_err());
        assert!(
            enc.submit_input(SlotIndex(1), 0, 0, BufferFlags::empty())
                .is_err()
        );
        assert!(enc.release_output_slot(SlotIndex(0), false).is_err());
    }

    #[test]
    fn missing_capabilities_fail_the_query() {
        let codec = LoopbackCodec::new(
            "enc",
            LoopbackOptions {
                color_formats: None,
                ..LoopbackOptions::default()
            },
        );
        assert!(codec.color_formats(MIME_AVC).is_err());
    }
}
