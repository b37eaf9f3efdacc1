use std::time::Duration;

use crate::foundation::{
    buffer::{BufferFlags, BufferInfo, SlotIndex},
    error::{CompressError, CompressResult},
    format::{ColorFormat, MediaFormat},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecMode {
    Decode,
    Encode,
}

/// Result of polling a codec port's output side.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputEvent {
    Available(SlotIndex, BufferInfo),
    TryAgainLater,
    FormatChanged(MediaFormat),
    /// Legacy notice that output buffers were reallocated. Safe to ignore.
    BuffersChanged,
}

/// Buffer-exchange protocol shared by decoders and encoders.
///
/// Slot operations are only valid while the port is running; calling them in any other state
/// is a [`CompressError::CodecState`]. A poll that times out is not an error: the claim methods
/// return `None` / [`OutputEvent::TryAgainLater`] instead.
pub trait CodecPort {
    fn name(&self) -> &str;

    /// Pixel formats the port accepts for `mime`. May fail on ports that cannot report them.
    fn color_formats(&self, mime: &str) -> CompressResult<Vec<ColorFormat>>;

    /// A port that rejects `format` stays unconfigured and may be configured again.
    fn configure(&mut self, format: &MediaFormat, mode: CodecMode) -> CompressResult<()>;

    fn start(&mut self) -> CompressResult<()>;

    fn claim_input_slot(&mut self, timeout: Duration) -> CompressResult<Option<SlotIndex>>;

    fn input_buffer(&mut self, slot: SlotIndex) -> CompressResult<&mut [u8]>;

    /// Hand a filled input slot to the codec. The slot is no longer owned by the caller.
    fn submit_input(
        &mut self,
        slot: SlotIndex,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> CompressResult<()>;

    fn claim_output_slot(&mut self, timeout: Duration) -> CompressResult<OutputEvent>;

    fn output_buffer(&self, slot: SlotIndex) -> CompressResult<&[u8]>;

    fn release_output_slot(&mut self, slot: SlotIndex, render: bool) -> CompressResult<()>;

    /// The format the port currently produces, including codec-specific config once known.
    fn output_format(&self) -> CompressResult<MediaFormat>;

    fn stop(&mut self) -> CompressResult<()>;

    fn release(&mut self) -> CompressResult<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortState {
    Unconfigured,
    Configured,
    Running,
    Stopped,
    Released,
}

/// State machine backing a [`CodecPort`] implementation.
#[derive(Clone, Debug)]
pub struct PortLifecycle {
    name: String,
    state: PortState,
}

impl PortLifecycle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: PortState::Unconfigured,
        }
    }

    pub fn state(&self) -> PortState {
        self.state
    }

    pub fn configure(&mut self) -> CompressResult<()> {
        self.transition("configure", &[PortState::Unconfigured], PortState::Configured)
    }

    pub fn start(&mut self) -> CompressResult<()> {
        self.transition("start", &[PortState::Configured], PortState::Running)
    }

    /// Stop is legal once from any live state, so teardown can run after a failed setup.
    pub fn stop(&mut self) -> CompressResult<()> {
        self.transition(
            "stop",
            &[
                PortState::Unconfigured,
                PortState::Configured,
                PortState::Running,
            ],
            PortState::Stopped,
        )
    }

    pub fn release(&mut self) -> CompressResult<()> {
        self.transition(
            "release",
            &[
                PortState::Unconfigured,
                PortState::Configured,
                PortState::Running,
                PortState::Stopped,
            ],
            PortState::Released,
        )
    }

    pub fn ensure_running(&self, op: &str) -> CompressResult<()> {
        if self.state == PortState::Running {
            return Ok(());
        }
        Err(CompressError::codec_state(format!(
            "{}: {op} called in state {:?}",
            self.name, self.state
        )))
    }

    fn transition(&mut self, op: &str, from: &[PortState], to: PortState) -> CompressResult<()> {
        if !from.contains(&self.state) {
            return Err(CompressError::codec_state(format!(
                "{}: {op} called in state {:?}",
                self.name, self.state
            )));
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut port = PortLifecycle::new("dec");
        assert_eq!(port.state(), PortState::Unconfigured);
        port.configure().unwrap();
        port.start().unwrap();
        port.ensure_running("claim").unwrap();
        port.stop().unwrap();
        port.release().unwrap();
        assert_eq!(port.state(), PortState::Released);
    }

    #[test]
    fn slot_ops_outside_running_are_codec_state_errors() {
        let mut port = PortLifecycle::new("enc");
        let err = port.ensure_running("claim_input_slot").unwrap_err();
        assert!(matches!(err, CompressError::CodecState(_)));
        assert!(err.to_string().contains("enc"));

        port.configure().unwrap();
        assert!(port.ensure_running("claim_input_slot").is_err());
    }

    #[test]
    fn start_requires_configure() {
        let mut port = PortLifecycle::new("enc");
        assert!(port.start().is_err());
        port.configure().unwrap();
        assert!(port.configure().is_err());
    }

    #[test]
    fn stop_and_release_are_single_shot() {
        let mut port = PortLifecycle::new("dec");
        port.stop().unwrap();
        assert!(port.stop().is_err());
        port.release().unwrap();
        assert!(port.release().is_err());
        assert!(port.stop().is_err());
    }
}
