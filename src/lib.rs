//! vidcompress re-encodes the video track of a media file to H.264 in an MP4 container.
//!
//! The pipeline never touches platform codecs directly. It drives four ports supplied by a
//! [`MediaBackend`]: a demux source, a decoder, an encoder and a mux sink.
//!
//! # Pipeline overview
//!
//! 1. **Select**: pick the first video track of the source ([`select_video_track`])
//! 2. **Plan**: derive [`OutputParams`] from the track and the encoder's capabilities
//! 3. **Pump**: move samples source → decoder → encoder → sink ([`Pump`])
//! 4. **Teardown**: stop and release every created resource in a fixed order
//!
//! [`Compressor`] runs these steps as a job and allows one job at a time.
//!
//! The [`loopback`] backend implements every port in memory and is what the `simulate`
//! command of the CLI runs on. Real files can be inspected with [`probe`] when the
//! `media-ffmpeg` feature is enabled.
#![forbid(unsafe_code)]

pub mod config;
mod foundation;
pub mod job;
pub mod loopback;
pub mod media;
pub mod pipeline;
pub mod plan;
pub mod probe;

pub use config::{CompressConfig, EncoderSettings, HandoffPolicy};
pub use foundation::buffer::{BufferFlags, BufferInfo, SlotIndex, TrackIndex};
pub use foundation::error::{CompressError, CompressResult};
pub use foundation::format::{
    AvcProfile, BitrateMode, ColorFormat, ColorRange, ColorStandard, ColorTransfer, MIME_AVC,
    MIME_RAW_VIDEO, MIME_VIDEO_PREFIX, MediaFormat, Rotation,
};
pub use job::{CompressReport, Compressor, JobHandle, JobStatus, TranscodeJob};
pub use media::backend::MediaBackend;
pub use media::codec::{CodecMode, CodecPort, OutputEvent, PortLifecycle, PortState};
pub use media::sink::{ContainerFormat, MuxSink, SinkLifecycle, SinkState};
pub use media::source::{DemuxSource, SelectedTrack, select_video_track};
pub use pipeline::{PipelineState, Pump, PumpOptions, PumpStats, StageOutcome};
pub use plan::params::{
    COLOR_FORMAT_PREFERENCE, FALLBACK_COLOR_FORMAT, OutputParams, encoder_format,
    plan_output_params, select_color_format,
};
pub use probe::{ProbedSource, parse_probe_json, probe_tracks};
