//! In-memory media backend.
//!
//! Drives the full pipeline without platform codecs: the source replays synthetic samples,
//! codecs pass payloads through, and the sink records what it receives. The `simulate` CLI
//! command and the integration tests run on it.

mod backend;
mod codec;
mod journal;
mod sink;
mod source;

pub use backend::LoopbackBackend;
pub use codec::{LOOPBACK_CODEC_CONFIG, LoopbackCodec, LoopbackOptions};
pub use journal::{Call, Journal, Resource};
pub use sink::{RecordingSink, SinkRecording, WrittenSample};
pub use source::{Sample, SyntheticMedia, SyntheticSource, SyntheticTrack, sample_payload};
