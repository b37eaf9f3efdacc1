use std::path::Path;

use crate::{
    foundation::error::CompressResult,
    media::{codec::CodecPort, sink::ContainerFormat, sink::MuxSink, source::DemuxSource},
};

/// Factory for the four external collaborators of a transcode job.
///
/// Ports are created per job and used from the single pump thread, so only the backend
/// itself must be shareable.
pub trait MediaBackend: Send + Sync {
    fn open_source(&self, path: &Path) -> CompressResult<Box<dyn DemuxSource>>;

    fn create_decoder(&self, mime: &str) -> CompressResult<Box<dyn CodecPort>>;

    fn create_encoder(&self, mime: &str) -> CompressResult<Box<dyn CodecPort>>;

    fn create_sink(
        &self,
        path: &Path,
        container: ContainerFormat,
    ) -> CompressResult<Box<dyn MuxSink>>;
}
