pub type CompressResult<T> = Result<T, CompressError>;

#[derive(thiserror::Error, Debug)]
pub enum CompressError {
    #[error("a compression job is already in progress on this compressor")]
    AlreadyInProgress,

    #[error("source has no video track")]
    NoVideoTrack,

    #[error("encoder output format changed after the muxer track was bound")]
    FormatChangedTwice,

    #[error("codec state error: {0}")]
    CodecState(String),

    #[error("muxer state error: {0}")]
    MuxerState(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("pipeline stalled after {iterations} iterations without progress")]
    Stalled { iterations: u64 },

    #[error("serialization error: {0}")]
    Serde(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CompressError {
    pub fn codec_state(msg: impl Into<String>) -> Self {
        Self::CodecState(msg.into())
    }

    pub fn muxer_state(msg: impl Into<String>) -> Self {
        Self::MuxerState(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(std::io::Error::other(msg.into()))
    }
}
