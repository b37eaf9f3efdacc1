use bitflags::bitflags;

bitflags! {
    /// Flag bits carried by codec input submissions and output slots.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        /// The buffer starts a key frame.
        const KEY_FRAME = 0x0001;
        /// The buffer holds codec-specific configuration rather than media data.
        const CODEC_CONFIG = 0x0002;
        /// No further buffers follow on this stream.
        const END_OF_STREAM = 0x0004;
    }
}

impl serde::Serialize for BufferFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

/// Opaque index of an input or output slot on a codec port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(pub usize);

/// Index of a track inside a mux sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub struct TrackIndex(pub usize);

/// Metadata attached to a filled output slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct BufferInfo {
    pub offset: usize,
    pub size: usize,
    pub presentation_time_us: i64,
    pub flags: BufferFlags,
}

impl BufferInfo {
    pub fn is_end_of_stream(&self) -> bool {
        self.flags.contains(BufferFlags::END_OF_STREAM)
    }

    pub fn is_codec_config(&self) -> bool {
        self.flags.contains(BufferFlags::CODEC_CONFIG)
    }

    /// Borrow the payload described by `offset`/`size` out of a slot buffer.
    pub fn payload<'a>(&self, buffer: &'a [u8]) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(self.size)?;
        buffer.get(self.offset..end)
    }
}
