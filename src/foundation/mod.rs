pub mod buffer;
pub mod error;
pub mod format;
