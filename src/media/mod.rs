pub mod backend;
pub mod codec;
pub mod sink;
pub mod source;
