//! Subunit v2 protocol implementation
//!
//! Packet encoding and decoding, and the demultiplexer that separates
//! packets from other bytes in a mixed stream.

pub mod codec;
pub mod crc32;
pub mod decoder;
pub mod types;

pub use decoder::{ByteSink, ByteStreamDecoder};
pub use types::*;
