//! Payload codecs applied to stream data crossing the wire.
//!
//! Inbound: base64 decode, then block decompress when the shell is compressed.
//! Outbound: block compress when compressed, then base64 encode.

pub mod compression;
pub mod encoding;

pub use compression::{BlockCodec, BlockCompressor, ChunkHeader, ChunkReader, DeflateCompressor};
