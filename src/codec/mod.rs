//! Byte-level codecs: the MRU-delta integer code, its zig-zag delta
//! companion, the byte stream buffer/source, and the basic varint.

mod bytestream;
mod delta;
mod mru;

pub use bytestream::{ByteStreamBuffer, ByteStreamSource, BLOCK_SIZE};
pub use delta::{DeltaReader, DeltaWriter};
pub use mru::MruCodec;
