//! The degenerate companion to the MRU-delta codec (spec §4.4): a
//! zig-zag signed varint against a single running predecessor, used for
//! the grammar-reference stream.

use super::bytestream::{ByteStreamBuffer, ByteStreamSource};
use crate::error::Result;

fn zigzag_encode(diff: i64) -> u64 {
    ((diff << 1) ^ (diff >> 63)) as u64
}

fn zigzag_decode(z: u64) -> i64 {
    ((z >> 1) as i64) ^ -((z & 1) as i64)
}

#[derive(Debug, Default)]
pub struct DeltaWriter {
    last: u32,
}

impl DeltaWriter {
    pub fn new() -> Self {
        DeltaWriter { last: 0 }
    }

    pub fn write(&mut self, buf: &mut ByteStreamBuffer, v: u32) {
        let diff = v as i64 - self.last as i64;
        buf.write_varint(zigzag_encode(diff));
        self.last = v;
    }
}

#[derive(Debug, Default)]
pub struct DeltaReader {
    last: u32,
}

impl DeltaReader {
    pub fn new() -> Self {
        DeltaReader { last: 0 }
    }

    pub fn read(&mut self, src: &mut ByteStreamSource) -> Result<u32> {
        let z = src.read_varint()?;
        let diff = zigzag_decode(z);
        let v = (self.last as i64 + diff) as u32;
        self.last = v;
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_first_value_is_delta_against_zero() {
        let values = [5u32, 5, 3, 1000, 999, 0, 42];
        let mut writer = DeltaWriter::new();
        let mut buf = ByteStreamBuffer::new();
        for &v in &values {
            writer.write(&mut buf, v);
        }
        let bytes = buf.to_vec();

        let mut reader = DeltaReader::new();
        let mut src = ByteStreamSource::new(&bytes);
        let mut out = Vec::new();
        for _ in &values {
            out.push(reader.read(&mut src).unwrap());
        }
        assert_eq!(out, values);
        assert!(src.is_exhausted());
    }

    #[test]
    fn repeated_value_encodes_as_a_single_zero_byte() {
        let mut writer = DeltaWriter::new();
        let mut buf = ByteStreamBuffer::new();
        writer.write(&mut buf, 500);
        let first_len = buf.len();
        writer.write(&mut buf, 500);
        assert_eq!(buf.len() - first_len, 1);
        assert_eq!(buf.to_vec()[first_len], 0x00);
    }
}
