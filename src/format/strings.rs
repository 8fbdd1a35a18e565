//! Section 2 of the binary format: the deduplicated string table, plus
//! the MRU-delta-coded stream of indices into it that the string-valued
//! leaves in the AST stream reference (spec §6).
//!
//! Layout: a varint count, then that many varint string lengths, then
//! the concatenated UTF-8 bytes of every string back to back (lengths
//! grouped up front rather than interleaved, so a reader can size one
//! allocation instead of growing it string by string), then a
//! varint-length-prefixed block holding the index stream.

use std::collections::VecDeque;

use crate::codec::{ByteStreamBuffer, ByteStreamSource, MruCodec};
use crate::error::{Error, Result};

/// Builds section 2 from the walker's frequency-ordered string table and
/// `references`, one entry per string-valued leaf in the AST stream, in
/// the exact order [`super::ast::encode_ast`] encountered them.
pub fn encode_string_table(
    strings: &[String],
    references: &[usize],
    mru_cell_bits: u32,
) -> Result<Vec<u8>> {
    let mut out = ByteStreamBuffer::new();
    out.write_varint(strings.len() as u64);
    for s in strings {
        out.write_varint(s.len() as u64);
    }
    for s in strings {
        out.write_bytes(s.as_bytes());
    }

    let mut index_stream = ByteStreamBuffer::new();
    let mut codec = MruCodec::new(mru_cell_bits)?;
    for &index in references {
        let index = u32::try_from(index)
            .map_err(|_| Error::range("string index does not fit in a u32"))?;
        codec.write(&mut index_stream, index)?;
    }
    let index_bytes = index_stream.to_vec();
    out.write_varint(index_bytes.len() as u64);
    out.write_bytes(&index_bytes);

    Ok(out.to_vec())
}

/// Parses section 2 out of `src`, returning the string table and the
/// decoded index stream as a queue ready for the AST decoder to drain
/// one entry per `TAG_STRING` tag it sees.
pub fn decode_string_table(
    src: &mut ByteStreamSource,
    mru_cell_bits: u32,
) -> Result<(Vec<String>, VecDeque<u32>)> {
    let count = src.read_varint()? as usize;
    let mut lengths = Vec::with_capacity(count);
    for _ in 0..count {
        lengths.push(src.read_varint()? as usize);
    }
    let mut strings = Vec::with_capacity(count);
    for len in lengths {
        let bytes = src.read_bytes(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|e| Error::malformed(format!("string table entry is not UTF-8: {e}")))?;
        strings.push(s.to_string());
    }

    let index_section_len = src.read_varint()? as usize;
    let index_bytes = src.read_bytes(index_section_len)?;
    let mut index_src = ByteStreamSource::new(index_bytes);
    let mut codec = MruCodec::new(mru_cell_bits)?;
    let mut queue = VecDeque::new();
    while !index_src.is_exhausted() {
        queue.push_back(codec.read(&mut index_src)?);
    }
    debug_assert!(index_src.is_exhausted());

    Ok((strings, queue))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_string_table_and_its_index_stream() {
        let strings = vec!["let".to_string(), "x".to_string(), "y".to_string()];
        let references = vec![0, 1, 0, 2, 1];

        let bytes = encode_string_table(&strings, &references, 2).unwrap();
        let mut src = ByteStreamSource::new(&bytes);
        let (decoded_strings, mut queue) = decode_string_table(&mut src, 2).unwrap();
        assert!(src.is_exhausted());

        assert_eq!(decoded_strings, strings);
        let decoded_refs: Vec<u32> = std::iter::from_fn(|| queue.pop_front()).collect();
        assert_eq!(decoded_refs, references.iter().map(|&i| i as u32).collect::<Vec<_>>());
    }

    #[test]
    fn empty_table_round_trips() {
        let bytes = encode_string_table(&[], &[], 2).unwrap();
        let mut src = ByteStreamSource::new(&bytes);
        let (strings, queue) = decode_string_table(&mut src, 2).unwrap();
        assert!(strings.is_empty());
        assert!(queue.is_empty());
        assert!(src.is_exhausted());
    }
}
