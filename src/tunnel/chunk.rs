//! ClientHello fragmentation policy

use bytes::Bytes;

/// Split `buf` into the ordered chunk sequence for the fragmented upstream
/// write.
///
/// With a positive `window_size`, chunks are fixed-size slices of that many
/// bytes, the final one possibly shorter; an empty buffer yields an empty
/// sequence. A `window_size` of zero selects legacy fragmentation: a
/// single-byte first segment followed by the rest (an empty buffer yields one
/// empty chunk, preserving the caller's at-least-one-write expectation).
///
/// Most inline SNI scanners only reassemble across segments when the first
/// segment looks like a full record header; the 1-byte prefix forces
/// buffering the scanner may not perform, and the SNI field itself begins
/// well after byte 0.
pub fn split_chunks(buf: &Bytes, window_size: usize) -> Vec<Bytes> {
    if window_size > 0 {
        let mut chunks = Vec::with_capacity(buf.len().div_ceil(window_size));
        let mut rest = buf.clone();
        while !rest.is_empty() {
            let take = window_size.min(rest.len());
            chunks.push(rest.split_to(take));
        }
        return chunks;
    }

    if buf.is_empty() {
        return vec![buf.clone()];
    }

    vec![buf.slice(..1), buf.slice(1..)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concat(chunks: &[Bytes]) -> Vec<u8> {
        chunks.iter().flat_map(|c| c.iter().copied()).collect()
    }

    #[test]
    fn fixed_window_splits_evenly() {
        let buf = Bytes::from_static(b"abcdefgh");
        let chunks = split_chunks(&buf, 4);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref(), b"abcd");
        assert_eq!(chunks[1].as_ref(), b"efgh");
        assert_eq!(concat(&chunks), buf.as_ref());
    }

    #[test]
    fn fixed_window_short_tail() {
        let buf = Bytes::from_static(b"abcdefghij");
        let chunks = split_chunks(&buf, 4);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].as_ref(), b"ij");
        assert_eq!(concat(&chunks), buf.as_ref());
    }

    #[test]
    fn window_larger_than_buffer_yields_one_chunk() {
        let buf = Bytes::from_static(b"abc");
        let chunks = split_chunks(&buf, 64);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref(), b"abc");
    }

    #[test]
    fn fixed_window_empty_buffer_yields_nothing() {
        let chunks = split_chunks(&Bytes::new(), 4);
        assert!(chunks.is_empty());
    }

    #[test]
    fn legacy_split_is_one_byte_then_rest() {
        let buf = Bytes::from_static(b"abcdefgh");
        let chunks = split_chunks(&buf, 0);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref(), b"a");
        assert_eq!(chunks[1].as_ref(), b"bcdefgh");
        assert_eq!(concat(&chunks), buf.as_ref());
    }

    #[test]
    fn legacy_split_single_byte_buffer() {
        let buf = Bytes::from_static(b"x");
        let chunks = split_chunks(&buf, 0);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref(), b"x");
        assert!(chunks[1].is_empty());
    }

    #[test]
    fn legacy_split_empty_buffer_yields_one_empty_chunk() {
        let chunks = split_chunks(&Bytes::new(), 0);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
    }

    #[test]
    fn every_chunk_but_last_has_window_length() {
        let buf = Bytes::from(vec![0u8; 517]);
        let chunks = split_chunks(&buf, 64);

        for chunk in &chunks[..chunks.len() - 1] {
            assert_eq!(chunk.len(), 64);
        }
        let last = chunks.last().unwrap();
        assert!(!last.is_empty() && last.len() <= 64);
        assert_eq!(concat(&chunks).len(), 517);
    }
}
