//! Length-prefixed key-value framing.
//!
//! Every (key, value) emission on the snapshot wire is
//!
//! ```text
//! [u32 LE key len][key bytes][u32 LE value len][value bytes]
//! ```
//!
//! The encoder and decoder must agree bit-exactly across nodes and versions:
//! the sorted-file writer on the installing replica reconstructs exactly the
//! pairs the snapshot reader on the serving replica emitted.

use crate::error::Frame as FrameError;

/// Bytes occupied by a single length prefix.
pub const LEN_PREFIX: usize = 4;

/// Append one length-prefixed chunk to `out`, returning the number of bytes
/// appended.
///
/// With `out == None` only the byte count is computed. The snapshot reader
/// uses this to fast-forward its iterator to a requested offset without
/// buffering the skipped bytes.
pub fn append(out: Option<&mut Vec<u8>>, bytes: &[u8]) -> usize {
    if let Some(out) = out {
        out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(bytes);
    }
    LEN_PREFIX + bytes.len()
}

/// Append one framed (key, value) pair.
pub fn append_kv(out: Option<&mut Vec<u8>>, key: &[u8], value: &[u8]) -> usize {
    match out {
        Some(out) => append(Some(out), key) + append(Some(out), value),
        None => append(None, key) + append(None, value),
    }
}

/// Decode a framed buffer back into (key, value) pairs.
///
/// The buffer must contain a whole number of pairs; anything else is a
/// protocol error.
pub fn decode(data: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, FrameError> {
    let mut pairs = Vec::new();
    let mut chunks = Chunks { data, at: 0 };
    while let Some(key) = chunks.next_chunk()? {
        let value = chunks
            .next_chunk()?
            .ok_or(FrameError::TruncatedLen { at: chunks.at })?;
        pairs.push((key.to_vec(), value.to_vec()));
    }
    Ok(pairs)
}

/// Decode the complete (key, value) pairs at the front of `data`.
///
/// Returns the pairs together with the number of bytes consumed. A trailing
/// incomplete pair is not an error here: the transport chunks the stream at
/// arbitrary byte boundaries, so a frame may straddle two deliveries and the
/// caller carries the remainder into the next one. Pairs are consumed
/// atomically; a complete key chunk with an incomplete value chunk is left
/// unconsumed.
pub fn decode_prefix(data: &[u8]) -> (Vec<(Vec<u8>, Vec<u8>)>, usize) {
    let mut pairs = Vec::new();
    let mut chunks = Chunks { data, at: 0 };
    let mut consumed = 0;
    loop {
        let Ok(Some(key)) = chunks.next_chunk() else {
            break;
        };
        let Ok(Some(value)) = chunks.next_chunk() else {
            break;
        };
        pairs.push((key.to_vec(), value.to_vec()));
        consumed = chunks.at;
    }
    (pairs, consumed)
}

struct Chunks<'a> {
    data: &'a [u8],
    at: usize,
}

impl<'a> Chunks<'a> {
    fn next_chunk(&mut self) -> Result<Option<&'a [u8]>, FrameError> {
        if self.at == self.data.len() {
            return Ok(None);
        }
        let rest = &self.data[self.at..];
        if rest.len() < LEN_PREFIX {
            return Err(FrameError::TruncatedLen { at: self.at });
        }
        let mut prefix = [0u8; LEN_PREFIX];
        prefix.copy_from_slice(&rest[..LEN_PREFIX]);
        let len = u32::from_le_bytes(prefix) as usize;
        let start = self.at + LEN_PREFIX;
        if self.data.len() - start < len {
            return Err(FrameError::TruncatedChunk {
                at: self.at,
                expected: len,
                remaining: self.data.len() - start,
            });
        }
        self.at = start + len;
        Ok(Some(&self.data[start..start + len]))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn append_emits_little_endian_length_prefixes() {
        let mut buf = Vec::new();
        let n = append_kv(Some(&mut buf), b"k1", b"v1");
        assert_eq!(n, 12);
        assert_eq!(
            buf,
            [&2u32.to_le_bytes()[..], &b"k1"[..], &2u32.to_le_bytes()[..], &b"v1"[..]].concat()
        );
    }

    #[test]
    fn null_sink_counts_without_emitting() {
        let mut buf = Vec::new();
        let counted = append_kv(None, b"key", b"some value");
        let appended = append_kv(Some(&mut buf), b"key", b"some value");
        assert_eq!(counted, appended);
        assert_eq!(buf.len(), appended);
    }

    #[test]
    fn decode_of_empty_buffer_is_empty() {
        assert_eq!(decode(&[]), Ok(vec![]));
    }

    #[test]
    fn decode_rejects_truncated_length_prefix() {
        assert_eq!(decode(&[1, 0]), Err(FrameError::TruncatedLen { at: 0 }));
    }

    #[test]
    fn decode_rejects_truncated_chunk() {
        let data = 5u32.to_le_bytes().to_vec();
        assert_eq!(
            decode(&data),
            Err(FrameError::TruncatedChunk {
                at: 0,
                expected: 5,
                remaining: 0
            })
        );
    }

    #[test]
    fn decode_rejects_dangling_key() {
        let mut data = Vec::new();
        append(Some(&mut data), b"key without value");
        assert_eq!(
            decode(&data),
            Err(FrameError::TruncatedLen { at: data.len() })
        );
    }

    #[test]
    fn decode_prefix_keeps_incomplete_pairs_for_later() {
        let mut buf = Vec::new();
        append_kv(Some(&mut buf), b"k1", b"v1");
        append_kv(Some(&mut buf), b"k2", b"v2");
        let whole = buf.len();
        buf.extend_from_slice(&9u32.to_le_bytes());
        buf.extend_from_slice(b"par");

        let (pairs, consumed) = decode_prefix(&buf);
        assert_eq!(consumed, whole);
        assert_eq!(
            pairs,
            vec![
                (b"k1".to_vec(), b"v1".to_vec()),
                (b"k2".to_vec(), b"v2".to_vec()),
            ]
        );
    }

    #[test]
    fn decode_prefix_consumes_whole_pairs_only() {
        let mut buf = Vec::new();
        append(Some(&mut buf), b"dangling key");

        let (pairs, consumed) = decode_prefix(&buf);
        assert!(pairs.is_empty());
        assert_eq!(consumed, 0);
    }

    proptest! {
        #[test]
        fn frame_roundtrip(pairs in proptest::collection::vec((any::<Vec<u8>>(), any::<Vec<u8>>()), 0..8)) {
            let mut buf = Vec::new();
            for (key, value) in &pairs {
                append_kv(Some(&mut buf), key, value);
            }
            prop_assert_eq!(decode(&buf).unwrap(), pairs);
        }
    }
}
