//! Key construction for region-scoped storage.
//!
//! All keys are memcomparable: integral components are encoded big-endian so
//! that byte order equals numeric order, and every key of a region shares the
//! region's fixed-width prefix. This is what lets the snapshot transport
//! bound an engine iteration to a single region with a plain prefix check.

use thiserror::Error;

pub mod meta;

/// Number of bytes in an encoded region id.
pub const REGION_PREFIX_LEN: usize = 8;

/// A mutable, append-only key buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MutKey {
    data: Vec<u8>,
}

impl MutKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_u8(&mut self, value: u8) -> &mut Self {
        self.data.push(value);
        self
    }

    /// Append a 64-bit integer in big-endian byte order.
    pub fn append_i64(&mut self, value: i64) -> &mut Self {
        self.data.extend_from_slice(&(value as u64).to_be_bytes());
        self
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// The key prefix bounding all data column family keys of a region.
pub fn region_prefix(region_id: i64) -> Vec<u8> {
    let mut key = MutKey::new();
    key.append_i64(region_id);
    key.into_vec()
}

/// Error decoding a stored meta value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log index value must be 8 bytes, got {len}")]
    BadLogIndexLen { len: usize },
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn region_prefix_is_big_endian() {
        assert_eq!(region_prefix(1), vec![0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(region_prefix(1).len(), REGION_PREFIX_LEN);
        assert!(region_prefix(1) < region_prefix(2));
        assert!(region_prefix(255) < region_prefix(256));
    }

    #[test]
    fn mut_key_appends_in_order() {
        let mut key = MutKey::new();
        key.append_u8(0x01).append_i64(3).append_bytes(b"ab");
        assert_eq!(key.data(), [&[0x01][..], &3u64.to_be_bytes()[..], &b"ab"[..]].concat());
        assert_eq!(key.len(), 11);
    }
}
