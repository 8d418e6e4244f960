//! Key schema of the meta column family.
//!
//! Region bookkeeping lives under a per-region prefix so that a single
//! prefix-bounded iteration visits every meta record of the region. Within
//! the prefix, a kind byte partitions the records; the two kinds the
//! snapshot transport cares about are the prepared-transaction log index
//! entries and the materialized transaction payload entries derived from
//! them.

use crate::{DecodeError, MutKey};

/// First byte of every meta column family key.
pub const META_IDENTIFY: u8 = 0x01;
/// Kind byte of prepared-transaction log index entries.
pub const LOG_INDEX_IDENTIFY: u8 = 0x03;
/// Kind byte of materialized transaction payload entries.
pub const TXN_PB_IDENTIFY: u8 = 0x04;

/// Prefix bounding all meta records of `region_id`.
pub fn meta_info_prefix(region_id: i64) -> Vec<u8> {
    let mut key = MutKey::new();
    key.append_u8(META_IDENTIFY).append_i64(region_id);
    key.into_vec()
}

/// Prefix of the region's log index entries.
pub fn log_index_key_prefix(region_id: i64) -> Vec<u8> {
    let mut key = meta_info_prefix(region_id);
    key.push(LOG_INDEX_IDENTIFY);
    key
}

/// Key of the log index entry for one prepared transaction.
pub fn log_index_key(region_id: i64, log_index: i64) -> Vec<u8> {
    let mut key = log_index_key_prefix(region_id);
    key.extend_from_slice(&(log_index as u64).to_be_bytes());
    key
}

/// Prefix of the region's transaction payload entries.
pub fn transaction_pb_key_prefix(region_id: i64) -> Vec<u8> {
    let mut key = meta_info_prefix(region_id);
    key.push(TXN_PB_IDENTIFY);
    key
}

/// Key of the transaction payload entry for the transaction committed at
/// `log_index`.
pub fn transaction_pb_key(region_id: i64, log_index: i64) -> Vec<u8> {
    let mut key = transaction_pb_key_prefix(region_id);
    key.extend_from_slice(&(log_index as u64).to_be_bytes());
    key
}

/// Value stored under a log index key.
pub fn encode_log_index_value(log_index: i64) -> [u8; 8] {
    (log_index as u64).to_be_bytes()
}

pub fn decode_log_index_value(value: &[u8]) -> Result<i64, DecodeError> {
    let bytes: [u8; 8] = value
        .try_into()
        .map_err(|_| DecodeError::BadLogIndexLen { len: value.len() })?;
    Ok(u64::from_be_bytes(bytes) as i64)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn kind_prefixes_nest_under_meta_info_prefix() {
        let region_id = 42;
        let info = meta_info_prefix(region_id);
        assert!(log_index_key_prefix(region_id).starts_with(&info));
        assert!(transaction_pb_key_prefix(region_id).starts_with(&info));
        assert!(log_index_key(region_id, 7).starts_with(&log_index_key_prefix(region_id)));
        assert!(transaction_pb_key(region_id, 7).starts_with(&transaction_pb_key_prefix(region_id)));
    }

    #[test]
    fn log_index_entries_sort_before_transaction_payloads() {
        assert!(log_index_key(1, i64::MAX) < transaction_pb_key(1, 0));
    }

    #[test]
    fn transaction_keys_sort_by_log_index() {
        assert!(transaction_pb_key(1, 1) < transaction_pb_key(1, 2));
        assert!(transaction_pb_key(1, 255) < transaction_pb_key(1, 256));
    }

    #[test]
    fn log_index_value_roundtrip() {
        assert_eq!(decode_log_index_value(&encode_log_index_value(42)), Ok(42));
        assert_eq!(decode_log_index_value(&encode_log_index_value(0)), Ok(0));
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert_eq!(
            decode_log_index_value(b"123"),
            Err(DecodeError::BadLogIndexLen { len: 3 })
        );
    }
}
