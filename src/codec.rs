//! Range-key encoding for partitioned indexes.
//!
//! Keys are `prefix | partition_id | item_id` with both integers written
//! big-endian after flipping the sign bit, so byte order matches numeric
//! order. A partition-only key (no item id) sorts before every item key of
//! that partition.

use crate::types::PartitionId;

/// Key-space prefix used by client-written vector and document keys.
pub const CLIENT_RAW_PREFIX: u8 = b'w';

const PARTITION_KEY_LEN: usize = 1 + 8;
const ITEM_KEY_LEN: usize = PARTITION_KEY_LEN + 8;

fn encode_i64(value: i64) -> [u8; 8] {
    ((value as u64) ^ (1u64 << 63)).to_be_bytes()
}

fn decode_i64(bytes: &[u8]) -> Option<i64> {
    let raw: [u8; 8] = bytes.try_into().ok()?;
    Some((u64::from_be_bytes(raw) ^ (1u64 << 63)) as i64)
}

/// Smallest key of a partition.
pub fn encode_partition_key(prefix: u8, part_id: PartitionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(PARTITION_KEY_LEN);
    key.push(prefix);
    key.extend_from_slice(&encode_i64(part_id));
    key
}

/// Key of a single vector or document inside a partition.
pub fn encode_item_key(prefix: u8, part_id: PartitionId, item_id: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(ITEM_KEY_LEN);
    key.push(prefix);
    key.extend_from_slice(&encode_i64(part_id));
    key.extend_from_slice(&encode_i64(item_id));
    key
}

/// Inverse of [`encode_item_key`]. Returns `None` for partition-only or
/// malformed keys.
pub fn decode_item_key(key: &[u8]) -> Option<(u8, PartitionId, i64)> {
    if key.len() != ITEM_KEY_LEN {
        return None;
    }
    let part_id = decode_i64(&key[1..PARTITION_KEY_LEN])?;
    let item_id = decode_i64(&key[PARTITION_KEY_LEN..])?;
    Some((key[0], part_id, item_id))
}
