//! Keyspace layout
//!
//! Every durable record lives under a one-byte entity prefix followed by
//! big-endian identifiers, so byte order equals numeric order and each entity
//! kind can be range-scanned on its own. KV keys supplied by callers are used
//! literally.
//!
//! ```text
//! tenant metadata     0x01 | tenant_id:u64
//! instance lifecycle  0x02 | workflow_id:u64
//! instance shard      0x03 | workflow_id:u64 | index:u32
//! queue partition     0x04 | queue_id:u64 | partition:u32
//!   partition meta      <partition> | 0x00
//!   record              <partition> | 0x01 | offset:u64
//!   group cursor        <partition> | 0x02 | group bytes
//!   group members       <partition> | 0x03 | group bytes
//! ```

const TENANT_METADATA_PREFIX: u8 = 0x01;
const INSTANCE_PREFIX: u8 = 0x02;
const INSTANCE_SHARD_PREFIX: u8 = 0x03;
const QUEUE_PARTITION_PREFIX: u8 = 0x04;

const PARTITION_META_TAG: u8 = 0x00;
const PARTITION_RECORD_TAG: u8 = 0x01;
const PARTITION_CURSOR_TAG: u8 = 0x02;
const PARTITION_MEMBERS_TAG: u8 = 0x03;

/// Key of a tenant's metadata record.
pub fn tenant_metadata_key(tenant_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(TENANT_METADATA_PREFIX);
    key.extend_from_slice(&tenant_id.to_be_bytes());
    key
}

/// Key of a workflow instance lifecycle record.
pub fn instance_key(workflow_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(INSTANCE_PREFIX);
    key.extend_from_slice(&workflow_id.to_be_bytes());
    key
}

/// Key of an instance-state shard, ordered by (workflow id, index).
pub fn instance_shard_key(workflow_id: u64, index: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(13);
    key.push(INSTANCE_SHARD_PREFIX);
    key.extend_from_slice(&workflow_id.to_be_bytes());
    key.extend_from_slice(&index.to_be_bytes());
    key
}

/// Routing key shared by every command that touches one queue partition.
pub fn partition_key(queue_id: u64, partition: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(13);
    key.push(QUEUE_PARTITION_PREFIX);
    key.extend_from_slice(&queue_id.to_be_bytes());
    key.extend_from_slice(&partition.to_be_bytes());
    key
}

pub fn partition_meta_key(queue_id: u64, partition: u32) -> Vec<u8> {
    let mut key = partition_key(queue_id, partition);
    key.push(PARTITION_META_TAG);
    key
}

pub fn partition_record_key(queue_id: u64, partition: u32, offset: u64) -> Vec<u8> {
    let mut key = partition_key(queue_id, partition);
    key.push(PARTITION_RECORD_TAG);
    key.extend_from_slice(&offset.to_be_bytes());
    key
}

pub fn group_cursor_key(queue_id: u64, partition: u32, group: &str) -> Vec<u8> {
    let mut key = partition_key(queue_id, partition);
    key.push(PARTITION_CURSOR_TAG);
    key.extend_from_slice(group.as_bytes());
    key
}

pub fn group_members_key(queue_id: u64, partition: u32, group: &str) -> Vec<u8> {
    let mut key = partition_key(queue_id, partition);
    key.push(PARTITION_MEMBERS_TAG);
    key.extend_from_slice(group.as_bytes());
    key
}

/// Half-open range `[start, end)` covering every lifecycle record.
pub fn instance_range() -> (Vec<u8>, Vec<u8>) {
    (instance_key(0), instance_key(u64::MAX))
}

/// Half-open range `[start, end)` covering every instance-state shard.
pub fn instance_shard_range() -> (Vec<u8>, Vec<u8>) {
    (instance_shard_key(0, 0), instance_shard_key(u64::MAX, u32::MAX))
}

/// Record keys of a partition with offsets in `[from, to)`.
pub fn partition_record_range(queue_id: u64, partition: u32, from: u64, to: u64) -> (Vec<u8>, Vec<u8>) {
    (
        partition_record_key(queue_id, partition, from),
        partition_record_key(queue_id, partition, to),
    )
}

/// Decodes the offset suffix of a partition record key.
pub fn record_offset(key: &[u8]) -> Option<u64> {
    if key.len() < 8 {
        return None;
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&key[key.len() - 8..]);
    Some(u64::from_be_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_keys_follow_numeric_order() {
        assert!(instance_key(1) < instance_key(2));
        assert!(instance_key(255) < instance_key(256));
        assert!(instance_key(u64::MAX - 1) < instance_key(u64::MAX));
    }

    #[test]
    fn test_instance_shard_keys_order_by_workflow_then_index() {
        assert!(instance_shard_key(1, 9) < instance_shard_key(2, 0));
        assert!(instance_shard_key(1, 0) < instance_shard_key(1, 1));
    }

    #[test]
    fn test_entity_kinds_do_not_interleave() {
        let (start, end) = instance_range();
        let tenant = tenant_metadata_key(u64::MAX);
        let shard = instance_shard_key(0, 0);

        assert!(tenant < start);
        assert!(shard >= end);
    }

    #[test]
    fn test_partition_records_share_partition_prefix() {
        let prefix = partition_key(7, 3);
        assert!(partition_record_key(7, 3, 42).starts_with(&prefix));
        assert!(group_cursor_key(7, 3, "g").starts_with(&prefix));
        assert!(group_members_key(7, 3, "g").starts_with(&prefix));
        assert!(!partition_record_key(7, 4, 42).starts_with(&prefix));
    }

    #[test]
    fn test_record_range_and_offset_decode() {
        let (start, end) = partition_record_range(1, 0, 5, 10);
        let key = partition_record_key(1, 0, 7);
        assert!(key >= start && key < end);
        assert_eq!(record_offset(&key), Some(7));
        assert!(partition_meta_key(1, 0) < start);
    }
}
