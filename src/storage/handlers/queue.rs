//! Partitioned queue handlers
//!
//! A partition keeps its records under `partition_record_key(id, p, offset)`
//! with offsets starting at 1, one [`PartitionMeta`] with the retained offset
//! range, and per consumer group a [`GroupCursor`] and [`GroupMembers`].

use super::{decode, encode};
use crate::keys;
use crate::meta::{GroupCursor, GroupMembers, PartitionMeta};
use crate::rpc::{
    QueueAddRequest, QueueAddResponse, QueueCommitRequest, QueueCommitResponse, QueueDeleteRequest,
    QueueDeleteResponse, QueueFetchRequest, QueueFetchResponse, QueueJoinGroupRequest,
    QueueJoinGroupResponse, QueueRecord, QueueScanRequest, QueueScanResponse,
};
use crate::storage::errors::{Result, StorageError};
use crate::store::ShardData;
use serde::de::DeserializeOwned;
use serde::Serialize;

fn load<T: DeserializeOwned + Default>(shard: &ShardData, key: &[u8]) -> Result<T> {
    match shard.get(key) {
        Some(raw) => Ok(serde_json::from_slice(raw)?),
        None => Ok(T::default()),
    }
}

fn save<T: Serialize>(shard: &mut ShardData, key: Vec<u8>, value: &T) -> Result<()> {
    shard.set(key, serde_json::to_vec(value)?);
    Ok(())
}

/// Records with offsets in `[from, to]`, at most `limit` (0 means no limit).
fn read_records(shard: &ShardData, id: u64, partition: u32, from: u64, to: u64, limit: usize) -> Vec<QueueRecord> {
    if from > to {
        return Vec::new();
    }
    let (start, end) = keys::partition_record_range(id, partition, from, to.saturating_add(1));
    shard
        .scan(&start, &end, limit)
        .into_iter()
        .filter_map(|(key, data)| {
            keys::record_offset(key).map(|offset| QueueRecord {
                offset,
                data: data.to_vec(),
            })
        })
        .collect()
}

/// Checks that `offset` may become the group's committed offset.
fn validate_commit(group: &str, cursor: &GroupCursor, meta: &PartitionMeta, offset: u64) -> Result<()> {
    if offset < cursor.committed {
        return Err(StorageError::InvalidCommit {
            group: group.to_string(),
            requested: offset,
            current: cursor.committed,
        });
    }
    if offset > meta.last_offset {
        return Err(StorageError::OffsetOutOfRange {
            requested: offset,
            last: meta.last_offset,
        });
    }
    Ok(())
}

pub fn add(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: QueueAddRequest = decode(payload)?;
    let meta_key = keys::partition_meta_key(req.id, req.partition);
    let mut meta: PartitionMeta = load(shard, &meta_key)?;

    for item in req.items {
        meta.last_offset += 1;
        shard.set(keys::partition_record_key(req.id, req.partition, meta.last_offset), item);
    }
    save(shard, meta_key, &meta)?;

    encode(&QueueAddResponse {
        last_offset: meta.last_offset,
    })
}

/// Hands out the records after the group's committed offset.
///
/// Fetching again without committing returns the same records, so a
/// consumer that crashed mid-batch sees them redelivered. A non-zero
/// `completed_offset` is committed first, validated like [`commit`].
pub fn fetch(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: QueueFetchRequest = decode(payload)?;
    let meta: PartitionMeta = load(shard, &keys::partition_meta_key(req.id, req.partition))?;
    let cursor_key = keys::group_cursor_key(req.id, req.partition, &req.group);
    let mut cursor: GroupCursor = load(shard, &cursor_key)?;

    if req.completed_offset > 0 {
        validate_commit(&req.group, &cursor, &meta, req.completed_offset)?;
        cursor.committed = req.completed_offset;
    }

    let mut records = Vec::new();
    if req.count > 0 {
        let from = cursor.committed.saturating_add(1).max(meta.first_offset);
        let to = from.saturating_add(req.count - 1).min(meta.last_offset);
        records = read_records(shard, req.id, req.partition, from, to, 0);
    }

    let handed_out = records.last().map(|r| r.offset).unwrap_or(0);
    cursor.in_flight = cursor.committed.max(handed_out);
    save(shard, cursor_key, &cursor)?;

    encode(&QueueFetchResponse {
        records,
        committed: cursor.committed,
    })
}

pub fn commit(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: QueueCommitRequest = decode(payload)?;
    let meta: PartitionMeta = load(shard, &keys::partition_meta_key(req.id, req.partition))?;
    let cursor_key = keys::group_cursor_key(req.id, req.partition, &req.group);
    let mut cursor: GroupCursor = load(shard, &cursor_key)?;

    validate_commit(&req.group, &cursor, &meta, req.offset)?;
    cursor.committed = req.offset;
    cursor.in_flight = cursor.in_flight.max(req.offset);
    save(shard, cursor_key, &cursor)?;

    encode(&QueueCommitResponse {
        committed: cursor.committed,
    })
}

/// Drops every record with an offset up to and including `trim`.
pub fn delete(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: QueueDeleteRequest = decode(payload)?;
    let meta_key = keys::partition_meta_key(req.id, req.partition);
    let mut meta: PartitionMeta = load(shard, &meta_key)?;

    if req.trim > meta.last_offset {
        return Err(StorageError::OffsetOutOfRange {
            requested: req.trim,
            last: meta.last_offset,
        });
    }

    if req.trim >= meta.first_offset {
        let (start, end) =
            keys::partition_record_range(req.id, req.partition, meta.first_offset, req.trim.saturating_add(1));
        shard.delete_range(&start, &end);
        meta.first_offset = req.trim + 1;
        save(shard, meta_key, &meta)?;
    }

    encode(&QueueDeleteResponse {
        first_offset: meta.first_offset,
    })
}

pub fn join_group(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: QueueJoinGroupRequest = decode(payload)?;
    let members_key = keys::group_members_key(req.id, req.partition, &req.group);
    let mut members: GroupMembers = load(shard, &members_key)?;
    let cursor: GroupCursor = load(shard, &keys::group_cursor_key(req.id, req.partition, &req.group))?;

    if members.members.insert(req.consumer, req.metadata).is_none() {
        members.generation += 1;
    }
    save(shard, members_key, &members)?;

    encode(&QueueJoinGroupResponse {
        generation: members.generation,
        committed: cursor.committed,
    })
}

pub fn scan(shard: &ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: QueueScanRequest = decode(payload)?;
    let meta: PartitionMeta = load(shard, &keys::partition_meta_key(req.id, req.partition))?;
    let from = req.from.max(meta.first_offset);
    let records = read_records(shard, req.id, req.partition, from, meta.last_offset, req.limit as usize);
    encode(&QueueScanResponse { records })
}
