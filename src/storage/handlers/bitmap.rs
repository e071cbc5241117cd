//! Bitmap operations
//!
//! A bitmap is stored under its literal key as an ascending run of
//! big-endian `u32`s with no duplicates. A missing key reads as an empty
//! bitmap.

use super::{decode, encode};
use crate::rpc::{
    BmAddRequest, BmClearRequest, BmContainsRequest, BmContainsResponse, BmCountRequest, BmCountResponse,
    BmCreateRequest, BmDelRequest, BmRangeRequest, BmRangeResponse, BmRemoveRequest,
};
use crate::storage::errors::{Result, StorageError};
use crate::store::ShardData;
use std::collections::BTreeSet;

fn load(shard: &ShardData, key: &[u8]) -> Result<BTreeSet<u32>> {
    let Some(raw) = shard.get(key) else {
        return Ok(BTreeSet::new());
    };
    if raw.len() % 4 != 0 {
        return Err(StorageError::Codec(format!("bitmap has {} bytes", raw.len())));
    }
    Ok(raw
        .chunks_exact(4)
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

fn save(shard: &mut ShardData, key: Vec<u8>, bitmap: &BTreeSet<u32>) {
    let mut value = Vec::with_capacity(bitmap.len() * 4);
    for v in bitmap {
        value.extend_from_slice(&v.to_be_bytes());
    }
    shard.set(key, value);
}

pub fn create(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: BmCreateRequest = decode(payload)?;
    save(shard, req.key, &req.values.into_iter().collect());
    Ok(Vec::new())
}

pub fn add(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: BmAddRequest = decode(payload)?;
    let mut bitmap = load(shard, &req.key)?;
    bitmap.extend(req.values);
    save(shard, req.key, &bitmap);
    Ok(Vec::new())
}

pub fn remove(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: BmRemoveRequest = decode(payload)?;
    if !shard.contains(&req.key) {
        return Ok(Vec::new());
    }
    let mut bitmap = load(shard, &req.key)?;
    for v in &req.values {
        bitmap.remove(v);
    }
    save(shard, req.key, &bitmap);
    Ok(Vec::new())
}

pub fn clear(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: BmClearRequest = decode(payload)?;
    if shard.contains(&req.key) {
        shard.set(req.key, Vec::new());
    }
    Ok(Vec::new())
}

pub fn del(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: BmDelRequest = decode(payload)?;
    shard.delete(&req.key);
    Ok(Vec::new())
}

pub fn contains(shard: &ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: BmContainsRequest = decode(payload)?;
    let bitmap = load(shard, &req.key)?;
    encode(&BmContainsResponse {
        contains: req.values.iter().all(|v| bitmap.contains(v)),
    })
}

pub fn count(shard: &ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: BmCountRequest = decode(payload)?;
    encode(&BmCountResponse {
        count: load(shard, &req.key)?.len() as u64,
    })
}

pub fn range(shard: &ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: BmRangeRequest = decode(payload)?;
    let limit = match req.limit {
        0 => usize::MAX,
        n => n as usize,
    };
    let values = load(shard, &req.key)?.range(req.start..).take(limit).copied().collect();
    encode(&BmRangeResponse { values })
}
