//! Plain key/value operations

use super::{decode, encode};
use crate::rpc::{
    AllocIdRequest, BytesResponse, BytesSliceResponse, DeleteRequest, GetRequest, IdRangeResponse,
    ResetIdRequest, ScanRequest, SetRequest,
};
use crate::storage::errors::{Result, StorageError};
use crate::store::ShardData;
use std::time::Duration;

pub fn set(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: SetRequest = decode(payload)?;
    shard.set_with_ttl(req.key, req.value, Duration::from_secs(req.ttl));
    Ok(Vec::new())
}

pub fn get(shard: &ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: GetRequest = decode(payload)?;
    encode(&BytesResponse {
        value: shard.get(&req.key).map(|v| v.to_vec()),
    })
}

pub fn delete(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: DeleteRequest = decode(payload)?;
    shard.delete(&req.key);
    Ok(Vec::new())
}

pub fn scan(shard: &ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: ScanRequest = decode(payload)?;
    let skip = req.skip as usize;
    let values = shard
        .scan(&req.start, &req.end, req.limit as usize)
        .into_iter()
        .map(|(_, value)| value.get(skip..).unwrap_or_default().to_vec())
        .collect();
    encode(&BytesSliceResponse { values })
}

fn read_counter(shard: &ShardData, key: &[u8]) -> Result<u64> {
    match shard.get(key) {
        None => Ok(0),
        Some(raw) => {
            let bytes: [u8; 8] = raw
                .try_into()
                .map_err(|_| StorageError::Codec(format!("id counter has {} bytes", raw.len())))?;
            Ok(u64::from_be_bytes(bytes))
        }
    }
}

pub fn alloc_id(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: AllocIdRequest = decode(payload)?;
    let batch = req.batch.max(1);
    let current = read_counter(shard, &req.key)?;
    let to = current
        .checked_add(batch)
        .ok_or_else(|| StorageError::Rejected("id space exhausted".to_string()))?;

    shard.set(req.key, to.to_be_bytes().to_vec());
    encode(&IdRangeResponse {
        from: current + 1,
        to,
    })
}

pub fn reset_id(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: ResetIdRequest = decode(payload)?;
    shard.set(req.key, req.start_with.to_be_bytes().to_vec());
    Ok(Vec::new())
}
