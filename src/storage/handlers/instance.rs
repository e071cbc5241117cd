//! Workflow instance lifecycle and instance-state shard records
//!
//! Both record kinds are stored as `[state byte][json body]` so the lifecycle
//! scanner can classify them from the first byte alone.

use super::decode;
use crate::keys;
use crate::meta::{InstanceState, WorkflowInstance, WorkflowInstanceState};
use crate::rpc::{
    CreateInstanceStateShardRequest, RemoveInstanceStateShardRequest, StartedInstanceRequest,
    StartingInstanceRequest, StepInstanceStateShardRequest, StoppedInstanceRequest,
    StoppingInstanceRequest, UpdateInstanceStateShardRequest,
};
use crate::storage::errors::{Result, StorageError};
use crate::storage::StorageEvent;
use crate::store::ShardData;

fn state_record<T: serde::Serialize>(state: u8, body: &T) -> Result<Vec<u8>> {
    let mut value = vec![state];
    serde_json::to_writer(&mut value, body)?;
    Ok(value)
}

/// Decodes a lifecycle record into its state and instance.
pub fn decode_instance_record(value: &[u8]) -> Result<(InstanceState, WorkflowInstance)> {
    let (state, body) = value
        .split_first()
        .ok_or_else(|| StorageError::Codec("empty instance record".to_string()))?;
    let state = InstanceState::from_byte(*state)
        .ok_or_else(|| StorageError::Codec(format!("unknown instance state {}", state)))?;
    Ok((state, serde_json::from_slice(body)?))
}

/// Decodes an instance-state shard record.
pub fn decode_shard_record(value: &[u8]) -> Result<WorkflowInstanceState> {
    let body = value
        .get(1..)
        .ok_or_else(|| StorageError::Codec("empty instance shard record".to_string()))?;
    Ok(serde_json::from_slice(body)?)
}

pub fn starting_instance(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: StartingInstanceRequest = decode(payload)?;
    let key = keys::instance_key(req.instance.workflow_id);
    let value = state_record(InstanceState::Starting as u8, &req.instance)?;

    shard.set(key, value);
    shard.emit(StorageEvent::InstanceLoaded(req.instance));
    Ok(Vec::new())
}

fn transition(shard: &mut ShardData, workflow_id: u64, state: InstanceState) -> Result<WorkflowInstance> {
    let key = keys::instance_key(workflow_id);
    let value = shard
        .get(&key)
        .ok_or_else(|| StorageError::Rejected(format!("workflow instance {} not found", workflow_id)))?;
    let (_, instance) = decode_instance_record(value)?;

    let mut updated = value.to_vec();
    updated[0] = state as u8;
    shard.set(key, updated);
    Ok(instance)
}

pub fn started_instance(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: StartedInstanceRequest = decode(payload)?;
    transition(shard, req.workflow_id, InstanceState::Started)?;
    Ok(Vec::new())
}

pub fn stopping_instance(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: StoppingInstanceRequest = decode(payload)?;
    transition(shard, req.workflow_id, InstanceState::Stopping)?;
    Ok(Vec::new())
}

pub fn stopped_instance(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: StoppedInstanceRequest = decode(payload)?;
    transition(shard, req.workflow_id, InstanceState::Stopped)?;
    shard.emit(StorageEvent::InstanceRemoved(req.workflow_id));
    Ok(Vec::new())
}

pub fn create_state(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: CreateInstanceStateShardRequest = decode(payload)?;
    let key = keys::instance_shard_key(req.state.workflow_id, req.state.index);
    if shard.contains(&key) {
        return Err(StorageError::Rejected(format!(
            "instance shard {}/{} already exists",
            req.state.workflow_id, req.state.index
        )));
    }

    shard.set(key, state_record(req.state.state as u8, &req.state)?);
    shard.emit(StorageEvent::InstanceStateLoaded(req.state));
    Ok(Vec::new())
}

pub fn update_state(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: UpdateInstanceStateShardRequest = decode(payload)?;
    let key = keys::instance_shard_key(req.state.workflow_id, req.state.index);
    if !shard.contains(&key) {
        return Err(StorageError::Rejected(format!(
            "instance shard {}/{} not found",
            req.state.workflow_id, req.state.index
        )));
    }

    shard.set(key, state_record(req.state.state as u8, &req.state)?);
    Ok(Vec::new())
}

/// Like `update_state`, but fenced on ownership: a runner that lost the
/// shard can no longer move it.
pub fn step_state(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: StepInstanceStateShardRequest = decode(payload)?;
    let key = keys::instance_shard_key(req.state.workflow_id, req.state.index);
    let current = shard.get(&key).map(decode_shard_record).transpose()?.ok_or_else(|| {
        StorageError::Rejected(format!(
            "instance shard {}/{} not found",
            req.state.workflow_id, req.state.index
        ))
    })?;
    if current.runner != req.state.runner {
        return Err(StorageError::Rejected(format!(
            "instance shard {}/{} is owned by runner {}, not {}",
            req.state.workflow_id, req.state.index, current.runner, req.state.runner
        )));
    }

    shard.set(key, state_record(req.state.state as u8, &req.state)?);
    Ok(Vec::new())
}

pub fn remove_state(shard: &mut ShardData, payload: &[u8]) -> Result<Vec<u8>> {
    let req: RemoveInstanceStateShardRequest = decode(payload)?;
    if shard.delete(&keys::instance_shard_key(req.workflow_id, req.index)) {
        shard.emit(StorageEvent::InstanceStateRemoved {
            workflow_id: req.workflow_id,
            index: req.index,
        });
    }
    Ok(Vec::new())
}
