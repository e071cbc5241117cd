//! Server-side command handlers
//!
//! Handlers run inside the replicated store's apply path. Write handlers
//! validate before they mutate, so a rejected command leaves the shard
//! untouched.

pub mod bitmap;
pub mod instance;
pub mod kv;
pub mod queue;

use crate::rpc::MessageType;
use crate::storage::errors::Result;
use crate::storage::registry::{CommandRegistry, RegistryBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Register every built-in operation.
pub fn register_all(builder: &mut RegistryBuilder) {
    builder
        .register_write(MessageType::Set, "set", kv::set)
        .register_read(MessageType::Get, "get", kv::get)
        .register_write(MessageType::Delete, "delete", kv::delete)
        .register_read(MessageType::Scan, "scan", kv::scan)
        .register_write(MessageType::AllocId, "alloc-id", kv::alloc_id)
        .register_write(MessageType::ResetId, "reset-id", kv::reset_id);

    builder
        .register_write(MessageType::StartingInstance, "starting-instance", instance::starting_instance)
        .register_write(MessageType::StartedInstance, "started-instance", instance::started_instance)
        .register_write(MessageType::StoppingInstance, "stopping-instance", instance::stopping_instance)
        .register_write(MessageType::StoppedInstance, "stopped-instance", instance::stopped_instance)
        .register_write(MessageType::CreateInstanceStateShard, "create-state", instance::create_state)
        .register_write(MessageType::UpdateInstanceStateShard, "update-state", instance::update_state)
        .register_write(MessageType::RemoveInstanceStateShard, "remove-state", instance::remove_state)
        .register_write(MessageType::StepInstanceStateShard, "step-state", instance::step_state);

    builder
        .register_write(MessageType::BmCreate, "bm-create", bitmap::create)
        .register_write(MessageType::BmAdd, "bm-add", bitmap::add)
        .register_write(MessageType::BmRemove, "bm-remove", bitmap::remove)
        .register_write(MessageType::BmClear, "bm-clear", bitmap::clear)
        .register_write(MessageType::BmDel, "bm-del", bitmap::del)
        .register_read(MessageType::BmContains, "bm-contains", bitmap::contains)
        .register_read(MessageType::BmCount, "bm-count", bitmap::count)
        .register_read(MessageType::BmRange, "bm-range", bitmap::range);

    builder
        .register_write(MessageType::QueueAdd, "queue-add", queue::add)
        .register_write(MessageType::QueueFetch, "queue-fetch", queue::fetch)
        .register_write(MessageType::QueueCommit, "queue-commit", queue::commit)
        .register_write(MessageType::QueueDelete, "queue-delete", queue::delete)
        .register_write(MessageType::QueueJoinGroup, "queue-join-group", queue::join_group)
        .register_read(MessageType::QueueScan, "queue-scan", queue::scan);
}

/// Registry holding every built-in operation.
pub fn default_registry() -> CommandRegistry {
    let mut builder = RegistryBuilder::new();
    register_all(&mut builder);
    builder.build()
}

pub(crate) fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(payload)?)
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}
