//! Durable record types stored in the replicated keyspace

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tenant metadata, written once when the tenant is created.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TenantMetadata {
    pub id: u64,
    /// Number of input queue partitions. Fixed for the tenant's lifetime.
    pub input_partitions: u32,
}

/// Lifecycle stage of a workflow instance.
///
/// Stored as the first byte of the lifecycle record so a scan can classify
/// a record without decoding it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum InstanceState {
    Starting = 1,
    Started = 2,
    Stopping = 3,
    Stopped = 4,
}

impl InstanceState {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            1 => Some(InstanceState::Starting),
            2 => Some(InstanceState::Started),
            3 => Some(InstanceState::Stopping),
            4 => Some(InstanceState::Stopped),
            _ => None,
        }
    }
}

/// Lifecycle stage of an instance-state shard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum InstanceShardState {
    Running = 1,
    Stopped = 2,
}

impl InstanceShardState {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            1 => Some(InstanceShardState::Running),
            2 => Some(InstanceShardState::Stopped),
            _ => None,
        }
    }
}

/// A workflow instance. The snapshot is opaque to this crate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkflowInstance {
    pub workflow_id: u64,
    pub tenant_id: u64,
    pub snapshot: Vec<u8>,
}

/// One shard of a workflow instance's state, owned by a runner.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkflowInstanceState {
    pub workflow_id: u64,
    pub tenant_id: u64,
    pub runner: u64,
    pub index: u32,
    pub state: InstanceShardState,
}

/// Offsets of a queue partition. `last_offset == 0` means empty.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PartitionMeta {
    /// Lowest offset still retained.
    pub first_offset: u64,
    /// Offset of the most recently appended record.
    pub last_offset: u64,
}

impl Default for PartitionMeta {
    fn default() -> Self {
        Self {
            first_offset: 1,
            last_offset: 0,
        }
    }
}

/// Delivery progress of a consumer group on one partition.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupCursor {
    /// Highest offset the group has committed.
    pub committed: u64,
    /// Highest offset handed out by a fetch and not yet committed.
    pub in_flight: u64,
}

/// Consumer group membership on one partition.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupMembers {
    /// Bumped whenever a previously unknown consumer joins.
    pub generation: u64,
    pub members: BTreeMap<String, Vec<u8>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// An inbound user event routed by `user_id`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserEvent {
    pub tenant_id: u64,
    pub user_id: u64,
    pub data: Vec<KeyValue>,
}

/// Record format written to a tenant's input queue.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum QueueEvent {
    User(UserEvent),
}
