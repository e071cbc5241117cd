//! Replicated store interface
//!
//! The consensus layer (log, snapshots, elections, shard placement) lives
//! outside this crate. This module names what the rest of the crate needs
//! from it: ordered execution of command envelopes per routing group,
//! leadership notifications and the stream of applied-state events.
//! [`MemoryStore`] is a single-replica implementation used by tests and
//! embedded deployments.

pub mod event_bus;
pub mod memory;
pub mod shard;

pub use event_bus::EventBus;
pub use memory::MemoryStore;
pub use shard::ShardData;

use crate::storage::{Envelope, StorageError, StorageEvent};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Replica group a command is routed to. Each group owns an independent
/// keyspace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShardGroup {
    Default,
    TenantInput,
    TenantOutput,
}

impl ShardGroup {
    pub fn id(self) -> u64 {
        match self {
            ShardGroup::Default => 0,
            ShardGroup::TenantInput => 1,
            ShardGroup::TenantOutput => 2,
        }
    }
}

impl Default for ShardGroup {
    fn default() -> Self {
        ShardGroup::Default
    }
}

/// Leadership notification from the consensus layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleChange {
    BecameLeader,
    BecameFollower,
}

#[async_trait]
pub trait ReplicatedStore: Send + Sync + 'static {
    /// Executes a command envelope against `group`.
    ///
    /// Write envelopes go through the replicated commit path and are applied
    /// in log order. Read envelopes may be served by any replica holding a
    /// valid read lease.
    async fn execute(&self, envelope: Envelope, group: ShardGroup) -> Result<Vec<u8>, StorageError>;

    /// Subscribe to leadership changes of this replica
    fn subscribe_role_changes(&self) -> broadcast::Receiver<RoleChange>;

    /// Subscribe to events emitted while applying writes
    fn subscribe_events(&self) -> broadcast::Receiver<StorageEvent>;

    fn is_leader(&self) -> bool;
}
