//! Single-replica in-memory store
//!
//! Applies write envelopes one at a time under an exclusive lock, which gives
//! the same total order a replicated log would. Reads share the lock. Writes
//! are refused while the replica is not leader.

use crate::config::StorageConfig;
use crate::storage::{CommandRegistry, Envelope, Handler, StorageError, StorageEvent};
use crate::store::{EventBus, ReplicatedStore, RoleChange, ShardData, ShardGroup};
use async_trait::async_trait;
use slog::{info, warn, Logger};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, RwLock};

pub struct MemoryStore {
    node_id: u64,

    /// Immutable handler table shared with the facade
    registry: Arc<CommandRegistry>,

    /// Applied state per routing group
    groups: RwLock<HashMap<ShardGroup, ShardData>>,

    /// Index of the last applied write
    applied_index: AtomicU64,

    leader: AtomicBool,

    role_change_tx: broadcast::Sender<RoleChange>,

    event_bus: EventBus<StorageEvent>,

    /// When set, every write fails with this reason
    write_failure: Mutex<Option<String>>,

    logger: Logger,
}

impl MemoryStore {
    /// Create a store that starts as follower. Call [`MemoryStore::campaign`]
    /// to accept writes.
    pub fn new(node_id: u64, registry: Arc<CommandRegistry>, logger: Logger) -> Self {
        Self::with_event_capacity(node_id, registry, 1024, logger)
    }

    /// Create a store sized by `config`. Only the store-side settings
    /// (`event_capacity`) are read here; the rest configure [`Storage`].
    ///
    /// [`Storage`]: crate::storage::Storage
    pub fn from_config(
        node_id: u64,
        registry: Arc<CommandRegistry>,
        config: &StorageConfig,
        logger: Logger,
    ) -> Self {
        Self::with_event_capacity(node_id, registry, config.event_capacity, logger)
    }

    pub fn with_event_capacity(
        node_id: u64,
        registry: Arc<CommandRegistry>,
        event_capacity: usize,
        logger: Logger,
    ) -> Self {
        let (role_change_tx, _) = broadcast::channel(16);
        Self {
            node_id,
            registry,
            groups: RwLock::new(HashMap::new()),
            applied_index: AtomicU64::new(0),
            leader: AtomicBool::new(false),
            role_change_tx,
            event_bus: EventBus::new(event_capacity),
            write_failure: Mutex::new(None),
            logger,
        }
    }

    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    /// Become leader and notify subscribers.
    pub fn campaign(&self) {
        if !self.leader.swap(true, Ordering::AcqRel) {
            info!(self.logger, "Became leader"; "node_id" => self.node_id);
            let _ = self.role_change_tx.send(RoleChange::BecameLeader);
        }
    }

    /// Become follower and notify subscribers.
    pub fn step_down(&self) {
        if self.leader.swap(false, Ordering::AcqRel) {
            info!(self.logger, "Became follower"; "node_id" => self.node_id);
            let _ = self.role_change_tx.send(RoleChange::BecameFollower);
        }
    }

    /// Make every subsequent write fail with `reason`, or clear the failure.
    pub fn fail_writes(&self, reason: Option<String>) {
        let mut failure = self
            .write_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *failure = reason;
    }

    pub fn applied_index(&self) -> u64 {
        self.applied_index.load(Ordering::Acquire)
    }

    fn injected_failure(&self) -> Option<String> {
        self.write_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ReplicatedStore for MemoryStore {
    async fn execute(&self, envelope: Envelope, group: ShardGroup) -> Result<Vec<u8>, StorageError> {
        let handler = self.registry.handler(envelope.message_type);
        if handler.kind() != envelope.kind {
            panic!(
                "{:?} envelope classified as {:?} but registered as {:?}",
                envelope.message_type,
                envelope.kind,
                handler.kind()
            );
        }

        match handler {
            Handler::Read(read) => {
                let groups = self.groups.read().await;
                match groups.get(&group) {
                    Some(shard) => read(shard, &envelope.payload),
                    None => read(&ShardData::new(), &envelope.payload),
                }
            }
            Handler::Write(write) => {
                if !self.leader.load(Ordering::Acquire) {
                    return Err(StorageError::NotLeader { leader_id: None });
                }
                if let Some(reason) = self.injected_failure() {
                    warn!(self.logger, "Write failed"; "type" => ?envelope.message_type, "reason" => &reason);
                    return Err(StorageError::Unavailable(reason));
                }

                let mut groups = self.groups.write().await;
                let shard = groups.entry(group).or_default();
                let result = write(shard, &envelope.payload);
                let events = shard.take_events();
                self.applied_index.fetch_add(1, Ordering::AcqRel);
                drop(groups);

                if result.is_ok() {
                    self.event_bus.publish_batch(events);
                }
                result
            }
        }
    }

    fn subscribe_role_changes(&self) -> broadcast::Receiver<RoleChange> {
        self.role_change_tx.subscribe()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<StorageEvent> {
        self.event_bus.subscribe()
    }

    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::Acquire)
    }
}
