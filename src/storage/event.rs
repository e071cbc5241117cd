use crate::meta::{WorkflowInstance, WorkflowInstanceState};

/// Change to lifecycle state observed while applying a write.
///
/// Emitted by the command handlers and published by the store only after the
/// write succeeds. Consumers that fall behind the event channel see a lag
/// error and should rescan.
#[derive(Clone, Debug, PartialEq)]
pub enum StorageEvent {
    /// A workflow instance entered `Starting`
    InstanceLoaded(WorkflowInstance),
    /// A workflow instance reached `Stopped`
    InstanceRemoved(u64),
    /// An instance-state shard was created
    InstanceStateLoaded(WorkflowInstanceState),
    /// An instance-state shard was removed
    InstanceStateRemoved { workflow_id: u64, index: u32 },
}
