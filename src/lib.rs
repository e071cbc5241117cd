pub mod config;
pub mod keys;
pub mod meta;
pub mod metrics;
pub mod queue;
pub mod rpc;
pub mod storage;
pub mod store;

pub use config::{QueueConfig, StorageConfig};
pub use meta::{
    InstanceShardState, InstanceState, KeyValue, QueueEvent, TenantMetadata, UserEvent,
    WorkflowInstance, WorkflowInstanceState,
};
pub use metrics::{Counters, Metrics, NoopMetrics};
pub use queue::{QueueError, TenantQueue};
pub use rpc::{MessageType, Request, RequestCodec, Response, ResponseCodec};
pub use storage::{
    default_registry, CommandKind, CommandRegistry, RegistryBuilder, Storage, StorageError,
    StorageEvent,
};
pub use store::{MemoryStore, ReplicatedStore, RoleChange, ShardGroup};
