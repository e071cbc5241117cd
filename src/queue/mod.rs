//! Partitioned tenant input queues

pub mod error;
pub mod tenant_queue;

pub use error::QueueError;
pub use tenant_queue::TenantQueue;
