//! Configuration for the storage facade and tenant queues

use crate::store::ShardGroup;
use std::time::Duration;

/// Storage facade configuration.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Upper bound on a single command round trip
    pub rpc_timeout: Duration,

    /// Period between lifecycle scans while leader
    pub scan_interval: Duration,

    /// Records fetched per scan page
    pub scan_page_limit: u64,

    /// Buffered storage events per subscriber. Read when the store is built
    /// (`MemoryStore::from_config`), not by `Storage::new`, because the
    /// event stream belongs to the store.
    pub event_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_secs(10),
            scan_interval: Duration::from_secs(10),
            scan_page_limit: 16,
            event_capacity: 1024,
        }
    }
}

impl StorageConfig {
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    pub fn with_scan_page_limit(mut self, limit: u64) -> Self {
        self.scan_page_limit = limit.max(1);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// Tenant queue configuration.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Bounded buffer size of each partition; `add` blocks when full
    pub partition_capacity: usize,

    /// Maximum items committed in one replicated write
    pub batch_size: usize,

    /// Routing group the batches are written to
    pub group: ShardGroup,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            partition_capacity: 1024,
            batch_size: 64,
            group: ShardGroup::TenantInput,
        }
    }
}

impl QueueConfig {
    pub fn with_partition_capacity(mut self, capacity: usize) -> Self {
        self.partition_capacity = capacity.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_group(mut self, group: ShardGroup) -> Self {
        self.group = group;
        self
    }
}
