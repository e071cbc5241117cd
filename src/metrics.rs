//! Aggregate counters consumed by an external metrics sink
//!
//! Nothing here is durable; every value is recomputed by the lifecycle
//! scanner from the replicated keyspace.

use std::sync::atomic::{AtomicU64, Ordering};

pub trait Metrics: Send + Sync + 'static {
    fn set_workflow_count(&self, starting: u64, started: u64, stopping: u64, stopped: u64);

    fn set_workflow_shards_count(&self, running: u64, stopped: u64);

    fn incr_storage_failed(&self);
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn set_workflow_count(&self, _starting: u64, _started: u64, _stopping: u64, _stopped: u64) {}

    fn set_workflow_shards_count(&self, _running: u64, _stopped: u64) {}

    fn incr_storage_failed(&self) {}
}

/// Workflow instance counts by lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkflowCounts {
    pub starting: u64,
    pub started: u64,
    pub stopping: u64,
    pub stopped: u64,
}

/// Instance-state shard counts by state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShardCounts {
    pub running: u64,
    pub stopped: u64,
}

/// In-process counters with snapshot accessors.
#[derive(Debug, Default)]
pub struct Counters {
    starting: AtomicU64,
    started: AtomicU64,
    stopping: AtomicU64,
    stopped: AtomicU64,
    shards_running: AtomicU64,
    shards_stopped: AtomicU64,
    storage_failed: AtomicU64,
    // Number of completed publishes, lets callers wait for a fresh scan
    workflow_publishes: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workflow_counts(&self) -> WorkflowCounts {
        WorkflowCounts {
            starting: self.starting.load(Ordering::Acquire),
            started: self.started.load(Ordering::Acquire),
            stopping: self.stopping.load(Ordering::Acquire),
            stopped: self.stopped.load(Ordering::Acquire),
        }
    }

    pub fn shard_counts(&self) -> ShardCounts {
        ShardCounts {
            running: self.shards_running.load(Ordering::Acquire),
            stopped: self.shards_stopped.load(Ordering::Acquire),
        }
    }

    pub fn storage_failed(&self) -> u64 {
        self.storage_failed.load(Ordering::Acquire)
    }

    pub fn workflow_publishes(&self) -> u64 {
        self.workflow_publishes.load(Ordering::Acquire)
    }
}

impl Metrics for Counters {
    fn set_workflow_count(&self, starting: u64, started: u64, stopping: u64, stopped: u64) {
        self.starting.store(starting, Ordering::Release);
        self.started.store(started, Ordering::Release);
        self.stopping.store(stopping, Ordering::Release);
        self.stopped.store(stopped, Ordering::Release);
        self.workflow_publishes.fetch_add(1, Ordering::AcqRel);
    }

    fn set_workflow_shards_count(&self, running: u64, stopped: u64) {
        self.shards_running.store(running, Ordering::Release);
        self.shards_stopped.store(stopped, Ordering::Release);
    }

    fn incr_storage_failed(&self) {
        self.storage_failed.fetch_add(1, Ordering::AcqRel);
    }
}
