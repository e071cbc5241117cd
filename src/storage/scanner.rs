//! Workflow lifecycle scanner
//!
//! While this replica leads, a background task walks the lifecycle and
//! instance-state shard ranges page by page on a fixed interval and
//! republishes the tallies to [`Metrics`]. A failed cycle is logged and
//! skipped; the next tick starts over from the beginning of the range.
//!
//! At most one scan task exists at a time: [`WorkflowScanner::start`] aborts
//! and joins the previous task before spawning the next one.

use crate::keys;
use crate::meta::{InstanceShardState, InstanceState};
use crate::metrics::{Metrics, ShardCounts, WorkflowCounts};
use crate::storage::dispatch::Dispatcher;
use crate::storage::errors::Result;
use crate::storage::handlers::instance::{decode_instance_record, decode_shard_record};
use slog::{debug, error, info, Logger};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Decrements the live task counter when the scan task is dropped, whether it
/// finished, was aborted, or never got polled.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        Self(active)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// One pass over the lifecycle keyspace.
#[derive(Clone)]
struct ScanCycle {
    dispatcher: Dispatcher,
    metrics: Arc<dyn Metrics>,
    page_limit: u64,
    logger: Logger,
}

impl ScanCycle {
    async fn count_instances(&self) -> Result<WorkflowCounts> {
        let (mut start, end) = keys::instance_range();
        let mut counts = WorkflowCounts::default();

        loop {
            let page = self.dispatcher.scan(&start, &end, self.page_limit, 0).await?;
            let mut last = None;
            for value in &page {
                let (state, instance) = decode_instance_record(value)?;
                match state {
                    InstanceState::Starting => counts.starting += 1,
                    InstanceState::Started => counts.started += 1,
                    InstanceState::Stopping => counts.stopping += 1,
                    InstanceState::Stopped => counts.stopped += 1,
                }
                last = Some(instance.workflow_id);
            }

            match last.and_then(|id| id.checked_add(1)) {
                Some(next) if page.len() as u64 >= self.page_limit => start = keys::instance_key(next),
                _ => break,
            }
        }
        Ok(counts)
    }

    async fn count_shards(&self) -> Result<ShardCounts> {
        let (mut start, end) = keys::instance_shard_range();
        let mut counts = ShardCounts::default();

        loop {
            let page = self.dispatcher.scan(&start, &end, self.page_limit, 0).await?;
            let mut next = None;
            for value in &page {
                let shard = decode_shard_record(value)?;
                match shard.state {
                    InstanceShardState::Running => counts.running += 1,
                    InstanceShardState::Stopped => counts.stopped += 1,
                }
                next = match shard.index.checked_add(1) {
                    Some(index) => Some(keys::instance_shard_key(shard.workflow_id, index)),
                    None => shard
                        .workflow_id
                        .checked_add(1)
                        .map(|workflow_id| keys::instance_shard_key(workflow_id, 0)),
                };
            }

            match next {
                Some(key) if page.len() as u64 >= self.page_limit => start = key,
                _ => break,
            }
        }
        Ok(counts)
    }

    async fn scan(&self) -> Result<(WorkflowCounts, ShardCounts)> {
        let workflows = self.count_instances().await?;
        let shards = self.count_shards().await?;
        Ok((workflows, shards))
    }

    async fn publish(&self) -> Result<(WorkflowCounts, ShardCounts)> {
        match self.scan().await {
            Ok((w, s)) => {
                self.metrics.set_workflow_shards_count(s.running, s.stopped);
                self.metrics
                    .set_workflow_count(w.starting, w.started, w.stopping, w.stopped);
                debug!(self.logger, "Lifecycle scan complete";
                    "starting" => w.starting,
                    "started" => w.started,
                    "stopping" => w.stopping,
                    "stopped" => w.stopped,
                    "shards_running" => s.running,
                    "shards_stopped" => s.stopped
                );
                Ok((w, s))
            }
            Err(e) => {
                self.metrics.incr_storage_failed();
                error!(self.logger, "Lifecycle scan failed, skipping cycle"; "error" => %e);
                Err(e)
            }
        }
    }
}

pub struct WorkflowScanner {
    cycle: ScanCycle,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
    active: Arc<AtomicUsize>,
    logger: Logger,
}

impl WorkflowScanner {
    pub fn new(
        dispatcher: Dispatcher,
        metrics: Arc<dyn Metrics>,
        interval: Duration,
        page_limit: u64,
        logger: Logger,
    ) -> Self {
        Self {
            cycle: ScanCycle {
                dispatcher,
                metrics,
                page_limit,
                logger: logger.clone(),
            },
            interval,
            task: Mutex::new(None),
            active: Arc::new(AtomicUsize::new(0)),
            logger,
        }
    }

    /// Replace any running scan task with a fresh one.
    ///
    /// The first cycle runs one interval after the call.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if let Some(previous) = task.take() {
            previous.abort();
            let _ = previous.await;
        }

        let guard = ActiveGuard::new(self.active.clone());
        let cycle = self.cycle.clone();
        let period = self.interval;
        *task = Some(tokio::spawn(async move {
            let _guard = guard;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let _ = cycle.publish().await;
            }
        }));

        info!(self.logger, "Workflow scanner started"; "interval_ms" => period.as_millis() as u64);
    }

    /// Cancel the scan task, if any, and wait for it to exit.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        if let Some(previous) = task.take() {
            previous.abort();
            let _ = previous.await;
            info!(self.logger, "Workflow scanner stopped");
        }
    }

    /// True while a scan task is installed.
    pub async fn is_active(&self) -> bool {
        self.task.lock().await.is_some()
    }

    /// Number of scan tasks currently alive in the process.
    pub fn active_tasks(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Run one cycle immediately and publish the result.
    pub async fn scan_once(&self) -> Result<(WorkflowCounts, ShardCounts)> {
        self.cycle.publish().await
    }
}
