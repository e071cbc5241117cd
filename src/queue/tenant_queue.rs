//! Partitioned Tenant Queue
//!
//! Buffers a tenant's inbound events in N partitions, N read from the tenant
//! metadata when the queue starts. Each partition is a bounded channel
//! drained by exactly one worker, which commits up to `batch_size` events
//! per replicated write and hands the shared outcome to every caller in the
//! batch.
//!
//! Lifecycle is `stopped -> starting -> running -> stopped`, switched with
//! compare-and-swap so concurrent `start`/`stop` calls are idempotent. Each
//! state switch and the readiness value it publishes happen under one
//! lifecycle lock, so no caller observes one without the other.
//! Callers of [`TenantQueue::add`] that arrive before the queue is running
//! wait on a readiness signal instead of failing.

use crate::config::QueueConfig;
use crate::meta::{QueueEvent, UserEvent};
use crate::queue::QueueError;
use crate::storage::{Storage, StorageError};
use crate::store::ShardGroup;
use slog::{debug, error, info, warn, Logger};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

const STOPPED: u8 = 0;
const STARTING: u8 = 1;
const RUNNING: u8 = 2;

/// Completion handle returned by [`TenantQueue::add`].
pub type Completion = oneshot::Receiver<Result<(), QueueError>>;

struct PendingEvent {
    event: UserEvent,
    done: oneshot::Sender<Result<(), QueueError>>,
}

/// Message on a partition channel. `Close` tells the worker to commit what
/// it already holds and exit.
enum PartitionMessage {
    Event(PendingEvent),
    Close,
}

struct Partitions {
    senders: Vec<mpsc::Sender<PartitionMessage>>,
}

#[derive(Clone)]
enum Readiness {
    /// Not started yet, or a start is in progress
    Pending,
    Ready(Arc<Partitions>),
    Stopped,
    Failed(String),
}

pub struct TenantQueue {
    tenant_id: u64,
    storage: Arc<Storage>,
    config: QueueConfig,
    state: AtomicU8,
    readiness: watch::Sender<Readiness>,
    /// Held across every state switch together with its readiness update
    lifecycle: Mutex<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    logger: Logger,
}

impl TenantQueue {
    /// Create a stopped queue. Zero buffer or batch sizes are raised to 1.
    pub fn new(tenant_id: u64, storage: Arc<Storage>, config: QueueConfig, logger: Logger) -> Self {
        let (readiness, _) = watch::channel(Readiness::Pending);
        let config = QueueConfig {
            partition_capacity: config.partition_capacity.max(1),
            batch_size: config.batch_size.max(1),
            ..config
        };
        Self {
            tenant_id,
            storage,
            config,
            state: AtomicU8::new(STOPPED),
            readiness,
            lifecycle: Mutex::new(()),
            workers: Mutex::new(Vec::new()),
            logger: logger.new(slog::o!("tenant_id" => tenant_id)),
        }
    }

    pub fn tenant_id(&self) -> u64 {
        self.tenant_id
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// Number of partitions, once the queue is running.
    pub fn partition_count(&self) -> Option<u32> {
        match &*self.readiness.borrow() {
            Readiness::Ready(partitions) => Some(partitions.senders.len() as u32),
            _ => None,
        }
    }

    /// Number of partition workers currently owned by the queue.
    pub async fn worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }

    /// Start the queue.
    ///
    /// Reads the partition count from the tenant metadata and spawns one
    /// worker per partition. Calling `start` on a queue that is starting or
    /// running waits for that start to finish and reports its outcome.
    pub async fn start(&self) -> Result<(), QueueError> {
        let lifecycle = self.lifecycle.lock().await;
        if self
            .state
            .compare_exchange(STOPPED, STARTING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            drop(lifecycle);
            return self.wait_ready().await.map(|_| ());
        }
        self.readiness.send_replace(Readiness::Pending);
        drop(lifecycle);

        let metadata = match self.storage.tenant_metadata(self.tenant_id).await {
            Ok(metadata) => metadata,
            Err(e) => {
                error!(self.logger, "Failed to start tenant queue"; "error" => %e);
                let _lifecycle = self.lifecycle.lock().await;
                self.state.store(STOPPED, Ordering::Release);
                self.readiness.send_replace(Readiness::Failed(e.to_string()));
                return Err(QueueError::NotStarted(e.to_string()));
            }
        };

        let mut workers = self.workers.lock().await;
        let mut senders = Vec::with_capacity(metadata.input_partitions as usize);
        for partition in 0..metadata.input_partitions {
            let (tx, rx) = mpsc::channel(self.config.partition_capacity);
            let worker = PartitionWorker {
                tenant_id: self.tenant_id,
                partition,
                storage: self.storage.clone(),
                group: self.config.group,
                batch_size: self.config.batch_size,
                logger: self.logger.new(slog::o!("partition" => partition)),
            };
            senders.push(tx);
            workers.push(tokio::spawn(worker.run(rx)));
        }
        drop(workers);

        {
            let _lifecycle = self.lifecycle.lock().await;
            self.readiness
                .send_replace(Readiness::Ready(Arc::new(Partitions { senders })));
            self.state.store(RUNNING, Ordering::Release);
        }

        info!(self.logger, "Tenant queue started"; "partitions" => metadata.input_partitions);
        Ok(())
    }

    /// Stop the queue.
    ///
    /// Every event enqueued before the stop is committed before this returns;
    /// events that arrive afterwards fail with [`QueueError::Stopped`] or
    /// [`QueueError::Closed`]. A start in progress is allowed to finish first.
    pub async fn stop(&self) {
        // The partitions and workers of the generation being stopped are
        // taken together with the state switch; a start racing in after
        // the lock is released builds a fresh generation.
        let (previous, workers) = loop {
            let lifecycle = self.lifecycle.lock().await;
            match self
                .state
                .compare_exchange(RUNNING, STOPPED, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    let previous = self.readiness.send_replace(Readiness::Stopped);
                    let workers = std::mem::take(&mut *self.workers.lock().await);
                    break (previous, workers);
                }
                Err(STARTING) => {
                    drop(lifecycle);
                    let _ = self.wait_ready().await;
                    tokio::task::yield_now().await;
                }
                Err(_) => return,
            }
        };

        if let Readiness::Ready(partitions) = previous {
            for sender in &partitions.senders {
                let _ = sender.send(PartitionMessage::Close).await;
            }
        }

        for worker in workers {
            if let Err(e) = worker.await {
                warn!(self.logger, "Partition worker ended abnormally"; "error" => %e);
            }
        }
        info!(self.logger, "Tenant queue stopped");
    }

    /// Enqueue `event` on partition `user_id % partitions`.
    ///
    /// Waits for the queue to become ready, then for room in the partition
    /// buffer. The returned receiver resolves once the batch holding the
    /// event has been committed or has failed.
    pub async fn add(&self, event: UserEvent) -> Result<Completion, QueueError> {
        let partitions = self.wait_ready().await?;
        let index = (event.user_id % partitions.senders.len() as u64) as usize;

        let (done, completion) = oneshot::channel();
        partitions.senders[index]
            .send(PartitionMessage::Event(PendingEvent { event, done }))
            .await
            .map_err(|_| QueueError::Closed)?;
        Ok(completion)
    }

    /// [`TenantQueue::add`] and wait for the commit.
    pub async fn add_and_wait(&self, event: UserEvent) -> Result<(), QueueError> {
        let completion = self.add(event).await?;
        completion.await.map_err(|_| QueueError::Closed)?
    }

    async fn wait_ready(&self) -> Result<Arc<Partitions>, QueueError> {
        let mut rx = self.readiness.subscribe();
        // A stale Stopped/Failed value is ignored while a new start is underway.
        let readiness = rx
            .wait_for(|readiness| match readiness {
                Readiness::Ready(_) => true,
                Readiness::Pending => false,
                Readiness::Stopped | Readiness::Failed(_) => self.state.load(Ordering::Acquire) == STOPPED,
            })
            .await
            .map_err(|_| QueueError::Closed)?
            .clone();

        match readiness {
            Readiness::Ready(partitions) => Ok(partitions),
            Readiness::Failed(reason) => Err(QueueError::NotStarted(reason)),
            Readiness::Stopped | Readiness::Pending => Err(QueueError::Stopped),
        }
    }
}

struct PartitionWorker {
    tenant_id: u64,
    partition: u32,
    storage: Arc<Storage>,
    group: ShardGroup,
    batch_size: usize,
    logger: Logger,
}

impl PartitionWorker {
    async fn run(self, mut rx: mpsc::Receiver<PartitionMessage>) {
        let mut buffer = Vec::with_capacity(self.batch_size);
        loop {
            if rx.recv_many(&mut buffer, self.batch_size).await == 0 {
                break;
            }

            let mut closing = false;
            let mut batch = Vec::with_capacity(buffer.len());
            for message in buffer.drain(..) {
                match message {
                    PartitionMessage::Event(pending) if !closing => batch.push(pending),
                    PartitionMessage::Event(pending) => {
                        let _ = pending.done.send(Err(QueueError::Closed));
                    }
                    PartitionMessage::Close => closing = true,
                }
            }

            self.commit(batch).await;
            if closing {
                break;
            }
        }

        rx.close();
        while let Ok(message) = rx.try_recv() {
            if let PartitionMessage::Event(pending) = message {
                let _ = pending.done.send(Err(QueueError::Closed));
            }
        }
        debug!(self.logger, "Partition worker exited");
    }

    /// Commit `batch` in one replicated write and report the outcome to
    /// every caller in it.
    async fn commit(&self, batch: Vec<PendingEvent>) {
        if batch.is_empty() {
            return;
        }

        let size = batch.len();
        let (events, waiters): (Vec<_>, Vec<_>) = batch.into_iter().map(|p| (p.event, p.done)).unzip();
        let items: Result<Vec<Vec<u8>>, StorageError> = events
            .into_iter()
            .map(|event| serde_json::to_vec(&QueueEvent::User(event)).map_err(StorageError::from))
            .collect();

        let outcome = match items {
            Ok(items) => self
                .storage
                .put_to_queue(self.tenant_id, self.partition, self.group, items)
                .await
                .map(|_| ())
                .map_err(QueueError::from),
            Err(e) => Err(QueueError::from(e)),
        };

        match &outcome {
            Ok(()) => debug!(self.logger, "Committed batch"; "events" => size),
            Err(e) => error!(self.logger, "Failed to commit batch"; "events" => size, "error" => %e),
        }

        for done in waiters {
            let _ = done.send(outcome.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::meta::TenantMetadata;
    use crate::metrics::NoopMetrics;
    use crate::storage::default_registry;
    use crate::store::MemoryStore;

    fn create_logger() -> Logger {
        use slog::Drain;
        let decorator = slog_term::PlainDecorator::new(std::io::stdout());
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        Logger::root(drain, slog::o!())
    }

    fn event(user_id: u64, tag: &str) -> UserEvent {
        UserEvent {
            tenant_id: 1,
            user_id,
            data: vec![crate::meta::KeyValue {
                key: "tag".to_string(),
                value: tag.to_string(),
            }],
        }
    }

    async fn setup(partitions: u32) -> (Arc<MemoryStore>, Arc<Storage>) {
        let logger = create_logger();
        let registry = Arc::new(default_registry());
        let store = Arc::new(MemoryStore::new(1, registry.clone(), logger.clone()));
        store.campaign();
        let storage = Storage::new(
            store.clone(),
            registry,
            StorageConfig::default(),
            Arc::new(NoopMetrics),
            logger,
        );
        if partitions > 0 {
            storage
                .init_tenant(&TenantMetadata {
                    id: 1,
                    input_partitions: partitions,
                })
                .await
                .unwrap();
        }
        (store, storage)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_without_metadata_fails_and_reverts() {
        let (_store, storage) = setup(0).await;
        let queue = TenantQueue::new(1, storage, QueueConfig::default(), create_logger());

        assert!(matches!(queue.start().await, Err(QueueError::NotStarted(_))));
        assert!(!queue.is_running());
        assert!(matches!(queue.add(event(1, "a")).await, Err(QueueError::NotStarted(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_add_before_start_waits_for_readiness() {
        let (_store, storage) = setup(2).await;
        let queue = Arc::new(TenantQueue::new(1, storage, QueueConfig::default(), create_logger()));

        let adder = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.add_and_wait(event(3, "early")).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!adder.is_finished());

        queue.start().await.unwrap();
        assert_eq!(adder.await.unwrap(), Ok(()));
        queue.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_add_after_stop_is_refused() {
        let (_store, storage) = setup(1).await;
        let queue = TenantQueue::new(1, storage, QueueConfig::default(), create_logger());

        queue.start().await.unwrap();
        queue.stop().await;
        queue.stop().await;

        assert!(matches!(queue.add(event(1, "late")).await, Err(QueueError::Stopped)));
        assert_eq!(queue.worker_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_zero_sizes_are_raised_to_one() {
        let (_store, storage) = setup(1).await;
        let config = QueueConfig {
            partition_capacity: 0,
            batch_size: 0,
            ..QueueConfig::default()
        };
        let queue = TenantQueue::new(1, storage, config, create_logger());

        queue.start().await.unwrap();
        queue.add_and_wait(event(1, "a")).await.unwrap();
        queue.add_and_wait(event(1, "b")).await.unwrap();
        queue.stop().await;
        assert_eq!(queue.worker_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queue_can_restart() {
        let (_store, storage) = setup(2).await;
        let queue = TenantQueue::new(1, storage, QueueConfig::default(), create_logger());

        queue.start().await.unwrap();
        queue.stop().await;
        queue.start().await.unwrap();

        assert_eq!(queue.partition_count(), Some(2));
        queue.add_and_wait(event(1, "again")).await.unwrap();
        queue.stop().await;
    }
}
