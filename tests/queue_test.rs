use hivestore::rpc::{QueueCommitRequest, QueueFetchRequest, QueueRecord, QueueScanRequest};
use hivestore::{
    default_registry, KeyValue, MemoryStore, NoopMetrics, QueueConfig, QueueError, QueueEvent,
    ShardGroup, Storage, StorageConfig, StorageError, TenantMetadata, TenantQueue, UserEvent,
};
use slog::{Drain, Logger};
use std::sync::Arc;
use std::time::Duration;

const TENANT: u64 = 42;

fn create_logger() -> Logger {
    let decorator = slog_term::PlainDecorator::new(std::io::stdout());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, slog::o!())
}

fn event(user_id: u64, seq: u64) -> UserEvent {
    UserEvent {
        tenant_id: TENANT,
        user_id,
        data: vec![KeyValue {
            key: "seq".to_string(),
            value: seq.to_string(),
        }],
    }
}

async fn setup(partitions: u32) -> (Arc<MemoryStore>, Arc<Storage>, Arc<TenantQueue>) {
    let logger = create_logger();
    let registry = Arc::new(default_registry());
    let store = Arc::new(MemoryStore::new(1, registry.clone(), logger.clone()));
    store.campaign();

    let storage = Storage::new(
        store.clone(),
        registry,
        StorageConfig::default(),
        Arc::new(NoopMetrics),
        logger.clone(),
    );
    storage
        .init_tenant(&TenantMetadata {
            id: TENANT,
            input_partitions: partitions,
        })
        .await
        .expect("Should initialize tenant");

    let queue = Arc::new(TenantQueue::new(TENANT, storage.clone(), QueueConfig::default(), logger));
    (store, storage, queue)
}

async fn partition_records(storage: &Storage, partition: u32) -> Vec<QueueRecord> {
    storage
        .scan_queue(
            QueueScanRequest {
                id: TENANT,
                partition,
                key: None,
                from: 1,
                limit: 0,
            },
            ShardGroup::TenantInput,
        )
        .await
        .expect("Should scan partition")
}

fn decode_event(record: &QueueRecord) -> UserEvent {
    match serde_json::from_slice(&record.data).expect("Should decode queue event") {
        QueueEvent::User(event) => event,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_events_land_in_user_partition_in_order() {
    let (_store, storage, queue) = setup(3).await;
    queue.start().await.expect("Queue should start");

    let mut completions = Vec::new();
    for seq in 0..5 {
        for user_id in 0..6 {
            completions.push(queue.add(event(user_id, seq)).await.expect("Should enqueue"));
        }
    }
    for completion in completions {
        completion.await.expect("Worker should report").expect("Batch should commit");
    }

    let mut total = 0;
    for partition in 0..3u32 {
        let events: Vec<UserEvent> = partition_records(&storage, partition)
            .await
            .iter()
            .map(decode_event)
            .collect();
        total += events.len();

        for user_id in 0..6u64 {
            let seqs: Vec<String> = events
                .iter()
                .filter(|e| e.user_id == user_id)
                .map(|e| e.data[0].value.clone())
                .collect();
            if user_id % 3 == partition as u64 {
                assert_eq!(seqs, vec!["0", "1", "2", "3", "4"], "user {} out of order", user_id);
            } else {
                assert!(seqs.is_empty(), "user {} leaked into partition {}", user_id, partition);
            }
        }
    }
    assert_eq!(total, 30);

    queue.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_start_spawns_one_worker_set() {
    let (_store, _storage, queue) = setup(4).await;

    let (a, b) = tokio::join!(queue.start(), queue.start());
    assert_eq!(a, Ok(()));
    assert_eq!(b, Ok(()));
    assert_eq!(queue.worker_count().await, 4);
    assert_eq!(queue.partition_count(), Some(4));

    // Adding right after start never trips over missing partitions
    queue.add_and_wait(event(9, 0)).await.expect("Should commit");

    queue.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_drains_pending_events() {
    let (_store, storage, queue) = setup(2).await;
    queue.start().await.expect("Queue should start");

    let mut completions = Vec::new();
    for seq in 0..200 {
        completions.push(queue.add(event(seq % 2, seq)).await.expect("Should enqueue"));
    }
    queue.stop().await;

    for completion in completions {
        assert_eq!(completion.await.expect("Worker should report"), Ok(()));
    }
    let committed = partition_records(&storage, 0).await.len() + partition_records(&storage, 1).await.len();
    assert_eq!(committed, 200);

    assert_eq!(queue.add(event(1, 999)).await.err(), Some(QueueError::Stopped));
    assert_eq!(queue.worker_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batch_failure_reaches_every_caller() {
    let (store, storage, queue) = setup(1).await;
    queue.start().await.expect("Queue should start");
    store.fail_writes(Some("replica offline".to_string()));

    let mut completions = Vec::new();
    for seq in 0..10 {
        completions.push(queue.add(event(1, seq)).await.expect("Should enqueue"));
    }
    for completion in completions {
        assert_eq!(
            completion.await.expect("Worker should report"),
            Err(QueueError::Storage(StorageError::Unavailable("replica offline".to_string())))
        );
    }
    assert!(partition_records(&storage, 0).await.is_empty());

    store.fail_writes(None);
    queue.add_and_wait(event(1, 10)).await.expect("Should commit after recovery");
    assert_eq!(partition_records(&storage, 0).await.len(), 1);

    queue.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_partition_consume_cycle() {
    let (_store, storage, queue) = setup(2).await;
    queue.start().await.expect("Queue should start");

    queue.add_and_wait(event(1, 0)).await.expect("Should commit user 1");
    queue.add_and_wait(event(2, 0)).await.expect("Should commit user 2");

    let p0 = partition_records(&storage, 0).await;
    let p1 = partition_records(&storage, 1).await;
    assert_eq!(p0.len(), 1);
    assert_eq!(p1.len(), 1);
    assert_eq!(decode_event(&p0[0]).user_id, 2);
    assert_eq!(decode_event(&p1[0]).user_id, 1);

    for partition in 0..2u32 {
        let fetch = |completed_offset| QueueFetchRequest {
            id: TENANT,
            partition,
            key: None,
            group: "runners".to_string(),
            count: 10,
            completed_offset,
        };

        let fetched = storage
            .fetch_queue(fetch(0), ShardGroup::TenantInput)
            .await
            .expect("Should fetch");
        assert_eq!(fetched.records.len(), 1);

        let committed = storage
            .commit_queue(
                QueueCommitRequest {
                    id: TENANT,
                    partition,
                    key: None,
                    group: "runners".to_string(),
                    offset: fetched.records[0].offset,
                },
                ShardGroup::TenantInput,
            )
            .await
            .expect("Should commit");
        assert_eq!(committed, fetched.records[0].offset);

        let after = storage
            .fetch_queue(fetch(0), ShardGroup::TenantInput)
            .await
            .expect("Should fetch");
        assert!(after.records.is_empty());
    }

    queue.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_backpressure_blocks_until_drained() {
    let logger = create_logger();
    let registry = Arc::new(default_registry());
    let store = Arc::new(MemoryStore::new(1, registry.clone(), logger.clone()));
    store.campaign();
    let storage = Storage::new(store, registry, StorageConfig::default(), Arc::new(NoopMetrics), logger.clone());
    storage
        .init_tenant(&TenantMetadata {
            id: TENANT,
            input_partitions: 1,
        })
        .await
        .expect("Should initialize tenant");

    let config = QueueConfig::default().with_partition_capacity(2).with_batch_size(1);
    let queue = TenantQueue::new(TENANT, storage.clone(), config, logger);
    queue.start().await.expect("Queue should start");

    let adds = async {
        for seq in 0..20 {
            queue.add(event(0, seq)).await.expect("Should enqueue");
        }
    };
    tokio::time::timeout(Duration::from_secs(5), adds)
        .await
        .expect("Producers should make progress as the worker drains");

    queue.stop().await;
    assert_eq!(partition_records(&storage, 0).await.len(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_start_stop_settles_cleanly() {
    let (_store, storage, queue) = setup(3).await;

    let mut tasks = Vec::new();
    for i in 0..4 {
        let queue = queue.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..50 {
                if i % 2 == 0 {
                    let _ = queue.start().await;
                } else {
                    queue.stop().await;
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    tokio::time::timeout(Duration::from_secs(10), async {
        for task in tasks {
            task.await.expect("Lifecycle task should not panic");
        }
    })
    .await
    .expect("Concurrent start and stop should not hang");

    queue.stop().await;
    assert!(!queue.is_running());
    assert_eq!(queue.worker_count().await, 0);
    assert_eq!(queue.add(event(1, 0)).await.err(), Some(QueueError::Stopped));

    // Every generation was closed, so a fresh start owns exactly its own workers
    queue.start().await.expect("Queue should restart");
    assert_eq!(queue.worker_count().await, 3);
    queue.add_and_wait(event(1, 1)).await.expect("Should commit after restart");
    queue.stop().await;
    assert_eq!(partition_records(&storage, 1).await.len(), 1);
}
