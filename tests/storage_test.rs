use bytes::BytesMut;
use hivestore::rpc::{
    GetRequest, QueueAddRequest, QueueCommitRequest, QueueFetchRequest, QueueFetchResponse, SetRequest,
};
use hivestore::{
    default_registry, Counters, InstanceShardState, MemoryStore, MessageType, RegistryBuilder, Request,
    RequestCodec, Response, ResponseCodec, ShardGroup, Storage, StorageConfig, StorageError,
    WorkflowInstance, WorkflowInstanceState,
};
use slog::{Drain, Logger};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::codec::{Decoder, Encoder};

fn create_logger() -> Logger {
    let decorator = slog_term::PlainDecorator::new(std::io::stdout());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, slog::o!())
}

fn setup_with(config: StorageConfig) -> (Arc<MemoryStore>, Arc<Storage>, Arc<Counters>) {
    let logger = create_logger();
    let registry = Arc::new(default_registry());
    let store = Arc::new(MemoryStore::from_config(1, registry.clone(), &config, logger.clone()));
    let counters = Arc::new(Counters::new());
    let storage = Storage::new(store.clone(), registry, config, counters.clone(), logger);
    (store, storage, counters)
}

fn setup() -> (Arc<MemoryStore>, Arc<Storage>, Arc<Counters>) {
    setup_with(StorageConfig::default())
}

async fn fill_partition(storage: &Storage, count: usize) -> u64 {
    storage
        .put_to_queue(
            7,
            0,
            ShardGroup::TenantInput,
            (0..count).map(|i| format!("record-{}", i).into_bytes()).collect(),
        )
        .await
        .expect("Should append records")
}

fn fetch_request(count: u64) -> QueueFetchRequest {
    QueueFetchRequest {
        id: 7,
        partition: 0,
        key: None,
        group: "g".to_string(),
        count,
        completed_offset: 0,
    }
}

fn commit_request(offset: u64) -> QueueCommitRequest {
    QueueCommitRequest {
        id: 7,
        partition: 0,
        key: None,
        group: "g".to_string(),
        offset,
    }
}

#[tokio::test]
async fn test_commit_never_moves_cursor_backwards() {
    let (store, storage, _counters) = setup();
    store.campaign();
    assert_eq!(fill_partition(&storage, 5).await, 5);

    assert_eq!(storage.commit_queue(commit_request(3), ShardGroup::TenantInput).await, Ok(3));

    let rejected = storage.commit_queue(commit_request(2), ShardGroup::TenantInput).await;
    assert_eq!(
        rejected,
        Err(StorageError::InvalidCommit {
            group: "g".to_string(),
            requested: 2,
            current: 3,
        })
    );

    let fetched = storage
        .fetch_queue(fetch_request(10), ShardGroup::TenantInput)
        .await
        .expect("Should fetch");
    assert_eq!(fetched.committed, 3);
    assert_eq!(fetched.records.iter().map(|r| r.offset).collect::<Vec<_>>(), vec![4, 5]);

    assert_eq!(storage.commit_queue(commit_request(5), ShardGroup::TenantInput).await, Ok(5));
}

#[tokio::test]
async fn test_repeated_fetch_is_reproducible() {
    let (store, storage, _counters) = setup();
    store.campaign();
    fill_partition(&storage, 4).await;

    let first: QueueFetchResponse = storage
        .fetch_queue(fetch_request(3), ShardGroup::TenantInput)
        .await
        .expect("Should fetch");
    let second = storage
        .fetch_queue(fetch_request(3), ShardGroup::TenantInput)
        .await
        .expect("Should fetch");

    assert_eq!(first, second);
    assert_eq!(first.records.len(), 3);
    assert_eq!(first.records[0].data, b"record-0".to_vec());
}

#[test]
#[should_panic(expected = "already registered")]
fn test_duplicate_registration_aborts_at_startup() {
    let mut builder = RegistryBuilder::new();
    hivestore::storage::register_all(&mut builder);
    builder.register_write(MessageType::QueueAdd, "queue-add-v2", |_, _| Ok(Vec::new()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_leadership_flapping_keeps_one_scanner() {
    let (store, storage, _counters) = setup();
    storage.start().await;
    assert!(!storage.scanner().is_active().await);

    let watcher = {
        let storage = storage.clone();
        tokio::spawn(async move {
            let mut max_seen = 0;
            for _ in 0..500 {
                max_seen = max_seen.max(storage.scanner().active_tasks());
                tokio::task::yield_now().await;
            }
            max_seen
        })
    };

    for _ in 0..20 {
        store.campaign();
        store.step_down();
    }
    store.campaign();

    let max_seen = watcher.await.expect("Watcher should finish");
    assert!(max_seen <= 1, "saw {} scanner tasks at once", max_seen);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !storage.scanner().is_active().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Scanner should end up active on the leader");
    assert_eq!(storage.scanner().active_tasks(), 1);

    store.step_down();
    tokio::time::timeout(Duration::from_secs(5), async {
        while storage.scanner().is_active().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Scanner should stop on the follower");

    storage.close().await;
    assert_eq!(storage.scanner().active_tasks(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scanner_publishes_lifecycle_counts() {
    let config = StorageConfig::default()
        .with_scan_interval(Duration::from_millis(50))
        .with_scan_page_limit(2);
    let (store, storage, counters) = setup_with(config);
    store.campaign();

    for workflow_id in 1..=5u64 {
        storage
            .starting_instance(WorkflowInstance {
                workflow_id,
                tenant_id: 1,
                snapshot: vec![],
            })
            .await
            .expect("Should record starting");
    }
    storage.started_instance(1).await.expect("Should record started");
    storage.stopping_instance(2).await.expect("Should record stopping");
    storage.stopped_instance(3).await.expect("Should record stopped");

    for index in 0..3u32 {
        storage
            .create_instance_state(WorkflowInstanceState {
                workflow_id: 1,
                tenant_id: 1,
                runner: 1,
                index,
                state: InstanceShardState::Running,
            })
            .await
            .expect("Should create shard");
    }
    storage
        .update_instance_state(WorkflowInstanceState {
            workflow_id: 1,
            tenant_id: 1,
            runner: 1,
            index: 2,
            state: InstanceShardState::Stopped,
        })
        .await
        .expect("Should update shard");
    storage.remove_instance_state(1, 0).await.expect("Should remove shard");

    storage.start().await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while counters.workflow_publishes() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Scanner should publish");

    let workflows = counters.workflow_counts();
    assert_eq!(
        (workflows.starting, workflows.started, workflows.stopping, workflows.stopped),
        (2, 1, 1, 1)
    );
    let shards = counters.shard_counts();
    assert_eq!((shards.running, shards.stopped), (1, 1));

    storage.close().await;
}

#[tokio::test]
async fn test_scan_failure_is_counted_not_fatal() {
    let (store, storage, counters) = setup();
    store.campaign();

    // A lifecycle record with an unknown state byte
    storage
        .set(hivestore::keys::instance_key(1), vec![9, b'{'])
        .await
        .expect("Should write raw record");

    assert!(storage.refresh_metrics().await.is_err());
    assert_eq!(counters.storage_failed(), 1);
    assert_eq!(counters.workflow_publishes(), 0);

    storage.delete(hivestore::keys::instance_key(1)).await.expect("Should delete record");
    storage.refresh_metrics().await.expect("Next cycle should succeed");
    assert_eq!(counters.workflow_publishes(), 1);
}

#[tokio::test]
async fn test_request_served_through_wire_codec() {
    let (store, storage, _counters) = setup();
    store.campaign();

    let mut client = ResponseCodec::default();
    let mut server = RequestCodec::default();
    let mut wire = BytesMut::new();

    for request in [
        Request::Set(SetRequest {
            key: b"greeting".to_vec(),
            value: b"hello".to_vec(),
            ttl: 0,
        }),
        Request::Get(GetRequest {
            key: b"greeting".to_vec(),
        }),
        Request::QueueAdd(QueueAddRequest {
            id: 3,
            partition: 1,
            key: None,
            items: vec![b"a".to_vec(), b"b".to_vec()],
        }),
    ] {
        client.encode(request, &mut wire).expect("Should encode request");
    }

    let mut responses = BytesMut::new();
    while let Some(request) = server.decode(&mut wire).expect("Should decode request") {
        let response = storage.exec_command(request).await.expect("Should execute");
        server.encode(response, &mut responses).expect("Should encode response");
    }

    let mut decoded = Vec::new();
    while let Some(response) = client.decode(&mut responses).expect("Should decode response") {
        decoded.push(response);
    }

    assert_eq!(decoded.len(), 3);
    assert_eq!(decoded[0], Response::Set);
    match &decoded[1] {
        Response::Get(resp) => assert_eq!(resp.value, Some(b"hello".to_vec())),
        other => panic!("unexpected response {:?}", other),
    }
    match &decoded[2] {
        Response::QueueAdd(resp) => assert_eq!(resp.last_offset, 2),
        other => panic!("unexpected response {:?}", other),
    }
}

#[tokio::test]
async fn test_expired_keys_read_as_absent() {
    let (store, storage, _counters) = setup();
    store.campaign();

    storage
        .set_with_ttl(b"session".to_vec(), b"token".to_vec(), Duration::from_secs(1))
        .await
        .expect("Should set with ttl");
    assert_eq!(storage.get(b"session".to_vec()).await, Ok(Some(b"token".to_vec())));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(storage.get(b"session".to_vec()).await, Ok(None));
}

#[tokio::test]
async fn test_unbounded_ttl_is_stored_without_expiry() {
    let (store, storage, _counters) = setup();
    store.campaign();

    storage
        .set_with_ttl(b"pinned".to_vec(), b"v".to_vec(), Duration::from_secs(u64::MAX))
        .await
        .expect("Huge ttl should be accepted");
    assert_eq!(storage.get(b"pinned".to_vec()).await, Ok(Some(b"v".to_vec())));

    let resp = storage
        .exec_command(Request::Set(SetRequest {
            key: b"wire".to_vec(),
            value: b"w".to_vec(),
            ttl: u64::MAX,
        }))
        .await
        .expect("Huge wire ttl should be accepted");
    assert_eq!(resp, Response::Set);
    assert_eq!(storage.get(b"wire".to_vec()).await, Ok(Some(b"w".to_vec())));
}

#[tokio::test]
async fn test_bitmap_commands_through_facade() {
    let (store, storage, _counters) = setup();
    store.campaign();
    let key = b"active-users".to_vec();

    storage.bm_create(key.clone(), vec![3, 1, 2]).await.expect("Should create");
    storage.bm_add(key.clone(), vec![10, 2]).await.expect("Should add");
    storage.bm_remove(key.clone(), vec![1]).await.expect("Should remove");

    assert_eq!(storage.bm_count(key.clone()).await, Ok(3));
    assert_eq!(storage.bm_contains(key.clone(), vec![2, 10]).await, Ok(true));
    assert_eq!(storage.bm_contains(key.clone(), vec![1]).await, Ok(false));
    assert_eq!(storage.bm_range(key.clone(), 3, 1).await, Ok(vec![3]));

    storage.bm_clear(key.clone()).await.expect("Should clear");
    assert_eq!(storage.bm_count(key.clone()).await, Ok(0));

    storage.bm_del(key.clone()).await.expect("Should delete");
    assert_eq!(storage.get(key).await, Ok(None));

    store.step_down();
    assert_eq!(
        storage.bm_add(b"k".to_vec(), vec![1]).await,
        Err(StorageError::NotLeader { leader_id: None })
    );
    assert_eq!(storage.bm_count(b"k".to_vec()).await, Ok(0));
}

#[tokio::test]
async fn test_step_rejects_runner_that_lost_the_shard() {
    let (store, storage, _counters) = setup();
    store.campaign();

    let owned = WorkflowInstanceState {
        workflow_id: 9,
        tenant_id: 1,
        runner: 1,
        index: 0,
        state: InstanceShardState::Running,
    };
    storage.create_instance_state(owned.clone()).await.expect("Should create shard");

    let stale = WorkflowInstanceState {
        runner: 2,
        state: InstanceShardState::Stopped,
        ..owned.clone()
    };
    assert!(matches!(
        storage.step_instance_state(stale).await,
        Err(StorageError::Rejected(_))
    ));

    storage
        .step_instance_state(WorkflowInstanceState {
            state: InstanceShardState::Stopped,
            ..owned
        })
        .await
        .expect("Owner should step its shard");
    let shards = storage.refresh_metrics().await.expect("Should scan").1;
    assert_eq!((shards.running, shards.stopped), (0, 1));
}
