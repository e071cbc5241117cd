//! Storage facade
//!
//! Public entry points for command execution on top of the replicated store:
//! typed KV, lifecycle and queue operations, raw synchronous and
//! callback-style execution, and leadership intake that drives the
//! lifecycle scanner.

use crate::config::StorageConfig;
use crate::keys;
use crate::meta::{TenantMetadata, WorkflowInstance, WorkflowInstanceState};
use crate::metrics::{Metrics, ShardCounts, WorkflowCounts};
use crate::rpc::*;
use crate::storage::dispatch::Dispatcher;
use crate::storage::errors::{Result, StorageError};
use crate::storage::registry::CommandRegistry;
use crate::storage::scanner::WorkflowScanner;
use crate::storage::StorageEvent;
use crate::store::{ReplicatedStore, RoleChange, ShardGroup};
use serde::de::DeserializeOwned;
use slog::{debug, info, warn, Logger};
use std::ops::RangeInclusive;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub struct Storage {
    dispatcher: Dispatcher,

    /// Lifecycle scanner, active only while leader
    scanner: WorkflowScanner,

    /// Background task following role changes
    role_watcher: Mutex<Option<JoinHandle<()>>>,

    logger: Logger,
}

impl Storage {
    pub fn new(
        store: Arc<dyn ReplicatedStore>,
        registry: Arc<CommandRegistry>,
        config: StorageConfig,
        metrics: Arc<dyn Metrics>,
        logger: Logger,
    ) -> Arc<Self> {
        let dispatcher = Dispatcher::new(store, registry, config.rpc_timeout);
        let scanner = WorkflowScanner::new(
            dispatcher.clone(),
            metrics,
            config.scan_interval,
            config.scan_page_limit,
            logger.clone(),
        );

        Arc::new(Self {
            dispatcher,
            scanner,
            role_watcher: Mutex::new(None),
            logger,
        })
    }

    /// Begin following leadership changes.
    ///
    /// If this replica already leads, the scanner starts before this returns.
    pub async fn start(self: &Arc<Self>) {
        let mut watcher = self.role_watcher.lock().await;
        if watcher.is_some() {
            return;
        }

        // Subscribe before sampling the role so no transition slips between.
        let role_rx = self.dispatcher.store().subscribe_role_changes();
        if self.dispatcher.store().is_leader() {
            self.became_leader().await;
        }

        *watcher = Some(tokio::spawn(Self::run_role_watcher(Arc::downgrade(self), role_rx)));
        info!(self.logger, "Storage started");
    }

    async fn run_role_watcher(storage: Weak<Self>, mut role_rx: broadcast::Receiver<RoleChange>) {
        loop {
            let change = role_rx.recv().await;
            let Some(storage) = storage.upgrade() else {
                break;
            };

            match change {
                Ok(RoleChange::BecameLeader) => storage.became_leader().await,
                Ok(RoleChange::BecameFollower) => storage.became_follower().await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(storage.logger, "Missed role changes, resyncing"; "skipped" => skipped);
                    if storage.dispatcher.store().is_leader() {
                        storage.became_leader().await;
                    } else {
                        storage.became_follower().await;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Stop following role changes and cancel the scanner.
    pub async fn close(&self) {
        if let Some(watcher) = self.role_watcher.lock().await.take() {
            watcher.abort();
            let _ = watcher.await;
        }
        self.scanner.stop().await;
        info!(self.logger, "Storage closed");
    }

    /// Leadership acquired: (re)start the lifecycle scanner.
    pub async fn became_leader(&self) {
        info!(self.logger, "Became leader, starting workflow scanner");
        self.scanner.start().await;
    }

    /// Leadership lost: stop the lifecycle scanner.
    pub async fn became_follower(&self) {
        info!(self.logger, "Became follower, stopping workflow scanner");
        self.scanner.stop().await;
    }

    pub fn is_leader(&self) -> bool {
        self.dispatcher.store().is_leader()
    }

    pub fn scanner(&self) -> &WorkflowScanner {
        &self.scanner
    }

    /// Run one lifecycle scan now instead of waiting for the next tick.
    pub async fn refresh_metrics(&self) -> Result<(WorkflowCounts, ShardCounts)> {
        self.scanner.scan_once().await
    }

    pub fn watch_events(&self) -> broadcast::Receiver<StorageEvent> {
        self.dispatcher.store().subscribe_events()
    }

    // ---------------------------------------------------------------
    // Raw command execution
    // ---------------------------------------------------------------

    async fn exec_raw(&self, request: &Request, group: ShardGroup) -> Result<Vec<u8>> {
        let result = self.dispatcher.exec(request, group).await;
        match &result {
            Err(e @ (StorageError::Rejected(_)
            | StorageError::InvalidCommit { .. }
            | StorageError::OffsetOutOfRange { .. })) => {
                warn!(self.logger, "Command rejected"; "type" => ?request.message_type(), "error" => %e);
            }
            Err(e) => {
                debug!(self.logger, "Command failed"; "type" => ?request.message_type(), "error" => %e);
            }
            Ok(_) => {}
        }
        result
    }

    async fn exec_typed<T: DeserializeOwned>(&self, request: Request, group: ShardGroup) -> Result<T> {
        let body = self.exec_raw(&request, group).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Execute `request` in the default routing group.
    pub async fn exec_command(&self, request: Request) -> Result<Response> {
        self.exec_command_with_group(request, ShardGroup::Default).await
    }

    /// Execute `request` in `group`.
    pub async fn exec_command_with_group(&self, request: Request, group: ShardGroup) -> Result<Response> {
        let body = self.exec_raw(&request, group).await?;
        Ok(Response::decode(request.message_type(), &body)?)
    }

    /// Execute `request` in the background and hand the outcome to `callback`.
    pub fn async_exec_command<F>(self: &Arc<Self>, request: Request, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<Response>) + Send + 'static,
    {
        self.async_exec_command_with_group(request, ShardGroup::Default, callback)
    }

    pub fn async_exec_command_with_group<F>(
        self: &Arc<Self>,
        request: Request,
        group: ShardGroup,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<Response>) + Send + 'static,
    {
        let storage = self.clone();
        tokio::spawn(async move {
            callback(storage.exec_command_with_group(request, group).await);
        })
    }

    // ---------------------------------------------------------------
    // Key/value
    // ---------------------------------------------------------------

    pub async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.set_with_ttl(key, value, Duration::ZERO).await
    }

    /// Set `key` with an expiry. A zero `ttl` never expires; sub-second
    /// values round up to one second.
    pub async fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut ttl_secs = ttl.as_secs();
        if ttl_secs == 0 && !ttl.is_zero() {
            ttl_secs = 1;
        }
        let request = Request::Set(SetRequest {
            key,
            value,
            ttl: ttl_secs,
        });
        self.exec_raw(&request, ShardGroup::Default).await?;
        Ok(())
    }

    pub async fn get(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
        let resp: BytesResponse = self
            .exec_typed(Request::Get(GetRequest { key }), ShardGroup::Default)
            .await?;
        Ok(resp.value)
    }

    pub async fn delete(&self, key: Vec<u8>) -> Result<()> {
        self.exec_raw(&Request::Delete(DeleteRequest { key }), ShardGroup::Default)
            .await?;
        Ok(())
    }

    /// Values in `[start, end)`, at most `limit`, each with its first `skip`
    /// bytes removed.
    pub async fn scan(&self, start: &[u8], end: &[u8], limit: u64, skip: u32) -> Result<Vec<Vec<u8>>> {
        self.dispatcher.scan(start, end, limit, skip).await
    }

    /// Reserve `batch` consecutive ids from the counter at `key`.
    pub async fn alloc_id(&self, key: Vec<u8>, batch: u64) -> Result<RangeInclusive<u64>> {
        let resp: IdRangeResponse = self
            .exec_typed(Request::AllocId(AllocIdRequest { key, batch }), ShardGroup::Default)
            .await?;
        Ok(resp.from..=resp.to)
    }

    pub async fn reset_id(&self, key: Vec<u8>, start_with: u64) -> Result<()> {
        self.exec_raw(&Request::ResetId(ResetIdRequest { key, start_with }), ShardGroup::Default)
            .await?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Tenants
    // ---------------------------------------------------------------

    pub async fn init_tenant(&self, metadata: &TenantMetadata) -> Result<()> {
        let value = serde_json::to_vec(metadata)?;
        self.set(keys::tenant_metadata_key(metadata.id), value).await?;
        info!(self.logger, "Tenant initialized";
            "tenant_id" => metadata.id,
            "input_partitions" => metadata.input_partitions
        );
        Ok(())
    }

    /// Metadata of `tenant_id`. Missing metadata or zero partitions means
    /// the tenant was never initialized.
    pub async fn tenant_metadata(&self, tenant_id: u64) -> Result<TenantMetadata> {
        let raw = self
            .get(keys::tenant_metadata_key(tenant_id))
            .await?
            .ok_or(StorageError::TenantNotInitialized(tenant_id))?;
        let metadata: TenantMetadata = serde_json::from_slice(&raw)?;
        if metadata.input_partitions == 0 {
            return Err(StorageError::TenantNotInitialized(tenant_id));
        }
        Ok(metadata)
    }

    // ---------------------------------------------------------------
    // Workflow lifecycle
    // ---------------------------------------------------------------

    pub async fn starting_instance(&self, instance: WorkflowInstance) -> Result<()> {
        self.exec_raw(
            &Request::StartingInstance(StartingInstanceRequest { instance }),
            ShardGroup::Default,
        )
        .await?;
        Ok(())
    }

    pub async fn started_instance(&self, workflow_id: u64) -> Result<()> {
        self.exec_raw(
            &Request::StartedInstance(StartedInstanceRequest { workflow_id }),
            ShardGroup::Default,
        )
        .await?;
        Ok(())
    }

    pub async fn stopping_instance(&self, workflow_id: u64) -> Result<()> {
        self.exec_raw(
            &Request::StoppingInstance(StoppingInstanceRequest { workflow_id }),
            ShardGroup::Default,
        )
        .await?;
        Ok(())
    }

    pub async fn stopped_instance(&self, workflow_id: u64) -> Result<()> {
        self.exec_raw(
            &Request::StoppedInstance(StoppedInstanceRequest { workflow_id }),
            ShardGroup::Default,
        )
        .await?;
        Ok(())
    }

    pub async fn create_instance_state(&self, state: WorkflowInstanceState) -> Result<()> {
        self.exec_raw(
            &Request::CreateInstanceStateShard(CreateInstanceStateShardRequest { state }),
            ShardGroup::Default,
        )
        .await?;
        Ok(())
    }

    pub async fn update_instance_state(&self, state: WorkflowInstanceState) -> Result<()> {
        self.exec_raw(
            &Request::UpdateInstanceStateShard(UpdateInstanceStateShardRequest { state }),
            ShardGroup::Default,
        )
        .await?;
        Ok(())
    }

    pub async fn remove_instance_state(&self, workflow_id: u64, index: u32) -> Result<()> {
        self.exec_raw(
            &Request::RemoveInstanceStateShard(RemoveInstanceStateShardRequest { workflow_id, index }),
            ShardGroup::Default,
        )
        .await?;
        Ok(())
    }

    /// Move a shard to `state.state` on behalf of `state.runner`, which must
    /// still own it.
    pub async fn step_instance_state(&self, state: WorkflowInstanceState) -> Result<()> {
        self.exec_raw(
            &Request::StepInstanceStateShard(StepInstanceStateShardRequest { state }),
            ShardGroup::Default,
        )
        .await?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Bitmaps
    // ---------------------------------------------------------------

    pub async fn bm_create(&self, key: Vec<u8>, values: Vec<u32>) -> Result<()> {
        self.exec_raw(&Request::BmCreate(BmCreateRequest { key, values }), ShardGroup::Default)
            .await?;
        Ok(())
    }

    pub async fn bm_add(&self, key: Vec<u8>, values: Vec<u32>) -> Result<()> {
        self.exec_raw(&Request::BmAdd(BmAddRequest { key, values }), ShardGroup::Default)
            .await?;
        Ok(())
    }

    pub async fn bm_remove(&self, key: Vec<u8>, values: Vec<u32>) -> Result<()> {
        self.exec_raw(&Request::BmRemove(BmRemoveRequest { key, values }), ShardGroup::Default)
            .await?;
        Ok(())
    }

    pub async fn bm_clear(&self, key: Vec<u8>) -> Result<()> {
        self.exec_raw(&Request::BmClear(BmClearRequest { key }), ShardGroup::Default)
            .await?;
        Ok(())
    }

    pub async fn bm_del(&self, key: Vec<u8>) -> Result<()> {
        self.exec_raw(&Request::BmDel(BmDelRequest { key }), ShardGroup::Default)
            .await?;
        Ok(())
    }

    /// True when every one of `values` is in the bitmap.
    pub async fn bm_contains(&self, key: Vec<u8>, values: Vec<u32>) -> Result<bool> {
        let resp: BmContainsResponse = self
            .exec_typed(Request::BmContains(BmContainsRequest { key, values }), ShardGroup::Default)
            .await?;
        Ok(resp.contains)
    }

    pub async fn bm_count(&self, key: Vec<u8>) -> Result<u64> {
        let resp: BmCountResponse = self
            .exec_typed(Request::BmCount(BmCountRequest { key }), ShardGroup::Default)
            .await?;
        Ok(resp.count)
    }

    /// Up to `limit` values at or above `start`; a zero limit returns all.
    pub async fn bm_range(&self, key: Vec<u8>, start: u32, limit: u64) -> Result<Vec<u32>> {
        let resp: BmRangeResponse = self
            .exec_typed(Request::BmRange(BmRangeRequest { key, start, limit }), ShardGroup::Default)
            .await?;
        Ok(resp.values)
    }

    // ---------------------------------------------------------------
    // Queues
    // ---------------------------------------------------------------

    /// Append `items` to partition `partition` of queue `id` in one
    /// replicated write. Returns the offset of the last appended record.
    pub async fn put_to_queue(
        &self,
        id: u64,
        partition: u32,
        group: ShardGroup,
        items: Vec<Vec<u8>>,
    ) -> Result<u64> {
        let count = items.len();
        let resp: QueueAddResponse = self
            .exec_typed(
                Request::QueueAdd(QueueAddRequest {
                    id,
                    partition,
                    key: None,
                    items,
                }),
                group,
            )
            .await?;
        debug!(self.logger, "Queue batch committed";
            "queue_id" => id,
            "partition" => partition,
            "records" => count,
            "last_offset" => resp.last_offset
        );
        Ok(resp.last_offset)
    }

    pub async fn fetch_queue(&self, request: QueueFetchRequest, group: ShardGroup) -> Result<QueueFetchResponse> {
        self.exec_typed(Request::QueueFetch(request), group).await
    }

    pub async fn commit_queue(&self, request: QueueCommitRequest, group: ShardGroup) -> Result<u64> {
        let resp: QueueCommitResponse = self.exec_typed(Request::QueueCommit(request), group).await?;
        Ok(resp.committed)
    }

    /// Trim a partition. Returns the new first retained offset.
    pub async fn delete_queue(&self, request: QueueDeleteRequest, group: ShardGroup) -> Result<u64> {
        let resp: QueueDeleteResponse = self.exec_typed(Request::QueueDelete(request), group).await?;
        Ok(resp.first_offset)
    }

    pub async fn join_queue_group(
        &self,
        request: QueueJoinGroupRequest,
        group: ShardGroup,
    ) -> Result<QueueJoinGroupResponse> {
        self.exec_typed(Request::QueueJoinGroup(request), group).await
    }

    pub async fn scan_queue(&self, request: QueueScanRequest, group: ShardGroup) -> Result<Vec<QueueRecord>> {
        let resp: QueueScanResponse = self.exec_typed(Request::QueueScan(request), group).await?;
        Ok(resp.records)
    }
}
