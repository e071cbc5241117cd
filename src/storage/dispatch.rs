use crate::rpc::{BytesSliceResponse, Request, ScanRequest};
use crate::storage::errors::{Result, StorageError};
use crate::storage::registry::CommandRegistry;
use crate::store::{ReplicatedStore, ShardGroup};
use std::sync::Arc;
use std::time::Duration;

/// Translates typed requests through the registry and executes them on the
/// replicated store under a deadline.
///
/// Cheap to clone; the facade and the scanner share one.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn ReplicatedStore>,
    registry: Arc<CommandRegistry>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn ReplicatedStore>, registry: Arc<CommandRegistry>, timeout: Duration) -> Self {
        Self {
            store,
            registry,
            timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn ReplicatedStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Execute `request` against `group` and return the raw response body.
    pub async fn exec(&self, request: &Request, group: ShardGroup) -> Result<Vec<u8>> {
        let envelope = self.registry.translate(request)?;
        match tokio::time::timeout(self.timeout, self.store.execute(envelope, group)).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout),
        }
    }

    /// Range scan over `[start, end)` in the default group.
    pub async fn scan(&self, start: &[u8], end: &[u8], limit: u64, skip: u32) -> Result<Vec<Vec<u8>>> {
        let request = Request::Scan(ScanRequest {
            start: start.to_vec(),
            end: end.to_vec(),
            limit,
            skip,
        });
        let body = self.exec(&request, ShardGroup::Default).await?;
        let resp: BytesSliceResponse = serde_json::from_slice(&body)?;
        Ok(resp.values)
    }
}
