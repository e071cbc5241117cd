//! Typed requests and responses
//!
//! Every operation has one [`MessageType`] tag shared by the request and the
//! response direction. Bodies are serialized with serde_json; responses that
//! carry no data have an empty body.

use crate::keys;
use crate::meta::{WorkflowInstance, WorkflowInstanceState};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Closed set of operation tags. The discriminant is the wire tag byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MessageType {
    Set = 1,
    Get = 2,
    Delete = 3,
    Scan = 4,
    AllocId = 5,
    ResetId = 6,
    StartingInstance = 10,
    StartedInstance = 11,
    StoppingInstance = 12,
    StoppedInstance = 13,
    CreateInstanceStateShard = 20,
    UpdateInstanceStateShard = 21,
    RemoveInstanceStateShard = 22,
    StepInstanceStateShard = 23,
    QueueAdd = 30,
    QueueFetch = 31,
    QueueCommit = 32,
    QueueDelete = 33,
    QueueJoinGroup = 34,
    QueueScan = 35,
    BmCreate = 40,
    BmAdd = 41,
    BmRemove = 42,
    BmClear = 43,
    BmDel = 44,
    BmContains = 45,
    BmCount = 46,
    BmRange = 47,
}

impl MessageType {
    pub const ALL: [MessageType; 28] = [
        MessageType::Set,
        MessageType::Get,
        MessageType::Delete,
        MessageType::Scan,
        MessageType::AllocId,
        MessageType::ResetId,
        MessageType::StartingInstance,
        MessageType::StartedInstance,
        MessageType::StoppingInstance,
        MessageType::StoppedInstance,
        MessageType::CreateInstanceStateShard,
        MessageType::UpdateInstanceStateShard,
        MessageType::RemoveInstanceStateShard,
        MessageType::StepInstanceStateShard,
        MessageType::QueueAdd,
        MessageType::QueueFetch,
        MessageType::QueueCommit,
        MessageType::QueueDelete,
        MessageType::QueueJoinGroup,
        MessageType::QueueScan,
        MessageType::BmCreate,
        MessageType::BmAdd,
        MessageType::BmRemove,
        MessageType::BmClear,
        MessageType::BmDel,
        MessageType::BmContains,
        MessageType::BmCount,
        MessageType::BmRange,
    ];

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| *t as u8 == tag)
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SetRequest {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Seconds until expiry, 0 keeps the key forever.
    pub ttl: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GetRequest {
    pub key: Vec<u8>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DeleteRequest {
    pub key: Vec<u8>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanRequest {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
    pub limit: u64,
    /// Leading bytes stripped from every returned value.
    pub skip: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AllocIdRequest {
    pub key: Vec<u8>,
    pub batch: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResetIdRequest {
    pub key: Vec<u8>,
    pub start_with: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StartingInstanceRequest {
    pub instance: WorkflowInstance,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StartedInstanceRequest {
    pub workflow_id: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StoppingInstanceRequest {
    pub workflow_id: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StoppedInstanceRequest {
    pub workflow_id: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CreateInstanceStateShardRequest {
    pub state: WorkflowInstanceState,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UpdateInstanceStateShardRequest {
    pub state: WorkflowInstanceState,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RemoveInstanceStateShardRequest {
    pub workflow_id: u64,
    pub index: u32,
}

/// Moves a runner-owned shard to its next state. Only the owning runner may
/// step a shard.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StepInstanceStateShardRequest {
    pub state: WorkflowInstanceState,
}

/// Append records to a queue partition.
///
/// `key` overrides the routing key; when absent the command routes on
/// `(id, partition)`. The same holds for every queue request.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueAddRequest {
    pub id: u64,
    pub partition: u32,
    pub key: Option<Vec<u8>>,
    pub items: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueFetchRequest {
    pub id: u64,
    pub partition: u32,
    pub key: Option<Vec<u8>>,
    pub group: String,
    pub count: u64,
    /// Commits this offset before fetching; 0 commits nothing.
    pub completed_offset: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueCommitRequest {
    pub id: u64,
    pub partition: u32,
    pub key: Option<Vec<u8>>,
    pub group: String,
    pub offset: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueDeleteRequest {
    pub id: u64,
    pub partition: u32,
    pub key: Option<Vec<u8>>,
    /// Records with offsets at or before this are removed.
    pub trim: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueJoinGroupRequest {
    pub id: u64,
    pub partition: u32,
    pub key: Option<Vec<u8>>,
    pub group: String,
    pub consumer: String,
    pub metadata: Vec<u8>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueScanRequest {
    pub id: u64,
    pub partition: u32,
    pub key: Option<Vec<u8>>,
    /// First offset to return.
    pub from: u64,
    pub limit: u64,
}

/// Replaces the bitmap at `key` with exactly `values`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BmCreateRequest {
    pub key: Vec<u8>,
    pub values: Vec<u32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BmAddRequest {
    pub key: Vec<u8>,
    pub values: Vec<u32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BmRemoveRequest {
    pub key: Vec<u8>,
    pub values: Vec<u32>,
}

/// Empties the bitmap but keeps the key.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BmClearRequest {
    pub key: Vec<u8>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BmDelRequest {
    pub key: Vec<u8>,
}

/// True when every one of `values` is set.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BmContainsRequest {
    pub key: Vec<u8>,
    pub values: Vec<u32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BmCountRequest {
    pub key: Vec<u8>,
}

/// Up to `limit` set values at or above `start`, ascending. 0 means no limit.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BmRangeRequest {
    pub key: Vec<u8>,
    pub start: u32,
    pub limit: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BytesResponse {
    pub value: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BytesSliceResponse {
    pub values: Vec<Vec<u8>>,
}

/// Inclusive id range handed out by an allocation.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct IdRangeResponse {
    pub from: u64,
    pub to: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueRecord {
    pub offset: u64,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueAddResponse {
    pub last_offset: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueFetchResponse {
    pub records: Vec<QueueRecord>,
    /// Committed cursor the records were read after.
    pub committed: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueCommitResponse {
    pub committed: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueDeleteResponse {
    pub first_offset: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueJoinGroupResponse {
    pub generation: u64,
    pub committed: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueScanResponse {
    pub records: Vec<QueueRecord>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BmContainsResponse {
    pub contains: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BmCountResponse {
    pub count: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BmRangeResponse {
    pub values: Vec<u32>,
}

fn queue_route(id: u64, partition: u32, key: &Option<Vec<u8>>) -> Vec<u8> {
    match key {
        Some(key) => key.clone(),
        None => keys::partition_key(id, partition),
    }
}

fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(body)
}

/// A typed request.
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    Set(SetRequest),
    Get(GetRequest),
    Delete(DeleteRequest),
    Scan(ScanRequest),
    AllocId(AllocIdRequest),
    ResetId(ResetIdRequest),
    StartingInstance(StartingInstanceRequest),
    StartedInstance(StartedInstanceRequest),
    StoppingInstance(StoppingInstanceRequest),
    StoppedInstance(StoppedInstanceRequest),
    CreateInstanceStateShard(CreateInstanceStateShardRequest),
    UpdateInstanceStateShard(UpdateInstanceStateShardRequest),
    RemoveInstanceStateShard(RemoveInstanceStateShardRequest),
    StepInstanceStateShard(StepInstanceStateShardRequest),
    QueueAdd(QueueAddRequest),
    QueueFetch(QueueFetchRequest),
    QueueCommit(QueueCommitRequest),
    QueueDelete(QueueDeleteRequest),
    QueueJoinGroup(QueueJoinGroupRequest),
    QueueScan(QueueScanRequest),
    BmCreate(BmCreateRequest),
    BmAdd(BmAddRequest),
    BmRemove(BmRemoveRequest),
    BmClear(BmClearRequest),
    BmDel(BmDelRequest),
    BmContains(BmContainsRequest),
    BmCount(BmCountRequest),
    BmRange(BmRangeRequest),
}

impl Request {
    pub fn message_type(&self) -> MessageType {
        match self {
            Request::Set(_) => MessageType::Set,
            Request::Get(_) => MessageType::Get,
            Request::Delete(_) => MessageType::Delete,
            Request::Scan(_) => MessageType::Scan,
            Request::AllocId(_) => MessageType::AllocId,
            Request::ResetId(_) => MessageType::ResetId,
            Request::StartingInstance(_) => MessageType::StartingInstance,
            Request::StartedInstance(_) => MessageType::StartedInstance,
            Request::StoppingInstance(_) => MessageType::StoppingInstance,
            Request::StoppedInstance(_) => MessageType::StoppedInstance,
            Request::CreateInstanceStateShard(_) => MessageType::CreateInstanceStateShard,
            Request::UpdateInstanceStateShard(_) => MessageType::UpdateInstanceStateShard,
            Request::RemoveInstanceStateShard(_) => MessageType::RemoveInstanceStateShard,
            Request::StepInstanceStateShard(_) => MessageType::StepInstanceStateShard,
            Request::QueueAdd(_) => MessageType::QueueAdd,
            Request::QueueFetch(_) => MessageType::QueueFetch,
            Request::QueueCommit(_) => MessageType::QueueCommit,
            Request::QueueDelete(_) => MessageType::QueueDelete,
            Request::QueueJoinGroup(_) => MessageType::QueueJoinGroup,
            Request::QueueScan(_) => MessageType::QueueScan,
            Request::BmCreate(_) => MessageType::BmCreate,
            Request::BmAdd(_) => MessageType::BmAdd,
            Request::BmRemove(_) => MessageType::BmRemove,
            Request::BmClear(_) => MessageType::BmClear,
            Request::BmDel(_) => MessageType::BmDel,
            Request::BmContains(_) => MessageType::BmContains,
            Request::BmCount(_) => MessageType::BmCount,
            Request::BmRange(_) => MessageType::BmRange,
        }
    }

    /// Routing key of the request.
    ///
    /// KV and bitmap operations route on the literal key, lifecycle
    /// operations on the instance key, shard operations on the shard key and
    /// queue operations on `(id, partition)` unless the caller supplied an
    /// explicit key.
    pub fn routing_key(&self) -> Vec<u8> {
        match self {
            Request::Set(r) => r.key.clone(),
            Request::Get(r) => r.key.clone(),
            Request::Delete(r) => r.key.clone(),
            Request::Scan(r) => r.start.clone(),
            Request::AllocId(r) => r.key.clone(),
            Request::ResetId(r) => r.key.clone(),
            Request::StartingInstance(r) => keys::instance_key(r.instance.workflow_id),
            Request::StartedInstance(r) => keys::instance_key(r.workflow_id),
            Request::StoppingInstance(r) => keys::instance_key(r.workflow_id),
            Request::StoppedInstance(r) => keys::instance_key(r.workflow_id),
            Request::CreateInstanceStateShard(r) => {
                keys::instance_shard_key(r.state.workflow_id, r.state.index)
            }
            Request::UpdateInstanceStateShard(r) => {
                keys::instance_shard_key(r.state.workflow_id, r.state.index)
            }
            Request::RemoveInstanceStateShard(r) => keys::instance_shard_key(r.workflow_id, r.index),
            Request::StepInstanceStateShard(r) => {
                keys::instance_shard_key(r.state.workflow_id, r.state.index)
            }
            Request::QueueAdd(r) => queue_route(r.id, r.partition, &r.key),
            Request::QueueFetch(r) => queue_route(r.id, r.partition, &r.key),
            Request::QueueCommit(r) => queue_route(r.id, r.partition, &r.key),
            Request::QueueDelete(r) => queue_route(r.id, r.partition, &r.key),
            Request::QueueJoinGroup(r) => queue_route(r.id, r.partition, &r.key),
            Request::QueueScan(r) => queue_route(r.id, r.partition, &r.key),
            Request::BmCreate(r) => r.key.clone(),
            Request::BmAdd(r) => r.key.clone(),
            Request::BmRemove(r) => r.key.clone(),
            Request::BmClear(r) => r.key.clone(),
            Request::BmDel(r) => r.key.clone(),
            Request::BmContains(r) => r.key.clone(),
            Request::BmCount(r) => r.key.clone(),
            Request::BmRange(r) => r.key.clone(),
        }
    }

    pub fn encode_body(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Request::Set(r) => serde_json::to_vec(r),
            Request::Get(r) => serde_json::to_vec(r),
            Request::Delete(r) => serde_json::to_vec(r),
            Request::Scan(r) => serde_json::to_vec(r),
            Request::AllocId(r) => serde_json::to_vec(r),
            Request::ResetId(r) => serde_json::to_vec(r),
            Request::StartingInstance(r) => serde_json::to_vec(r),
            Request::StartedInstance(r) => serde_json::to_vec(r),
            Request::StoppingInstance(r) => serde_json::to_vec(r),
            Request::StoppedInstance(r) => serde_json::to_vec(r),
            Request::CreateInstanceStateShard(r) => serde_json::to_vec(r),
            Request::UpdateInstanceStateShard(r) => serde_json::to_vec(r),
            Request::RemoveInstanceStateShard(r) => serde_json::to_vec(r),
            Request::StepInstanceStateShard(r) => serde_json::to_vec(r),
            Request::QueueAdd(r) => serde_json::to_vec(r),
            Request::QueueFetch(r) => serde_json::to_vec(r),
            Request::QueueCommit(r) => serde_json::to_vec(r),
            Request::QueueDelete(r) => serde_json::to_vec(r),
            Request::QueueJoinGroup(r) => serde_json::to_vec(r),
            Request::QueueScan(r) => serde_json::to_vec(r),
            Request::BmCreate(r) => serde_json::to_vec(r),
            Request::BmAdd(r) => serde_json::to_vec(r),
            Request::BmRemove(r) => serde_json::to_vec(r),
            Request::BmClear(r) => serde_json::to_vec(r),
            Request::BmDel(r) => serde_json::to_vec(r),
            Request::BmContains(r) => serde_json::to_vec(r),
            Request::BmCount(r) => serde_json::to_vec(r),
            Request::BmRange(r) => serde_json::to_vec(r),
        }
    }

    pub fn decode(message_type: MessageType, body: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match message_type {
            MessageType::Set => Request::Set(decode_body(body)?),
            MessageType::Get => Request::Get(decode_body(body)?),
            MessageType::Delete => Request::Delete(decode_body(body)?),
            MessageType::Scan => Request::Scan(decode_body(body)?),
            MessageType::AllocId => Request::AllocId(decode_body(body)?),
            MessageType::ResetId => Request::ResetId(decode_body(body)?),
            MessageType::StartingInstance => Request::StartingInstance(decode_body(body)?),
            MessageType::StartedInstance => Request::StartedInstance(decode_body(body)?),
            MessageType::StoppingInstance => Request::StoppingInstance(decode_body(body)?),
            MessageType::StoppedInstance => Request::StoppedInstance(decode_body(body)?),
            MessageType::CreateInstanceStateShard => {
                Request::CreateInstanceStateShard(decode_body(body)?)
            }
            MessageType::UpdateInstanceStateShard => {
                Request::UpdateInstanceStateShard(decode_body(body)?)
            }
            MessageType::RemoveInstanceStateShard => {
                Request::RemoveInstanceStateShard(decode_body(body)?)
            }
            MessageType::StepInstanceStateShard => {
                Request::StepInstanceStateShard(decode_body(body)?)
            }
            MessageType::QueueAdd => Request::QueueAdd(decode_body(body)?),
            MessageType::QueueFetch => Request::QueueFetch(decode_body(body)?),
            MessageType::QueueCommit => Request::QueueCommit(decode_body(body)?),
            MessageType::QueueDelete => Request::QueueDelete(decode_body(body)?),
            MessageType::QueueJoinGroup => Request::QueueJoinGroup(decode_body(body)?),
            MessageType::QueueScan => Request::QueueScan(decode_body(body)?),
            MessageType::BmCreate => Request::BmCreate(decode_body(body)?),
            MessageType::BmAdd => Request::BmAdd(decode_body(body)?),
            MessageType::BmRemove => Request::BmRemove(decode_body(body)?),
            MessageType::BmClear => Request::BmClear(decode_body(body)?),
            MessageType::BmDel => Request::BmDel(decode_body(body)?),
            MessageType::BmContains => Request::BmContains(decode_body(body)?),
            MessageType::BmCount => Request::BmCount(decode_body(body)?),
            MessageType::BmRange => Request::BmRange(decode_body(body)?),
        })
    }
}

/// A typed response. Unit variants have an empty body on the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Set,
    Get(BytesResponse),
    Delete,
    Scan(BytesSliceResponse),
    AllocId(IdRangeResponse),
    ResetId,
    StartingInstance,
    StartedInstance,
    StoppingInstance,
    StoppedInstance,
    CreateInstanceStateShard,
    UpdateInstanceStateShard,
    RemoveInstanceStateShard,
    StepInstanceStateShard,
    QueueAdd(QueueAddResponse),
    QueueFetch(QueueFetchResponse),
    QueueCommit(QueueCommitResponse),
    QueueDelete(QueueDeleteResponse),
    QueueJoinGroup(QueueJoinGroupResponse),
    QueueScan(QueueScanResponse),
    BmCreate,
    BmAdd,
    BmRemove,
    BmClear,
    BmDel,
    BmContains(BmContainsResponse),
    BmCount(BmCountResponse),
    BmRange(BmRangeResponse),
}

impl Response {
    pub fn message_type(&self) -> MessageType {
        match self {
            Response::Set => MessageType::Set,
            Response::Get(_) => MessageType::Get,
            Response::Delete => MessageType::Delete,
            Response::Scan(_) => MessageType::Scan,
            Response::AllocId(_) => MessageType::AllocId,
            Response::ResetId => MessageType::ResetId,
            Response::StartingInstance => MessageType::StartingInstance,
            Response::StartedInstance => MessageType::StartedInstance,
            Response::StoppingInstance => MessageType::StoppingInstance,
            Response::StoppedInstance => MessageType::StoppedInstance,
            Response::CreateInstanceStateShard => MessageType::CreateInstanceStateShard,
            Response::UpdateInstanceStateShard => MessageType::UpdateInstanceStateShard,
            Response::RemoveInstanceStateShard => MessageType::RemoveInstanceStateShard,
            Response::StepInstanceStateShard => MessageType::StepInstanceStateShard,
            Response::QueueAdd(_) => MessageType::QueueAdd,
            Response::QueueFetch(_) => MessageType::QueueFetch,
            Response::QueueCommit(_) => MessageType::QueueCommit,
            Response::QueueDelete(_) => MessageType::QueueDelete,
            Response::QueueJoinGroup(_) => MessageType::QueueJoinGroup,
            Response::QueueScan(_) => MessageType::QueueScan,
            Response::BmCreate => MessageType::BmCreate,
            Response::BmAdd => MessageType::BmAdd,
            Response::BmRemove => MessageType::BmRemove,
            Response::BmClear => MessageType::BmClear,
            Response::BmDel => MessageType::BmDel,
            Response::BmContains(_) => MessageType::BmContains,
            Response::BmCount(_) => MessageType::BmCount,
            Response::BmRange(_) => MessageType::BmRange,
        }
    }

    pub fn encode_body(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Response::Get(r) => serde_json::to_vec(r),
            Response::Scan(r) => serde_json::to_vec(r),
            Response::AllocId(r) => serde_json::to_vec(r),
            Response::QueueAdd(r) => serde_json::to_vec(r),
            Response::QueueFetch(r) => serde_json::to_vec(r),
            Response::QueueCommit(r) => serde_json::to_vec(r),
            Response::QueueDelete(r) => serde_json::to_vec(r),
            Response::QueueJoinGroup(r) => serde_json::to_vec(r),
            Response::QueueScan(r) => serde_json::to_vec(r),
            Response::BmContains(r) => serde_json::to_vec(r),
            Response::BmCount(r) => serde_json::to_vec(r),
            Response::BmRange(r) => serde_json::to_vec(r),
            _ => Ok(Vec::new()),
        }
    }

    /// Rebuilds a response from the bytes a handler produced for `message_type`.
    pub fn decode(message_type: MessageType, body: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match message_type {
            MessageType::Set => Response::Set,
            MessageType::Get => Response::Get(decode_body(body)?),
            MessageType::Delete => Response::Delete,
            MessageType::Scan => Response::Scan(decode_body(body)?),
            MessageType::AllocId => Response::AllocId(decode_body(body)?),
            MessageType::ResetId => Response::ResetId,
            MessageType::StartingInstance => Response::StartingInstance,
            MessageType::StartedInstance => Response::StartedInstance,
            MessageType::StoppingInstance => Response::StoppingInstance,
            MessageType::StoppedInstance => Response::StoppedInstance,
            MessageType::CreateInstanceStateShard => Response::CreateInstanceStateShard,
            MessageType::UpdateInstanceStateShard => Response::UpdateInstanceStateShard,
            MessageType::RemoveInstanceStateShard => Response::RemoveInstanceStateShard,
            MessageType::StepInstanceStateShard => Response::StepInstanceStateShard,
            MessageType::QueueAdd => Response::QueueAdd(decode_body(body)?),
            MessageType::QueueFetch => Response::QueueFetch(decode_body(body)?),
            MessageType::QueueCommit => Response::QueueCommit(decode_body(body)?),
            MessageType::QueueDelete => Response::QueueDelete(decode_body(body)?),
            MessageType::QueueJoinGroup => Response::QueueJoinGroup(decode_body(body)?),
            MessageType::QueueScan => Response::QueueScan(decode_body(body)?),
            MessageType::BmCreate => Response::BmCreate,
            MessageType::BmAdd => Response::BmAdd,
            MessageType::BmRemove => Response::BmRemove,
            MessageType::BmClear => Response::BmClear,
            MessageType::BmDel => Response::BmDel,
            MessageType::BmContains => Response::BmContains(decode_body(body)?),
            MessageType::BmCount => Response::BmCount(decode_body(body)?),
            MessageType::BmRange => Response::BmRange(decode_body(body)?),
        })
    }
}
