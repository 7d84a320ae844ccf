use crate::consensus::Peer;
use crate::partition::PartitionStatus;
use crate::storage::ExtentCrc;
use serde::{Deserialize, Serialize};

/// An instruction from the cluster to one node. Travels as JSON inside an `AdminTask` packet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AdminTask {
    #[serde(rename = "ID")]
    pub id: u64,
    #[serde(rename = "PartitionID")]
    pub partition_id: u64,
    pub operator_addr: String,
    pub request: TaskRequest,
}

impl AdminTask {
    pub fn new(operator_addr: impl Into<String>, partition_id: u64, request: TaskRequest) -> Self {
        AdminTask {
            id: rand::random(),
            partition_id,
            operator_addr: operator_addr.into(),
            request,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Op", content = "Request")]
pub enum TaskRequest {
    DataNodeHeartbeat,
    MetaNodeHeartbeat,
    CreateDataPartition(CreateDataPartitionRequest),
    DeleteDataPartition,
    LoadDataPartition,
    CreateMetaPartition(CreateMetaPartitionRequest),
    DeleteMetaPartition,
    LoadMetaPartition,
    UpdateMetaPartition(UpdateMetaPartitionRequest),
    AddRaftMember(Peer),
    RemoveRaftMember(Peer),
    TryToLeader,
    UpdatePartitionPeers(UpdatePartitionPeersRequest),
    CreateEcPartition(CreateEcPartitionRequest),
}

impl TaskRequest {
    pub fn name(&self) -> &'static str {
        match self {
            TaskRequest::DataNodeHeartbeat => "DataNodeHeartbeat",
            TaskRequest::MetaNodeHeartbeat => "MetaNodeHeartbeat",
            TaskRequest::CreateDataPartition(_) => "CreateDataPartition",
            TaskRequest::DeleteDataPartition => "DeleteDataPartition",
            TaskRequest::LoadDataPartition => "LoadDataPartition",
            TaskRequest::CreateMetaPartition(_) => "CreateMetaPartition",
            TaskRequest::DeleteMetaPartition => "DeleteMetaPartition",
            TaskRequest::LoadMetaPartition => "LoadMetaPartition",
            TaskRequest::UpdateMetaPartition(_) => "UpdateMetaPartition",
            TaskRequest::AddRaftMember(_) => "AddRaftMember",
            TaskRequest::RemoveRaftMember(_) => "RemoveRaftMember",
            TaskRequest::TryToLeader => "TryToLeader",
            TaskRequest::UpdatePartitionPeers(_) => "UpdatePartitionPeers",
            TaskRequest::CreateEcPartition(_) => "CreateEcPartition",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateDataPartitionRequest {
    #[serde(rename = "VolumeID")]
    pub volume_id: String,
    pub partition_size: u64,
    pub random_write: bool,
    pub peers: Vec<Peer>,
    pub hosts: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateMetaPartitionRequest {
    #[serde(rename = "VolumeID")]
    pub volume_id: String,
    pub start: u64,
    pub end: u64,
    pub peers: Vec<Peer>,
    pub hosts: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateMetaPartitionRequest {
    #[serde(rename = "VolumeID")]
    pub volume_id: String,
    pub start: u64,
    pub end: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdatePartitionPeersRequest {
    pub hosts: Vec<String>,
    pub peers: Vec<Peer>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateEcPartitionRequest {
    #[serde(rename = "VolumeID")]
    pub volume_id: String,
    pub partition_size: u64,
    pub stripe_block_size: u64,
    pub data_node_num: u32,
    pub parity_node_num: u32,
    pub data_nodes: Vec<String>,
    pub parity_nodes: Vec<String>,
    pub node_index: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Succeeded,
    Failed,
}

/// Outcome of a task without a payload of its own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskResult {
    pub status: TaskStatus,
    #[serde(default)]
    pub message: String,
}

impl TaskResult {
    pub fn succeeded() -> Self {
        TaskResult {
            status: TaskStatus::Succeeded,
            message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        TaskResult {
            status: TaskStatus::Failed,
            message: message.into(),
        }
    }
}

/// One data partition replica as reported in a data node heartbeat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PartitionReport {
    #[serde(rename = "PartitionID")]
    pub partition_id: u64,
    #[serde(rename = "VolumeID")]
    pub volume_id: String,
    pub status: PartitionStatus,
    pub total: u64,
    pub used: u64,
    pub extent_count: u64,
    pub is_leader: bool,
    pub need_compare: bool,
    pub disk_path: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetaPartitionReport {
    #[serde(rename = "PartitionID")]
    pub partition_id: u64,
    #[serde(rename = "VolumeID")]
    pub volume_id: String,
    pub start: u64,
    pub end: u64,
    pub max_inode_id: u64,
    pub status: PartitionStatus,
    pub is_leader: bool,
    pub inode_count: u64,
    pub dentry_count: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataNodeHeartbeatResponse {
    pub result: TaskResult,
    pub total: u64,
    pub used: u64,
    pub partition_reports: Vec<PartitionReport>,
    #[serde(default)]
    pub bad_disks: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetaNodeHeartbeatResponse {
    pub result: TaskResult,
    pub total: u64,
    pub used: u64,
    pub partition_reports: Vec<MetaPartitionReport>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadDataPartitionResponse {
    pub result: TaskResult,
    #[serde(rename = "PartitionID")]
    pub partition_id: u64,
    pub partition_status: PartitionStatus,
    pub used: u64,
    pub snapshot: Vec<ExtentCrc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadMetaPartitionResponse {
    pub result: TaskResult,
    #[serde(rename = "PartitionID")]
    pub partition_id: u64,
    pub apply_id: u64,
    pub max_inode: u64,
    pub inode_count: u64,
    pub dentry_count: u64,
}

/// Reply to an [`AdminTask`]. Each variant answers the request variant of the same name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Op", content = "Response")]
pub enum TaskResponse {
    DataNodeHeartbeat(DataNodeHeartbeatResponse),
    MetaNodeHeartbeat(MetaNodeHeartbeatResponse),
    CreateDataPartition(TaskResult),
    DeleteDataPartition(TaskResult),
    LoadDataPartition(LoadDataPartitionResponse),
    CreateMetaPartition(TaskResult),
    DeleteMetaPartition(TaskResult),
    LoadMetaPartition(LoadMetaPartitionResponse),
    UpdateMetaPartition(TaskResult),
    AddRaftMember(TaskResult),
    RemoveRaftMember(TaskResult),
    TryToLeader(TaskResult),
    UpdatePartitionPeers(TaskResult),
    CreateEcPartition(TaskResult),
}

impl TaskResponse {
    pub fn result(&self) -> &TaskResult {
        match self {
            TaskResponse::DataNodeHeartbeat(r) => &r.result,
            TaskResponse::MetaNodeHeartbeat(r) => &r.result,
            TaskResponse::LoadDataPartition(r) => &r.result,
            TaskResponse::LoadMetaPartition(r) => &r.result,
            TaskResponse::CreateDataPartition(r)
            | TaskResponse::DeleteDataPartition(r)
            | TaskResponse::CreateMetaPartition(r)
            | TaskResponse::DeleteMetaPartition(r)
            | TaskResponse::UpdateMetaPartition(r)
            | TaskResponse::AddRaftMember(r)
            | TaskResponse::RemoveRaftMember(r)
            | TaskResponse::TryToLeader(r)
            | TaskResponse::UpdatePartitionPeers(r)
            | TaskResponse::CreateEcPartition(r) => r,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result().status == TaskStatus::Succeeded
    }

    /// The failure response a node gives when it cannot act on `request` at all.
    pub fn failure_for(request: &TaskRequest, message: impl Into<String>) -> TaskResponse {
        let result = TaskResult::failed(message);
        match request {
            TaskRequest::DataNodeHeartbeat => TaskResponse::DataNodeHeartbeat(DataNodeHeartbeatResponse {
                result,
                total: 0,
                used: 0,
                partition_reports: Vec::new(),
                bad_disks: Vec::new(),
            }),
            TaskRequest::MetaNodeHeartbeat => TaskResponse::MetaNodeHeartbeat(MetaNodeHeartbeatResponse {
                result,
                total: 0,
                used: 0,
                partition_reports: Vec::new(),
            }),
            TaskRequest::LoadDataPartition => TaskResponse::LoadDataPartition(LoadDataPartitionResponse {
                result,
                partition_id: 0,
                partition_status: PartitionStatus::Unavailable,
                used: 0,
                snapshot: Vec::new(),
            }),
            TaskRequest::LoadMetaPartition => TaskResponse::LoadMetaPartition(LoadMetaPartitionResponse {
                result,
                partition_id: 0,
                apply_id: 0,
                max_inode: 0,
                inode_count: 0,
                dentry_count: 0,
            }),
            TaskRequest::CreateDataPartition(_) => TaskResponse::CreateDataPartition(result),
            TaskRequest::DeleteDataPartition => TaskResponse::DeleteDataPartition(result),
            TaskRequest::CreateMetaPartition(_) => TaskResponse::CreateMetaPartition(result),
            TaskRequest::DeleteMetaPartition => TaskResponse::DeleteMetaPartition(result),
            TaskRequest::UpdateMetaPartition(_) => TaskResponse::UpdateMetaPartition(result),
            TaskRequest::AddRaftMember(_) => TaskResponse::AddRaftMember(result),
            TaskRequest::RemoveRaftMember(_) => TaskResponse::RemoveRaftMember(result),
            TaskRequest::TryToLeader => TaskResponse::TryToLeader(result),
            TaskRequest::UpdatePartitionPeers(_) => TaskResponse::UpdatePartitionPeers(result),
            TaskRequest::CreateEcPartition(_) => TaskResponse::CreateEcPartition(result),
        }
    }
}

/// A response as it arrives at the cluster's dispatcher, correlated to its task.
#[derive(Clone, Debug)]
pub struct TaskReply {
    pub node_addr: String,
    pub task_id: u64,
    pub partition_id: u64,
    pub response: TaskResponse,
}
