use crate::consensus::ConfChangeType;
use crate::node::Space;
use crate::partition::PartitionError;
use crate::repair::{ExtentRepairMode, RepairTask};
use crate::rpc::{AdminTask, Opcode, Packet, PacketHandler, ResultCode, TaskRequest, TaskResponse, TaskResult};
use crate::storage::is_disk_error;
use crate::util::supervised;
use bytes::Bytes;
use std::io;
use std::sync::Arc;

/// DataNodeHandler serves the node RPC of a data node: extent reads and inventories for peers,
/// repair notifications from partition leaders and admin tasks from the cluster.
pub struct DataNodeHandler {
    logger: slog::Logger,
    space: Arc<Space>,
}

impl DataNodeHandler {
    pub fn new(logger: slog::Logger, space: Arc<Space>) -> Self {
        DataNodeHandler { logger, space }
    }

    fn handle_stream_read(&self, request: &Packet) -> Packet {
        if let Some(partition) = self.space.partition(request.partition_id) {
            return match partition.read(request.extent_id, request.extent_offset, request.size) {
                Ok(data) => request.reply_ok(data),
                Err(e) => Self::reply_partition_error(request, &e),
            };
        }

        // Peers of an EC partition only ever ask for blocks this node holds.
        if let Some(partition) = self.space.ec_partition(request.partition_id) {
            return match partition.local_read(request.extent_id, request.extent_offset, request.size) {
                Ok(data) => request.reply_ok(data),
                Err(e) => request.reply_err(ResultCode::Err, e.to_string()),
            };
        }

        Self::reply_not_found(request)
    }

    fn handle_get_all_watermarks(&self, request: &Packet) -> Packet {
        let partition = match self.space.partition(request.partition_id) {
            Some(partition) => partition,
            None => return Self::reply_not_found(request),
        };
        let mode: ExtentRepairMode = match serde_json::from_slice(&request.data) {
            Ok(mode) => mode,
            Err(e) => return request.reply_err(ResultCode::ArgMismatch, e.to_string()),
        };

        match partition.all_extents_meta(mode) {
            Ok(extents) => match serde_json::to_vec(&extents) {
                Ok(json) => request.reply_ok(json),
                Err(e) => request.reply_err(ResultCode::Err, e.to_string()),
            },
            Err(e) => Self::reply_partition_error(request, &e),
        }
    }

    /// Acknowledges at once; the repair itself runs in the background.
    fn handle_notify_repair(&self, request: &Packet) -> Packet {
        let partition = match self.space.partition(request.partition_id) {
            Some(partition) => partition,
            None => return Self::reply_not_found(request),
        };
        let task: RepairTask = match serde_json::from_slice(&request.data) {
            Ok(task) => task,
            Err(e) => return request.reply_err(ResultCode::ArgMismatch, e.to_string()),
        };

        let repair = self.space.repair_engine().clone();
        let logger = partition.logger().clone();
        tokio::spawn(async move {
            let merge = async move { repair.merge_extent_store_repair(&partition, task).await };
            if let Ok(outcome) = supervised(&logger, "NotifyRepair", merge).await {
                slog::info!(logger, "Repair requested by leader: {:?}", outcome);
            }
        });

        request.reply_ok(Bytes::new())
    }

    async fn handle_admin_task(&self, request: &Packet) -> Packet {
        let task: AdminTask = match serde_json::from_slice(&request.data) {
            Ok(task) => task,
            Err(e) => return request.reply_err(ResultCode::ArgMismatch, e.to_string()),
        };

        let task_name = task.request.name();
        let response = self.execute(task).await;
        if !response.is_success() {
            slog::warn!(self.logger, "Task {} failed: {}", task_name, response.result().message);
        }

        match serde_json::to_vec(&response) {
            Ok(json) => request.reply_ok(json),
            Err(e) => request.reply_err(ResultCode::Err, e.to_string()),
        }
    }

    /// Runs one admin task to completion.
    pub async fn execute(&self, task: AdminTask) -> TaskResponse {
        let partition_id = task.partition_id;
        match task.request {
            TaskRequest::DataNodeHeartbeat => TaskResponse::DataNodeHeartbeat(self.space.heartbeat_report()),
            TaskRequest::CreateDataPartition(request) => {
                TaskResponse::CreateDataPartition(to_result(self.space.create_partition(partition_id, request)))
            }
            TaskRequest::DeleteDataPartition => {
                TaskResponse::DeleteDataPartition(to_result(self.space.delete_partition(partition_id)))
            }
            TaskRequest::LoadDataPartition => match self.space.partition(partition_id) {
                Some(partition) => {
                    partition.force_load_header();
                    TaskResponse::LoadDataPartition(partition.load_response())
                }
                None => TaskResponse::failure_for(&TaskRequest::LoadDataPartition, not_found(partition_id)),
            },
            TaskRequest::AddRaftMember(peer) => match self.space.partition(partition_id) {
                Some(partition) => TaskResponse::AddRaftMember(to_result(
                    partition
                        .change_raft_member(ConfChangeType::AddNode, peer, Bytes::new())
                        .await,
                )),
                None => TaskResponse::AddRaftMember(TaskResult::failed(not_found(partition_id))),
            },
            TaskRequest::RemoveRaftMember(peer) => match self.space.partition(partition_id) {
                Some(partition) => TaskResponse::RemoveRaftMember(to_result(
                    partition
                        .change_raft_member(ConfChangeType::RemoveNode, peer, Bytes::new())
                        .await,
                )),
                None => TaskResponse::RemoveRaftMember(TaskResult::failed(not_found(partition_id))),
            },
            TaskRequest::TryToLeader => match self.space.partition(partition_id) {
                Some(partition) => TaskResponse::TryToLeader(to_result(partition.try_to_leader().await)),
                None => TaskResponse::TryToLeader(TaskResult::failed(not_found(partition_id))),
            },
            TaskRequest::UpdatePartitionPeers(request) => match self.space.partition(partition_id) {
                Some(partition) => {
                    TaskResponse::UpdatePartitionPeers(to_result(partition.update_peers(request.hosts, request.peers)))
                }
                None => TaskResponse::UpdatePartitionPeers(TaskResult::failed(not_found(partition_id))),
            },
            TaskRequest::CreateEcPartition(request) => {
                TaskResponse::CreateEcPartition(to_result(self.space.create_ec_partition(partition_id, request)))
            }
            unsupported @ (TaskRequest::MetaNodeHeartbeat
            | TaskRequest::CreateMetaPartition(_)
            | TaskRequest::DeleteMetaPartition
            | TaskRequest::LoadMetaPartition
            | TaskRequest::UpdateMetaPartition(_)) => {
                TaskResponse::failure_for(&unsupported, "metadata tasks are not served by a data node")
            }
        }
    }

    fn reply_partition_error(request: &Packet, error: &PartitionError) -> Packet {
        let code = match error {
            PartitionError::Io(e) if is_disk_error(e) => ResultCode::DiskErr,
            PartitionError::Io(e) if e.kind() == io::ErrorKind::NotFound => ResultCode::NotExist,
            _ => ResultCode::Err,
        };
        request.reply_err(code, error.to_string())
    }

    fn reply_not_found(request: &Packet) -> Packet {
        request.reply_err(ResultCode::NotExist, not_found(request.partition_id))
    }
}

fn not_found(partition_id: u64) -> String {
    format!("partition {} not found on this node", partition_id)
}

fn to_result<T, E: std::fmt::Display>(result: Result<T, E>) -> TaskResult {
    match result {
        Ok(_) => TaskResult::succeeded(),
        Err(e) => TaskResult::failed(e.to_string()),
    }
}

#[async_trait::async_trait]
impl PacketHandler for DataNodeHandler {
    async fn handle(&self, request: Packet) -> Packet {
        match request.opcode {
            Opcode::StreamRead => self.handle_stream_read(&request),
            Opcode::GetAllWatermarks => self.handle_get_all_watermarks(&request),
            Opcode::NotifyRepair => self.handle_notify_repair(&request),
            Opcode::AdminTask => self.handle_admin_task(&request).await,
            Opcode::GetPartitionHosts => {
                request.reply_err(ResultCode::TryOtherAddr, "partition hosts are served by the cluster manager")
            }
        }
    }
}
