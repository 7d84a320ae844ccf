use crate::cluster::Cluster;
use crate::rpc::{Opcode, Packet, PacketHandler, ResultCode};
use std::sync::Arc;

/// ClusterHandler serves the node RPC of the cluster manager. Nodes only ask it for the
/// persisted host list of their partitions.
pub struct ClusterHandler {
    cluster: Arc<Cluster>,
}

impl ClusterHandler {
    pub fn new(cluster: Arc<Cluster>) -> Self {
        ClusterHandler { cluster }
    }
}

#[async_trait::async_trait]
impl PacketHandler for ClusterHandler {
    async fn handle(&self, request: Packet) -> Packet {
        match request.opcode {
            Opcode::GetPartitionHosts => match self.cluster.partition_hosts(request.partition_id).await {
                Ok(hosts) => match serde_json::to_vec(&hosts) {
                    Ok(json) => request.reply_ok(json),
                    Err(e) => request.reply_err(ResultCode::Err, e.to_string()),
                },
                Err(e) => request.reply_err(ResultCode::NotExist, e.to_string()),
            },
            Opcode::StreamRead | Opcode::GetAllWatermarks | Opcode::NotifyRepair | Opcode::AdminTask => {
                request.reply_err(ResultCode::TryOtherAddr, "extent traffic is served by data nodes")
            }
        }
    }
}
