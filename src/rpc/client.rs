use crate::grpc::node_rpc_client::NodeRpcClient;
use crate::grpc::ProtoPacket;
use crate::repair::{ExtentRepairMode, RepairTask};
use crate::rpc::{AdminTask, MasterClient, NodeTransport, Opcode, Packet, PeerClient, RpcError, TaskResponse};
use crate::storage::{ExtentId, ExtentInfo};
use bytes::Bytes;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::{Arc, Mutex};
use tokio::time::Duration;
use tonic::transport::{Channel, Endpoint};

/// RpcClient keeps one gRPC connection per node address and exchanges [`Packet`]s over it.
/// A connection that fails at the transport level is dropped from the pool and re-dialed by the
/// next call.
pub struct RpcClient {
    logger: slog::Logger,
    rpc_timeout: Duration,
    connections: Mutex<HashMap<String, NodeRpcClient<Channel>>>,
}

impl RpcClient {
    pub fn new(logger: slog::Logger, rpc_timeout: Duration) -> Self {
        RpcClient {
            logger,
            rpc_timeout,
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub async fn exchange(&self, addr: &str, request: Packet) -> Result<Packet, RpcError> {
        let mut connection = self.connection(addr).await?;

        let rpc_request = ProtoPacket::from(request);
        slog::debug!(self.logger, "ClientWire - {} - {:?}", addr, rpc_request);
        let rpc_reply = tokio::time::timeout(self.rpc_timeout, connection.exchange(rpc_request)).await;
        slog::debug!(self.logger, "ClientWire - {} - {:?}", addr, rpc_reply);

        match rpc_reply {
            Ok(Ok(response)) => Packet::try_from(response.into_inner())?.into_result(),
            Ok(Err(status)) => {
                self.evict(addr);
                Err(RpcError::Status(status))
            }
            Err(_) => {
                self.evict(addr);
                Err(RpcError::Timeout(self.rpc_timeout))
            }
        }
    }

    async fn connection(&self, addr: &str) -> Result<NodeRpcClient<Channel>, RpcError> {
        let pooled = self.pool().get(addr).cloned();
        if let Some(connection) = pooled {
            return Ok(connection);
        }

        let endpoint = Endpoint::from_shared(format!("http://{}", addr))
            .map_err(|_| RpcError::InvalidAddress(addr.to_string()))?
            .timeout(self.rpc_timeout);
        let channel = tokio::time::timeout(self.rpc_timeout, endpoint.connect())
            .await
            .map_err(|_| RpcError::Timeout(self.rpc_timeout))??;
        slog::info!(self.logger, "Connected to {}", addr);

        let connection = NodeRpcClient::new(channel);
        self.pool().insert(addr.to_string(), connection.clone());
        Ok(connection)
    }

    fn evict(&self, addr: &str) {
        if self.pool().remove(addr).is_some() {
            slog::info!(self.logger, "Evicted connection to {}", addr);
        }
    }

    fn pool(&self) -> std::sync::MutexGuard<'_, HashMap<String, NodeRpcClient<Channel>>> {
        self.connections.lock().expect("RpcClient connection pool mutex guard poison")
    }
}

#[async_trait::async_trait]
impl PeerClient for RpcClient {
    async fn fetch_extent_inventory(
        &self,
        addr: &str,
        partition_id: u64,
        mode: ExtentRepairMode,
    ) -> Result<Vec<ExtentInfo>, RpcError> {
        let request = Packet::request(Opcode::GetAllWatermarks, partition_id).with_data(serde_json::to_vec(&mode)?);
        let reply = self.exchange(addr, request).await?;
        Ok(serde_json::from_slice(&reply.data)?)
    }

    async fn read_extent(
        &self,
        addr: &str,
        partition_id: u64,
        extent_id: ExtentId,
        offset: u64,
        size: u32,
    ) -> Result<Bytes, RpcError> {
        let request = Packet::request(Opcode::StreamRead, partition_id).with_extent(extent_id, offset, size);
        let reply = self.exchange(addr, request).await?;
        if reply.data.len() != size as usize {
            return Err(RpcError::Malformed(format!(
                "asked for {} bytes of extent {}, got {}",
                size,
                extent_id,
                reply.data.len()
            )));
        }
        Ok(reply.data)
    }

    async fn notify_repair(&self, addr: &str, partition_id: u64, task: &RepairTask) -> Result<(), RpcError> {
        let request = Packet::request(Opcode::NotifyRepair, partition_id).with_data(serde_json::to_vec(task)?);
        self.exchange(addr, request).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl NodeTransport for RpcClient {
    async fn send_admin_task(&self, addr: &str, task: &AdminTask) -> Result<TaskResponse, RpcError> {
        let request = Packet::request(Opcode::AdminTask, task.partition_id).with_data(serde_json::to_vec(task)?);
        let reply = self.exchange(addr, request).await?;
        Ok(serde_json::from_slice(&reply.data)?)
    }
}

/// Asks the cluster manager, trying each known manager address in turn.
pub struct RpcMasterClient {
    client: Arc<RpcClient>,
    master_addrs: Vec<String>,
}

impl RpcMasterClient {
    pub fn new(client: Arc<RpcClient>, master_addrs: Vec<String>) -> Self {
        RpcMasterClient { client, master_addrs }
    }
}

#[async_trait::async_trait]
impl MasterClient for RpcMasterClient {
    async fn partition_hosts(&self, partition_id: u64) -> Result<Vec<String>, RpcError> {
        let mut last_error = RpcError::InvalidAddress("no cluster manager address configured".to_string());
        for addr in &self.master_addrs {
            let request = Packet::request(Opcode::GetPartitionHosts, partition_id);
            match self.client.exchange(addr, request).await {
                Ok(reply) => return Ok(serde_json::from_slice(&reply.data)?),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }
}
