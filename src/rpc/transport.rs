use crate::repair::{ExtentRepairMode, RepairTask};
use crate::rpc::{AdminTask, RpcError, TaskResponse};
use crate::storage::{ExtentId, ExtentInfo};
use bytes::Bytes;

/// Calls a data node makes to the other replicas of its partitions.
#[async_trait::async_trait]
pub trait PeerClient: Send + Sync {
    /// Extent inventory of the replica at `addr`, for the extents `mode` selects.
    async fn fetch_extent_inventory(
        &self,
        addr: &str,
        partition_id: u64,
        mode: ExtentRepairMode,
    ) -> Result<Vec<ExtentInfo>, RpcError>;

    async fn read_extent(
        &self,
        addr: &str,
        partition_id: u64,
        extent_id: ExtentId,
        offset: u64,
        size: u32,
    ) -> Result<Bytes, RpcError>;

    /// Hands a follower its repair task list. The follower executes it in the background.
    async fn notify_repair(&self, addr: &str, partition_id: u64, task: &RepairTask) -> Result<(), RpcError>;
}

/// Calls a data node makes to the cluster manager.
#[async_trait::async_trait]
pub trait MasterClient: Send + Sync {
    /// Ordered replica hosts of a partition, as persisted by the cluster.
    async fn partition_hosts(&self, partition_id: u64) -> Result<Vec<String>, RpcError>;
}

/// Calls the cluster manager makes to a node.
#[async_trait::async_trait]
pub trait NodeTransport: Send + Sync {
    /// Sends the task and waits for the node's response.
    async fn send_admin_task(&self, addr: &str, task: &AdminTask) -> Result<TaskResponse, RpcError>;
}
