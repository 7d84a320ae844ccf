#![allow(dead_code)]

use bytes::Bytes;
use replicated_store::{
    default_tiny_extent_ids, AdminTask, Cluster, ClusterOptions, ClusterOptionsValidated, ConfChangeType,
    ConsensusError, ConsensusFactory, ConsensusGroup, CreateDataPartitionRequest, DataNodeHandler, DataNodeOptions,
    DataNodeOptionsValidated, Disk, ExtentId, ExtentInfo, ExtentRepairMode, InMemoryClusterStore, InMemoryStoreFactory,
    LoadMetaPartitionResponse, MasterClient, MetaNodeHeartbeatResponse, MetaPartitionReport, NodeId, NodeKind,
    NodeTransport, Opcode, Packet, PacketHandler, PartitionContext, PartitionStatus, Peer, PeerClient, RepairEngine, RepairTask, ResultCode,
    RpcError, Space, TaskRequest, TaskResponse, TaskResult,
};
use slog::Drain;
use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tempfile::TempDir;
use tokio::time::{Duration, Instant};

pub const CLUSTER_ADDR: &str = "10.0.0.100:17010";
pub const DISK_TOTAL: u64 = 1 << 40;

pub fn logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

// Swap in for `logger()` when a test needs to be debugged.
pub fn create_root_logger_for_stdout() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}

pub fn data_addr(index: u64) -> String {
    format!("10.0.0.{}:17310", index)
}

pub fn meta_addr(index: u64) -> String {
    format!("10.0.1.{}:17210", index)
}

pub fn cluster_options() -> Arc<ClusterOptionsValidated> {
    let options = ClusterOptions {
        load_response_polls: Some(10),
        load_response_poll_interval: Some(Duration::from_millis(20)),
        retry_send_sync_task_interval: Some(Duration::from_millis(5)),
        ..ClusterOptions::default()
    };
    Arc::new(ClusterOptionsValidated::try_from(options).unwrap())
}

fn node_options() -> Arc<DataNodeOptionsValidated> {
    let options = DataNodeOptions {
        status_update_interval: Some(Duration::from_secs(3600)),
        ..DataNodeOptions::default()
    };
    Arc::new(DataNodeOptionsValidated::try_from(options).unwrap())
}

/// Polls `condition` until it holds or `timeout` passes.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ------- Fake raft -------

struct GroupState {
    leader: AtomicU64,
    members: Mutex<Vec<Peer>>,
}

/// One raft group per partition, shared by every replica that starts it. The lowest peer ID
/// leads initially, and only the leader accepts membership changes.
#[derive(Default)]
pub struct FakeConsensus {
    groups: Mutex<HashMap<u64, Arc<GroupState>>>,
}

impl FakeConsensus {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeConsensus::default())
    }

    fn group(&self, partition_id: u64) -> Option<Arc<GroupState>> {
        self.groups
            .lock()
            .expect("FakeConsensus.groups lock guard poison")
            .get(&partition_id)
            .cloned()
    }

    pub fn leader(&self, partition_id: u64) -> NodeId {
        self.group(partition_id)
            .map_or(0, |g| g.leader.load(Ordering::SeqCst))
    }

    pub fn set_leader(&self, partition_id: u64, leader: NodeId) {
        if let Some(group) = self.group(partition_id) {
            group.leader.store(leader, Ordering::SeqCst);
        }
    }

    pub fn members(&self, partition_id: u64) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .group(partition_id)
            .map(|g| g.members.lock().expect("GroupState.members lock guard poison").iter().map(|p| p.id).collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }
}

impl ConsensusFactory for FakeConsensus {
    fn start_group(
        &self,
        partition_id: u64,
        local_node: NodeId,
        peers: &[Peer],
    ) -> Result<Arc<dyn ConsensusGroup>, ConsensusError> {
        let state = self
            .groups
            .lock()
            .expect("FakeConsensus.groups lock guard poison")
            .entry(partition_id)
            .or_insert_with(|| {
                Arc::new(GroupState {
                    leader: AtomicU64::new(peers.iter().map(|p| p.id).min().unwrap_or(0)),
                    members: Mutex::new(peers.to_vec()),
                })
            })
            .clone();
        Ok(Arc::new(FakeGroup { state, local_node }))
    }
}

struct FakeGroup {
    state: Arc<GroupState>,
    local_node: NodeId,
}

#[async_trait::async_trait]
impl ConsensusGroup for FakeGroup {
    fn leader_term(&self) -> (NodeId, u64) {
        (self.state.leader.load(Ordering::SeqCst), 1)
    }

    async fn change_member(&self, change: ConfChangeType, peer: Peer, _context: Bytes) -> Result<Bytes, ConsensusError> {
        let leader = self.state.leader.load(Ordering::SeqCst);
        if leader == 0 {
            return Err(ConsensusError::NoLeader);
        }
        if leader != self.local_node {
            return Err(ConsensusError::NotLeader { leader });
        }

        let mut members = self.state.members.lock().expect("GroupState.members lock guard poison");
        match change {
            ConfChangeType::AddNode => {
                if !members.iter().any(|p| p.id == peer.id) {
                    members.push(peer);
                }
            }
            ConfChangeType::RemoveNode => members.retain(|p| p.id != peer.id),
        }
        Ok(Bytes::new())
    }

    async fn propose(&self, _entry: Bytes) -> Result<(), ConsensusError> {
        Ok(())
    }

    async fn try_to_leader(&self) -> Result<(), ConsensusError> {
        self.state.leader.store(self.local_node, Ordering::SeqCst);
        Ok(())
    }
}

// ------- In-process network -------

pub struct DataNode {
    pub id: NodeId,
    pub addr: String,
    pub space: Arc<Space>,
    pub factory: Arc<InMemoryStoreFactory>,
    handler: Arc<DataNodeHandler>,
    _dir: TempDir,
}

#[derive(Clone, Debug)]
pub struct MetaReplica {
    pub volume_id: String,
    pub start: u64,
    pub end: u64,
    pub max_inode_id: u64,
    pub apply_id: u64,
    pub inode_count: u64,
    pub dentry_count: u64,
}

#[derive(Default)]
struct MetaNode {
    total: u64,
    used: u64,
    partitions: HashMap<u64, MetaReplica>,
}

/// Routes every RPC of the crate between in-process nodes: admin tasks from the cluster, peer
/// traffic between data nodes and host lookups from data nodes to the cluster.
#[derive(Default)]
pub struct LocalNetwork {
    data_nodes: RwLock<HashMap<String, Arc<DataNode>>>,
    meta_nodes: Mutex<HashMap<String, MetaNode>>,
    down: Mutex<HashSet<String>>,
    admin_delay: Mutex<Option<Duration>>,
    sent: Mutex<Vec<(String, u64, TaskRequest)>>,
    cluster: RwLock<Option<Weak<Cluster>>>,
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(LocalNetwork::default())
    }

    /// Starts a data node with one disk and the given tiny extent range.
    pub fn start_data_node(
        self: &Arc<Self>,
        id: NodeId,
        consensus: Option<Arc<FakeConsensus>>,
        tiny_extent_ids: RangeInclusive<ExtentId>,
    ) -> Arc<DataNode> {
        let addr = data_addr(id);
        let dir = tempfile::tempdir().unwrap();
        let options = node_options();
        let logger = logger().new(slog::o!("DataNode" => addr.clone()));
        let factory = Arc::new(InMemoryStoreFactory::with_tiny_extent_ids(tiny_extent_ids));
        let context = PartitionContext {
            logger: logger.clone(),
            node_id: id,
            local_addr: addr.clone(),
            store_factory: factory.clone(),
            consensus_factory: consensus.map(|c| c as Arc<dyn ConsensusFactory>),
            options: options.clone(),
        };

        let repair = Arc::new(RepairEngine::new(logger.clone(), self.clone(), self.clone(), options));
        let space = Arc::new(Space::new(
            context,
            vec![Arc::new(Disk::new(dir.path(), DISK_TOTAL))],
            repair,
        ));
        let node = Arc::new(DataNode {
            id,
            addr: addr.clone(),
            handler: Arc::new(DataNodeHandler::new(logger, space.clone())),
            space,
            factory,
            _dir: dir,
        });
        self.data_nodes
            .write()
            .expect("LocalNetwork.data_nodes lock guard poison")
            .insert(addr, node.clone());
        node
    }

    pub fn start_meta_node(&self, id: NodeId, total: u64, used: u64) -> String {
        let addr = meta_addr(id);
        self.meta_nodes.lock().expect("LocalNetwork.meta_nodes lock guard poison").insert(
            addr.clone(),
            MetaNode {
                total,
                used,
                partitions: HashMap::new(),
            },
        );
        addr
    }

    pub fn attach_cluster(&self, cluster: &Arc<Cluster>) {
        *self.cluster.write().expect("LocalNetwork.cluster lock guard poison") = Some(Arc::downgrade(cluster));
    }

    pub fn data_node(&self, addr: &str) -> Arc<DataNode> {
        self.data_nodes
            .read()
            .expect("LocalNetwork.data_nodes lock guard poison")
            .get(addr)
            .cloned()
            .unwrap_or_else(|| panic!("no data node at {}", addr))
    }

    pub fn data_nodes(&self) -> Vec<Arc<DataNode>> {
        let mut nodes: Vec<_> = self
            .data_nodes
            .read()
            .expect("LocalNetwork.data_nodes lock guard poison")
            .values()
            .cloned()
            .collect();
        nodes.sort_by_key(|n| n.id);
        nodes
    }

    pub fn meta_replica(&self, addr: &str, partition_id: u64) -> Option<MetaReplica> {
        self.meta_nodes
            .lock()
            .expect("LocalNetwork.meta_nodes lock guard poison")
            .get(addr)
            .and_then(|n| n.partitions.get(&partition_id).cloned())
    }

    /// Lets a meta replica pretend it applied more of its log.
    pub fn set_meta_progress(&self, addr: &str, partition_id: u64, apply_id: u64, max_inode_id: u64) {
        let mut nodes = self.meta_nodes.lock().expect("LocalNetwork.meta_nodes lock guard poison");
        if let Some(replica) = nodes.get_mut(addr).and_then(|n| n.partitions.get_mut(&partition_id)) {
            replica.apply_id = apply_id;
            replica.max_inode_id = max_inode_id;
            replica.inode_count = max_inode_id.saturating_sub(replica.start);
        }
    }

    pub fn set_down(&self, addr: &str, down: bool) {
        let mut set = self.down.lock().expect("LocalNetwork.down lock guard poison");
        if down {
            set.insert(addr.to_string());
        } else {
            set.remove(addr);
        }
    }

    pub fn set_admin_delay(&self, delay: Option<Duration>) {
        *self.admin_delay.lock().expect("LocalNetwork.admin_delay lock guard poison") = delay;
    }

    /// Every admin task that reached a node, as `(addr, partition, request)`.
    pub fn sent_tasks(&self) -> Vec<(String, u64, TaskRequest)> {
        self.sent.lock().expect("LocalNetwork.sent lock guard poison").clone()
    }

    pub fn sent_names(&self, partition_id: u64) -> Vec<(String, &'static str)> {
        self.sent_tasks()
            .into_iter()
            .filter(|(_, pid, _)| *pid == partition_id)
            .map(|(addr, _, request)| (addr, request.name()))
            .collect()
    }

    /// Feeds every reachable node's heartbeat straight into the cluster.
    pub async fn heartbeat(&self, cluster: &Cluster) {
        for node in self.data_nodes() {
            if self.is_down(&node.addr) {
                continue;
            }
            cluster
                .handle_data_node_heartbeat(&node.addr, node.space.heartbeat_report())
                .await;
        }
        let meta: Vec<(String, MetaNodeHeartbeatResponse)> = {
            let nodes = self.meta_nodes.lock().expect("LocalNetwork.meta_nodes lock guard poison");
            nodes
                .iter()
                .filter(|(addr, _)| !self.is_down(addr))
                .map(|(addr, node)| (addr.clone(), meta_heartbeat(node)))
                .collect()
        };
        for (addr, response) in meta {
            cluster.handle_meta_node_heartbeat(&addr, response).await;
        }
    }

    /// Like a heartbeat, but every replica on `addr` reports itself unavailable.
    pub async fn heartbeat_unavailable(&self, cluster: &Cluster, addr: &str) {
        let mut response = self.data_node(addr).space.heartbeat_report();
        for report in &mut response.partition_reports {
            report.status = PartitionStatus::Unavailable;
        }
        cluster.handle_data_node_heartbeat(addr, response).await;
    }

    /// Makes every data partition replica re-read its hosts and recompute leadership.
    pub async fn refresh_leaders(&self) {
        for node in self.data_nodes() {
            for partition in node.space.partitions() {
                partition.update_replica_hosts(self).await.unwrap();
            }
        }
    }

    fn is_down(&self, addr: &str) -> bool {
        self.down.lock().expect("LocalNetwork.down lock guard poison").contains(addr)
    }

    fn check_reachable(&self, addr: &str) -> Result<(), RpcError> {
        if self.is_down(addr) {
            return Err(RpcError::Timeout(Duration::from_secs(5)));
        }
        Ok(())
    }

    fn execute_meta_task(&self, addr: &str, task: &AdminTask) -> Option<TaskResponse> {
        let mut nodes = self.meta_nodes.lock().expect("LocalNetwork.meta_nodes lock guard poison");
        let node = nodes.get_mut(addr)?;
        let response = match &task.request {
            TaskRequest::MetaNodeHeartbeat => TaskResponse::MetaNodeHeartbeat(meta_heartbeat(node)),
            TaskRequest::CreateMetaPartition(request) => {
                node.partitions.entry(task.partition_id).or_insert_with(|| MetaReplica {
                    volume_id: request.volume_id.clone(),
                    start: request.start,
                    end: request.end,
                    max_inode_id: request.start,
                    apply_id: 0,
                    inode_count: 0,
                    dentry_count: 0,
                });
                TaskResponse::CreateMetaPartition(TaskResult::succeeded())
            }
            TaskRequest::UpdateMetaPartition(request) => match node.partitions.get_mut(&task.partition_id) {
                Some(replica) => {
                    replica.end = request.end;
                    TaskResponse::UpdateMetaPartition(TaskResult::succeeded())
                }
                None => TaskResponse::failure_for(&task.request, "no such meta partition"),
            },
            TaskRequest::DeleteMetaPartition => {
                node.partitions.remove(&task.partition_id);
                TaskResponse::DeleteMetaPartition(TaskResult::succeeded())
            }
            TaskRequest::LoadMetaPartition => match node.partitions.get(&task.partition_id) {
                Some(replica) => TaskResponse::LoadMetaPartition(LoadMetaPartitionResponse {
                    result: TaskResult::succeeded(),
                    partition_id: task.partition_id,
                    apply_id: replica.apply_id,
                    max_inode: replica.max_inode_id,
                    inode_count: replica.inode_count,
                    dentry_count: replica.dentry_count,
                }),
                None => TaskResponse::failure_for(&task.request, "no such meta partition"),
            },
            TaskRequest::AddRaftMember(_) => TaskResponse::AddRaftMember(TaskResult::succeeded()),
            TaskRequest::RemoveRaftMember(_) => TaskResponse::RemoveRaftMember(TaskResult::succeeded()),
            TaskRequest::TryToLeader => TaskResponse::TryToLeader(TaskResult::succeeded()),
            other => TaskResponse::failure_for(other, "data tasks are not served by a meta node"),
        };
        Some(response)
    }

    fn cluster(&self) -> Option<Arc<Cluster>> {
        self.cluster
            .read()
            .expect("LocalNetwork.cluster lock guard poison")
            .as_ref()
            .and_then(Weak::upgrade)
    }
}

fn meta_heartbeat(node: &MetaNode) -> MetaNodeHeartbeatResponse {
    let mut partition_reports: Vec<MetaPartitionReport> = node
        .partitions
        .iter()
        .map(|(partition_id, replica)| MetaPartitionReport {
            partition_id: *partition_id,
            volume_id: replica.volume_id.clone(),
            start: replica.start,
            end: replica.end,
            max_inode_id: replica.max_inode_id,
            status: PartitionStatus::ReadWrite,
            is_leader: false,
            inode_count: replica.inode_count,
            dentry_count: replica.dentry_count,
        })
        .collect();
    partition_reports.sort_by_key(|r| r.partition_id);

    MetaNodeHeartbeatResponse {
        result: TaskResult::succeeded(),
        total: node.total,
        used: node.used,
        partition_reports,
    }
}

fn remote_err(message: impl ToString) -> RpcError {
    RpcError::Remote {
        code: ResultCode::Err,
        message: message.to_string(),
    }
}

#[async_trait::async_trait]
impl NodeTransport for LocalNetwork {
    async fn send_admin_task(&self, addr: &str, task: &AdminTask) -> Result<TaskResponse, RpcError> {
        let delay = *self.admin_delay.lock().expect("LocalNetwork.admin_delay lock guard poison");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_reachable(addr)?;
        self.sent
            .lock()
            .expect("LocalNetwork.sent lock guard poison")
            .push((addr.to_string(), task.partition_id, task.request.clone()));

        if let Some(response) = self.execute_meta_task(addr, task) {
            return Ok(response);
        }
        let node = self
            .data_nodes
            .read()
            .expect("LocalNetwork.data_nodes lock guard poison")
            .get(addr)
            .cloned()
            .ok_or_else(|| RpcError::InvalidAddress(addr.to_string()))?;
        Ok(node.handler.execute(task.clone()).await)
    }
}

#[async_trait::async_trait]
impl PeerClient for LocalNetwork {
    async fn fetch_extent_inventory(
        &self,
        addr: &str,
        partition_id: u64,
        mode: ExtentRepairMode,
    ) -> Result<Vec<ExtentInfo>, RpcError> {
        self.check_reachable(addr)?;
        let partition = self
            .data_node(addr)
            .space
            .partition(partition_id)
            .ok_or_else(|| remote_err("no such partition"))?;
        partition.all_extents_meta(mode).map_err(remote_err)
    }

    async fn read_extent(
        &self,
        addr: &str,
        partition_id: u64,
        extent_id: ExtentId,
        offset: u64,
        size: u32,
    ) -> Result<Bytes, RpcError> {
        self.check_reachable(addr)?;
        let space = self.data_node(addr).space.clone();
        if let Some(partition) = space.partition(partition_id) {
            return partition.read(extent_id, offset, size).map_err(remote_err);
        }
        match space.ec_partition(partition_id) {
            Some(partition) => partition.local_read(extent_id, offset, size).map_err(remote_err),
            None => Err(remote_err("no such partition")),
        }
    }

    async fn notify_repair(&self, addr: &str, partition_id: u64, task: &RepairTask) -> Result<(), RpcError> {
        self.check_reachable(addr)?;
        let request = Packet::request(Opcode::NotifyRepair, partition_id).with_data(serde_json::to_vec(task)?);
        self.data_node(addr).handler.handle(request).await.into_result()?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl MasterClient for LocalNetwork {
    async fn partition_hosts(&self, partition_id: u64) -> Result<Vec<String>, RpcError> {
        let cluster = self
            .cluster()
            .ok_or_else(|| RpcError::InvalidAddress(CLUSTER_ADDR.to_string()))?;
        cluster.partition_hosts(partition_id).await.map_err(|e| RpcError::Remote {
            code: ResultCode::NotExist,
            message: e.to_string(),
        })
    }
}

// ------- Cluster setup -------

pub struct TestCluster {
    pub cluster: Arc<Cluster>,
    pub store: Arc<InMemoryClusterStore>,
    pub network: Arc<LocalNetwork>,
    pub consensus: Arc<FakeConsensus>,
}

impl TestCluster {
    /// A cluster with `data_nodes` registered data nodes in node-set 1, each already reported
    /// once.
    pub async fn start(data_nodes: u64) -> TestCluster {
        let network = LocalNetwork::new();
        let consensus = FakeConsensus::new();
        let store = Arc::new(InMemoryClusterStore::new());
        let cluster = Cluster::new(
            logger(),
            CLUSTER_ADDR,
            cluster_options(),
            store.clone(),
            network.clone(),
        );
        network.attach_cluster(&cluster);

        for id in 1..=data_nodes {
            let node = network.start_data_node(id, Some(consensus.clone()), default_tiny_extent_ids());
            cluster.register_node(id, &node.addr, NodeKind::Data, 1).unwrap();
        }
        network.heartbeat(&cluster).await;

        TestCluster {
            cluster,
            store,
            network,
            consensus,
        }
    }

    /// Creates a volume and one data partition in it, then lets every replica report.
    pub async fn data_partition(&self, replica_num: u8) -> u64 {
        self.cluster.create_volume("ltptest", replica_num).await.unwrap();
        let partition = self.cluster.create_data_partition("ltptest", 1 << 30).await.unwrap();
        self.network.refresh_leaders().await;
        self.network.heartbeat(&self.cluster).await;
        partition.partition_id()
    }

    pub async fn hosts(&self, partition_id: u64) -> Vec<String> {
        self.cluster.partition_hosts(partition_id).await.unwrap()
    }

    pub async fn peer_addrs(&self, partition_id: u64) -> Vec<String> {
        let partition = self.cluster.partition(partition_id).unwrap();
        partition.membership().await.peers.into_iter().map(|p| p.addr).collect()
    }

    pub fn node_id(&self, addr: &str) -> NodeId {
        self.network.data_node(addr).id
    }
}

pub fn create_request(hosts: &[(NodeId, String)]) -> CreateDataPartitionRequest {
    CreateDataPartitionRequest {
        volume_id: "ltptest".to_string(),
        partition_size: 1 << 30,
        random_write: true,
        peers: hosts.iter().map(|(id, addr)| Peer::new(*id, addr.clone())).collect(),
        hosts: hosts.iter().map(|(_, addr)| addr.clone()).collect(),
    }
}
