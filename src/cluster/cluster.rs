use crate::cluster::task::{self, NodeTaskQueues, PendingTask};
use crate::cluster::{
    ClusterError, ClusterNode, ClusterPartition, ClusterStat, ClusterStore, NodeKind, PartitionKind, PartitionRecord,
    TaskError, Topology, Volume,
};
use crate::consensus::{NodeId, Peer};
use crate::options::ClusterOptionsValidated;
use crate::rpc::{
    AdminTask, CreateDataPartitionRequest, CreateMetaPartitionRequest, NodeTransport, TaskReply, TaskRequest,
    TaskResponse, TaskResult,
};
use crate::util::{spawn_ticker, supervised, TickerHandle};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::mpsc;

/// Cluster is the manager's view of the whole deployment: registered nodes, volumes and the
/// membership of every partition. It drives nodes exclusively through admin tasks, either
/// queued per node or sent synchronously when the caller needs the outcome.
pub struct Cluster {
    pub(crate) logger: slog::Logger,
    pub(crate) addr: String,
    pub(crate) options: Arc<ClusterOptionsValidated>,
    pub(crate) topology: Topology,
    volumes: RwLock<HashMap<String, Arc<Volume>>>,
    partitions: RwLock<HashMap<u64, Arc<ClusterPartition>>>,
    pub(crate) store: Arc<dyn ClusterStore>,
    pub(crate) transport: Arc<dyn NodeTransport>,
    pub(crate) tasks: NodeTaskQueues,
    next_partition_id: AtomicU64,
    pub(crate) stat: Mutex<ClusterStat>,
    schedulers: Mutex<Vec<TickerHandle>>,
}

impl Cluster {
    /// Creates the cluster and starts its task response dispatcher. `addr` is the address nodes
    /// see as the operator of every task.
    pub fn new(
        logger: slog::Logger,
        addr: impl Into<String>,
        options: Arc<ClusterOptionsValidated>,
        store: Arc<dyn ClusterStore>,
        transport: Arc<dyn NodeTransport>,
    ) -> Arc<Self> {
        let (tasks, replies) = task::create(logger.new(slog::o!("Task" => "NodeTaskQueue")), transport.clone());
        let cluster = Arc::new(Cluster {
            logger,
            addr: addr.into(),
            options,
            topology: Topology::new(),
            volumes: RwLock::new(HashMap::new()),
            partitions: RwLock::new(HashMap::new()),
            store,
            transport,
            tasks,
            next_partition_id: AtomicU64::new(1),
            stat: Mutex::new(ClusterStat::default()),
            schedulers: Mutex::new(Vec::new()),
        });

        let weak: Weak<Cluster> = Arc::downgrade(&cluster);
        tokio::spawn(run_dispatcher(cluster.logger.clone(), replies, move |reply| {
            weak.upgrade()
                .map(|cluster| async move { cluster.handle_task_reply(reply).await })
        }));
        cluster
    }

    /// Starts the heartbeat and consistency check loops. They stop with [`Cluster::stop`] or
    /// when the cluster is dropped.
    pub fn start_schedulers(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let heartbeat = spawn_ticker(self.logger.clone(), "HeartbeatScheduler", self.options.heartbeat_interval, move |_| {
            let weak = weak.clone();
            async move {
                if let Some(cluster) = weak.upgrade() {
                    cluster.heartbeat_tick();
                    cluster.check_node_liveness();
                    cluster.check_missing_replicas().await;
                    cluster.update_stat_info();
                }
            }
        });

        let weak = Arc::downgrade(self);
        let consistency = spawn_ticker(
            self.logger.clone(),
            "ConsistencyCheckScheduler",
            self.options.consistency_check_interval,
            move |_| {
                let weak = weak.clone();
                async move {
                    if let Some(cluster) = weak.upgrade() {
                        cluster.check_consistency().await;
                    }
                }
            },
        );

        let mut schedulers = self.schedulers.lock().expect("Cluster.schedulers lock guard poison");
        schedulers.push(heartbeat);
        schedulers.push(consistency);
    }

    pub fn stop(&self) {
        self.schedulers
            .lock()
            .expect("Cluster.schedulers lock guard poison")
            .clear();
    }

    pub fn logger(&self) -> &slog::Logger {
        &self.logger
    }

    pub fn options(&self) -> &ClusterOptionsValidated {
        &self.options
    }

    pub fn register_node(
        &self,
        id: NodeId,
        addr: &str,
        kind: NodeKind,
        node_set_id: u64,
    ) -> Result<Arc<ClusterNode>, ClusterError> {
        let node = Arc::new(ClusterNode::new(id, addr, kind, node_set_id));
        if !self.topology.register(node.clone()) {
            return Err(ClusterError::NodeAlreadyRegistered(addr.to_string()));
        }
        self.tasks.register_node(addr);
        slog::info!(self.logger, "Registered {:?} node {} ({}) in node-set {}", kind, id, addr, node_set_id);
        Ok(node)
    }

    pub fn node(&self, addr: &str) -> Option<Arc<ClusterNode>> {
        self.topology.node(addr)
    }

    pub fn nodes(&self, kind: NodeKind) -> Vec<Arc<ClusterNode>> {
        self.topology.nodes(kind)
    }

    pub async fn create_volume(&self, name: &str, replica_num: u8) -> Result<Arc<Volume>, ClusterError> {
        self.add_volume(Volume::new(name, replica_num)).await
    }

    /// Persists and registers a volume built by the caller.
    pub async fn add_volume(&self, volume: Volume) -> Result<Arc<Volume>, ClusterError> {
        let volume = Arc::new(volume);
        self.store.put_volume(&volume.record()).await?;
        self.volumes
            .write()
            .expect("Cluster.volumes lock guard poison")
            .insert(volume.name().to_string(), volume.clone());
        Ok(volume)
    }

    pub fn volume(&self, name: &str) -> Option<Arc<Volume>> {
        self.volumes
            .read()
            .expect("Cluster.volumes lock guard poison")
            .get(name)
            .cloned()
    }

    pub async fn mark_volume_delete(&self, name: &str) -> Result<(), ClusterError> {
        let volume = self
            .volume(name)
            .ok_or_else(|| ClusterError::VolumeNotFound(name.to_string()))?;
        volume.mark_delete();
        self.store.put_volume(&volume.record()).await?;
        Ok(())
    }

    /// Places a new data partition on the least used writable data nodes and creates a replica
    /// on each of them.
    pub async fn create_data_partition(
        &self,
        volume_name: &str,
        partition_size: u64,
    ) -> Result<Arc<ClusterPartition>, ClusterError> {
        let volume = self
            .volume(volume_name)
            .ok_or_else(|| ClusterError::VolumeNotFound(volume_name.to_string()))?;
        let nodes = self.choose_hosts(NodeKind::Data, volume.replica_num())?;

        let record = PartitionRecord {
            partition_id: self.next_partition_id.fetch_add(1, Ordering::SeqCst),
            volume_id: volume_name.to_string(),
            kind: PartitionKind::Data,
            partition_size,
            random_write: volume.random_write(),
            replica_num: volume.replica_num(),
            hosts: nodes.iter().map(|n| n.addr().to_string()).collect(),
            peers: nodes.iter().map(|n| Peer::new(n.id(), n.addr())).collect(),
            start: 0,
            end: 0,
        };
        self.store.put_partition(&record).await?;

        let request = CreateDataPartitionRequest {
            volume_id: record.volume_id.clone(),
            partition_size,
            random_write: record.random_write,
            peers: record.peers.clone(),
            hosts: record.hosts.clone(),
        };
        for node in &nodes {
            self.send_sync(node.addr(), record.partition_id, TaskRequest::CreateDataPartition(request.clone()))
                .await?;
        }

        let partition = self.load_partition(record);
        for node in &nodes {
            partition.ensure_replica(node);
        }
        Ok(partition)
    }

    /// Places a metadata partition covering `[start, end]` and creates it on every host.
    pub async fn create_meta_partition(
        &self,
        volume_name: &str,
        start: u64,
        end: u64,
    ) -> Result<Arc<ClusterPartition>, ClusterError> {
        let volume = self
            .volume(volume_name)
            .ok_or_else(|| ClusterError::VolumeNotFound(volume_name.to_string()))?;
        let nodes = self.choose_hosts(NodeKind::Meta, volume.replica_num())?;
        let record = PartitionRecord {
            partition_id: self.next_partition_id.fetch_add(1, Ordering::SeqCst),
            volume_id: volume_name.to_string(),
            kind: PartitionKind::Meta,
            partition_size: 0,
            random_write: false,
            replica_num: volume.replica_num(),
            hosts: nodes.iter().map(|n| n.addr().to_string()).collect(),
            peers: nodes.iter().map(|n| Peer::new(n.id(), n.addr())).collect(),
            start,
            end,
        };
        self.store.put_partition(&record).await?;

        let request = create_meta_request(&record);
        for node in &nodes {
            self.send_sync(node.addr(), record.partition_id, request.clone()).await?;
        }

        let partition = self.load_partition(record);
        for node in &nodes {
            partition.ensure_replica(node);
        }
        Ok(partition)
    }

    /// Adopts a partition whose record already exists, e.g. one restored from the store.
    pub fn load_partition(&self, record: PartitionRecord) -> Arc<ClusterPartition> {
        self.next_partition_id
            .fetch_max(record.partition_id + 1, Ordering::SeqCst);
        let partition = Arc::new(ClusterPartition::new(&self.logger, record));
        self.partitions
            .write()
            .expect("Cluster.partitions lock guard poison")
            .insert(partition.partition_id(), partition.clone());
        partition
    }

    pub(crate) fn next_partition_id(&self) -> u64 {
        self.next_partition_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn partition(&self, partition_id: u64) -> Option<Arc<ClusterPartition>> {
        self.partitions
            .read()
            .expect("Cluster.partitions lock guard poison")
            .get(&partition_id)
            .cloned()
    }

    pub fn partitions(&self) -> Vec<Arc<ClusterPartition>> {
        let mut partitions: Vec<Arc<ClusterPartition>> = self
            .partitions
            .read()
            .expect("Cluster.partitions lock guard poison")
            .values()
            .cloned()
            .collect();
        partitions.sort_by_key(|p| p.partition_id());
        partitions
    }

    /// Ordered hosts of a partition, as persisted.
    pub async fn partition_hosts(&self, partition_id: u64) -> Result<Vec<String>, ClusterError> {
        let partition = self
            .partition(partition_id)
            .ok_or(ClusterError::PartitionNotFound(partition_id))?;
        Ok(partition.hosts().await)
    }

    /// Tasks handed to node queues that have not been answered yet.
    pub fn pending_tasks(&self) -> Vec<PendingTask> {
        self.tasks.pending_tasks()
    }

    pub(crate) fn enqueue_task(&self, addr: &str, partition_id: u64, request: TaskRequest) -> bool {
        self.tasks.enqueue(addr, AdminTask::new(self.addr.clone(), partition_id, request))
    }

    /// Sends a task and waits for the node's answer. A response that reports failure is an error.
    pub(crate) async fn send_sync(
        &self,
        addr: &str,
        partition_id: u64,
        request: TaskRequest,
    ) -> Result<TaskResponse, TaskError> {
        let task = AdminTask::new(self.addr.clone(), partition_id, request);
        send_task(self.transport.as_ref(), addr, &task).await
    }

    pub(crate) fn choose_hosts(&self, kind: NodeKind, replica_num: u8) -> Result<Vec<Arc<ClusterNode>>, ClusterError> {
        let required = replica_num as usize;
        let nodes = self.topology.choose_hosts(kind, required, self.max_used_ratio(kind));
        if nodes.len() < required {
            return Err(ClusterError::NotEnoughNodes {
                kind,
                required,
                available: nodes.len(),
            });
        }
        Ok(nodes)
    }

    /// Nodes at or above this usage are not given new replicas.
    pub(crate) fn max_used_ratio(&self, kind: NodeKind) -> f64 {
        match kind {
            NodeKind::Data => self.options.space_warn_ratio,
            NodeKind::Meta => self.options.meta_node_memory_threshold,
        }
    }

    /// Routes one node response to its handler.
    pub async fn handle_task_reply(&self, reply: TaskReply) {
        let pending = match self.tasks.complete(reply.task_id) {
            Some(pending) => pending,
            None => {
                slog::debug!(self.logger, "Dropping reply to unknown task {} from {}", reply.task_id, reply.node_addr);
                return;
            }
        };

        let TaskReply {
            node_addr,
            partition_id,
            response,
            ..
        } = reply;
        match response {
            TaskResponse::DataNodeHeartbeat(response) => self.handle_data_node_heartbeat(&node_addr, response).await,
            TaskResponse::MetaNodeHeartbeat(response) => self.handle_meta_node_heartbeat(&node_addr, response).await,
            TaskResponse::LoadDataPartition(response) => {
                self.handle_load_data_partition_response(&node_addr, partition_id, &response)
            }
            TaskResponse::LoadMetaPartition(response) => {
                // Metadata loads are sent synchronously; a queued one is only logged.
                slog::debug!(self.logger, "LoadMetaPartition from {}: {:?}", node_addr, response.result);
            }
            TaskResponse::DeleteDataPartition(result) | TaskResponse::DeleteMetaPartition(result) => {
                self.handle_delete_partition_response(&node_addr, partition_id, &result).await
            }
            TaskResponse::CreateDataPartition(result)
            | TaskResponse::CreateMetaPartition(result)
            | TaskResponse::UpdateMetaPartition(result)
            | TaskResponse::AddRaftMember(result)
            | TaskResponse::RemoveRaftMember(result)
            | TaskResponse::TryToLeader(result)
            | TaskResponse::UpdatePartitionPeers(result)
            | TaskResponse::CreateEcPartition(result) => self.log_task_result(&pending, &result),
        }
    }

    fn log_task_result(&self, pending: &PendingTask, result: &TaskResult) {
        if result.status == crate::rpc::TaskStatus::Succeeded {
            slog::debug!(
                self.logger,
                "{} of partition {} on {} succeeded",
                pending.name,
                pending.partition_id,
                pending.node_addr
            );
        } else {
            slog::warn!(
                self.logger,
                "{} of partition {} on {} failed: {}",
                pending.name,
                pending.partition_id,
                pending.node_addr,
                result.message
            );
        }
    }
}

pub(crate) fn create_meta_request(record: &PartitionRecord) -> TaskRequest {
    TaskRequest::CreateMetaPartition(CreateMetaPartitionRequest {
        volume_id: record.volume_id.clone(),
        start: record.start,
        end: record.end,
        peers: record.peers.clone(),
        hosts: record.hosts.clone(),
    })
}

pub(crate) async fn send_task(
    transport: &dyn NodeTransport,
    addr: &str,
    task: &AdminTask,
) -> Result<TaskResponse, TaskError> {
    let name = task.request.name();
    let response = transport
        .send_admin_task(addr, task)
        .await
        .map_err(|source| TaskError::Rpc {
            addr: addr.to_string(),
            task: name,
            source,
        })?;

    if !response.is_success() {
        return Err(TaskError::Failed {
            addr: addr.to_string(),
            task: name,
            message: response.result().message.clone(),
        });
    }
    Ok(response)
}

// Ends once `dispatch` yields nothing (the cluster is gone) or every node worker has dropped
// its reply sender. A panicking handler loses only its own reply.
async fn run_dispatcher<F, Fut>(logger: slog::Logger, mut replies: mpsc::UnboundedReceiver<TaskReply>, mut dispatch: F)
where
    F: FnMut(TaskReply) -> Option<Fut>,
    Fut: Future<Output = ()> + Send + 'static,
{
    while let Some(reply) = replies.recv().await {
        let label = format!("TaskReply {} from {}", reply.task_id, reply.node_addr);
        let handling = match dispatch(reply) {
            Some(handling) => handling,
            None => return,
        };
        let _ = supervised(&logger, &label, handling).await;
    }
}
