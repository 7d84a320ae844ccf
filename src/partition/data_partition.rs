use crate::consensus::{ConfChangeType, ConsensusError, ConsensusFactory, ConsensusGroup, NodeId, Peer};
use crate::options::DataNodeOptionsValidated;
use crate::partition::{
    create_time_now, read_meta_file, status_from_usage, write_meta_file, DataPartitionMeta, Disk,
    LoadExtentHeaderStatus, MetaFileError, PartitionStatus,
};
use crate::repair::ExtentRepairMode;
use crate::rpc::{LoadDataPartitionResponse, MasterClient, PartitionReport, RpcError, TaskResult};
use crate::storage::{is_disk_error, ExtentCrc, ExtentFilter, ExtentId, ExtentInfo, ExtentStore, ExtentStoreFactory};
use crate::util::TickerHandle;
use bytes::Bytes;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    #[error("Extent store I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Meta(#[from] MetaFileError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    // Refreshing the host list from the cluster failed. The caller skips its cycle.
    #[error("Replica host refresh failed: {0}")]
    HostRefresh(#[from] RpcError),

    #[error("Partition {0} has no consensus group")]
    NoConsensusGroup(u64),

    #[error("Partition directory name '{0}' is not recognized")]
    UnrecognizedDirectory(String),
}

/// Everything needed to create a brand new replica.
#[derive(Clone, Debug)]
pub struct DataPartitionConfig {
    pub volume_id: String,
    pub partition_id: u64,
    pub partition_size: u64,
    pub random_write: bool,
    pub peers: Vec<Peer>,
    pub hosts: Vec<String>,
}

/// Node-wide collaborators shared by all data partitions of one node.
#[derive(Clone)]
pub struct PartitionContext {
    pub logger: slog::Logger,
    pub node_id: NodeId,
    pub local_addr: String,
    pub store_factory: Arc<dyn ExtentStoreFactory>,
    pub consensus_factory: Option<Arc<dyn ConsensusFactory>>,
    pub options: Arc<DataNodeOptionsValidated>,
}

struct PartitionState {
    status: PartitionStatus,
    used: u64,
    usage_refreshed_at: Option<Instant>,
    replica_hosts: Vec<String>,
    hosts_refreshed_at: Option<Instant>,
    is_leader: bool,
}

/// DataPartition is this node's replica of one data partition: its extent store, its place in
/// the raft group and the status it advertises to the cluster.
pub struct DataPartition {
    logger: slog::Logger,
    volume_id: String,
    partition_id: u64,
    partition_size: u64,
    random_write: bool,
    create_time: String,
    node_id: NodeId,
    local_addr: String,
    path: PathBuf,
    disk: Arc<Disk>,
    store: Arc<dyn ExtentStore>,
    consensus: Option<Arc<dyn ConsensusGroup>>,
    options: Arc<DataNodeOptionsValidated>,
    state: RwLock<PartitionState>,
    peers: RwLock<Vec<Peer>>,
    snapshot: RwLock<Vec<ExtentCrc>>,
    load_extent_header_status: RwLock<LoadExtentHeaderStatus>,
    apply_id: AtomicU64,
    last_truncate_id: AtomicU64,
    scheduler: Mutex<Option<TickerHandle>>,
}

pub(crate) fn partition_dir_name(partition_id: u64, partition_size: u64) -> String {
    format!("datapartition_{}_{}", partition_id, partition_size)
}

/// Inverse of `partition_dir_name()`.
pub(crate) fn parse_partition_dir_name(name: &str) -> Option<(u64, u64)> {
    let mut parts = name.strip_prefix("datapartition_")?.splitn(2, '_');
    let partition_id = parts.next()?.parse().ok()?;
    let partition_size = parts.next()?.parse().ok()?;
    Some((partition_id, partition_size))
}

impl DataPartition {
    /// Creates the partition directory on `disk`, opens an empty store and persists the meta file.
    pub fn create(
        context: &PartitionContext,
        disk: Arc<Disk>,
        config: DataPartitionConfig,
    ) -> Result<Arc<Self>, PartitionError> {
        let path = disk.path().join(partition_dir_name(config.partition_id, config.partition_size));
        fs::create_dir_all(&path)?;

        let mut peers = config.peers;
        peers.sort_by_key(|p| p.id);
        let meta = DataPartitionMeta {
            volume_id: config.volume_id,
            partition_id: config.partition_id,
            partition_size: config.partition_size,
            create_time: create_time_now(),
            random_write: config.random_write,
            peers,
        };
        meta.validate()?;

        let partition = Self::open(context, disk, path, meta, config.hosts)?;
        partition.store_meta()?;
        Ok(partition)
    }

    /// Reopens a partition from the meta file in `dir`, as on node restart. Hosts are unknown
    /// until the first refresh from the cluster.
    pub fn load(context: &PartitionContext, disk: Arc<Disk>, dir: &Path) -> Result<Arc<Self>, PartitionError> {
        let meta: DataPartitionMeta = read_meta_file(dir)?;
        meta.validate()?;

        let dir_name = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        match parse_partition_dir_name(dir_name) {
            Some((partition_id, _)) if partition_id == meta.partition_id => {}
            _ => return Err(PartitionError::UnrecognizedDirectory(dir_name.to_string())),
        }

        Self::open(context, disk, dir.to_path_buf(), meta, Vec::new())
    }

    fn open(
        context: &PartitionContext,
        disk: Arc<Disk>,
        path: PathBuf,
        meta: DataPartitionMeta,
        hosts: Vec<String>,
    ) -> Result<Arc<Self>, PartitionError> {
        let logger = context.logger.new(slog::o!("PartitionId" => meta.partition_id));
        let store = context
            .store_factory
            .open(&path, meta.partition_id, meta.partition_size)?;

        let consensus = match &context.consensus_factory {
            Some(factory) => Some(factory.start_group(meta.partition_id, context.node_id, &meta.peers)?),
            None => None,
        };

        let partition = Arc::new(DataPartition {
            logger,
            volume_id: meta.volume_id,
            partition_id: meta.partition_id,
            partition_size: meta.partition_size,
            random_write: meta.random_write,
            create_time: meta.create_time,
            node_id: context.node_id,
            local_addr: context.local_addr.clone(),
            path,
            disk,
            store,
            consensus,
            options: context.options.clone(),
            state: RwLock::new(PartitionState {
                status: PartitionStatus::ReadWrite,
                used: 0,
                usage_refreshed_at: None,
                replica_hosts: hosts,
                hosts_refreshed_at: None,
                is_leader: false,
            }),
            peers: RwLock::new(meta.peers),
            snapshot: RwLock::new(Vec::new()),
            load_extent_header_status: RwLock::new(LoadExtentHeaderStatus::NotStarted),
            apply_id: AtomicU64::new(0),
            last_truncate_id: AtomicU64::new(0),
            scheduler: Mutex::new(None),
        });

        partition.status_update();
        slog::info!(partition.logger, "Opened partition at {:?}", partition.path);
        Ok(partition)
    }

    /// Recomputes the status from usage and clamps it to the disk status. Usage is re-read from
    /// the store at most once per `usage_refresh_interval`; a failed read keeps the old status.
    pub fn status_update(&self) {
        let refresh_due = {
            let state = self.state.read().expect("DataPartition.state lock guard poison");
            state
                .usage_refreshed_at
                .map_or(true, |at| at.elapsed() >= self.options.usage_refresh_interval)
        };

        let fresh_usage = if refresh_due {
            match self.store.used_size() {
                Ok(used) => Some(used),
                Err(e) => {
                    slog::warn!(self.logger, "Reading usage failed: {}", e);
                    if self.record_disk_error(&e) {
                        self.clamp_to_disk();
                    }
                    return;
                }
            }
        } else {
            None
        };

        let extent_count = self.store.count();
        let disk_status = self.disk.status();

        let mut state = self.state.write().expect("DataPartition.state lock guard poison");
        if let Some(used) = fresh_usage {
            state.used = used;
            state.usage_refreshed_at = Some(Instant::now());
        }

        let computed = status_from_usage(
            state.used,
            self.partition_size,
            extent_count,
            self.options.max_active_extents,
        );
        let status = computed.clamp_to_disk(disk_status);
        if status != state.status {
            slog::info!(self.logger, "Status {:?} -> {:?}", state.status, status);
        }
        state.status = status;
    }

    /// Classifies `error`. A disk error marks the disk unavailable and immediately propagates
    /// to this partition's status. Returns whether it was a disk error.
    pub fn check_disk_error(&self, error: &io::Error) -> bool {
        if self.record_disk_error(error) {
            self.clamp_to_disk();
            true
        } else {
            false
        }
    }

    fn record_disk_error(&self, error: &io::Error) -> bool {
        if !is_disk_error(error) {
            return false;
        }
        slog::error!(self.logger, "Disk error on {:?}: {}", self.disk.path(), error);
        self.disk.record_io_error();
        true
    }

    fn clamp_to_disk(&self) {
        let disk_status = self.disk.status();
        let mut state = self.state.write().expect("DataPartition.state lock guard poison");
        state.status = state.status.clamp_to_disk(disk_status);
    }

    /// Returns `(leader address, whether this replica leads)`.
    ///
    /// With a consensus group the answer comes from its current leader. Without one the first
    /// host is taken to be the leader.
    pub fn is_raft_leader(&self) -> (Option<String>, bool) {
        match &self.consensus {
            Some(consensus) => {
                let (leader_id, _term) = consensus.leader_term();
                if leader_id == 0 {
                    return (None, false);
                }
                let leader_addr = self.peers().into_iter().find(|p| p.id == leader_id).map(|p| p.addr);
                (leader_addr, leader_id == self.node_id)
            }
            None => {
                let hosts = self.replica_hosts();
                let leader_addr = hosts.first().cloned();
                let is_leader = leader_addr.as_deref() == Some(self.local_addr.as_str());
                (leader_addr, is_leader)
            }
        }
    }

    /// Refreshes the host list from the cluster when the cached one is stale, then recomputes
    /// leadership.
    pub async fn update_replica_hosts(&self, master: &dyn MasterClient) -> Result<(), PartitionError> {
        let refresh_due = {
            let state = self.state.read().expect("DataPartition.state lock guard poison");
            state.replica_hosts.is_empty()
                || state
                    .hosts_refreshed_at
                    .map_or(true, |at| at.elapsed() >= self.options.replica_hosts_refresh_interval)
        };

        if refresh_due {
            let hosts = master.partition_hosts(self.partition_id).await?;
            let mut state = self.state.write().expect("DataPartition.state lock guard poison");
            if state.replica_hosts != hosts {
                slog::info!(self.logger, "Replica hosts {:?} -> {:?}", state.replica_hosts, hosts);
            }
            state.replica_hosts = hosts;
            state.hosts_refreshed_at = Some(Instant::now());
        }

        let (_, is_leader) = self.is_raft_leader();
        self.state.write().expect("DataPartition.state lock guard poison").is_leader = is_leader;
        Ok(())
    }

    pub fn reload_snapshot(&self) -> Result<(), PartitionError> {
        let snapshot = match self.store.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.check_disk_error(&e);
                return Err(e.into());
            }
        };
        *self.snapshot.write().expect("DataPartition.snapshot lock guard poison") = snapshot;
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<ExtentCrc> {
        self.snapshot.read().expect("DataPartition.snapshot lock guard poison").clone()
    }

    /// Reloads extent headers. The snapshot is only served once this has finished.
    pub fn force_load_header(&self) {
        self.set_load_extent_header_status(LoadExtentHeaderStatus::InProgress);
        match self.reload_snapshot() {
            Ok(()) => self.set_load_extent_header_status(LoadExtentHeaderStatus::Finished),
            Err(e) => {
                slog::warn!(self.logger, "Loading extent headers failed: {}", e);
                self.set_load_extent_header_status(LoadExtentHeaderStatus::NotStarted);
            }
        }
    }

    fn set_load_extent_header_status(&self, status: LoadExtentHeaderStatus) {
        *self
            .load_extent_header_status
            .write()
            .expect("DataPartition.load_extent_header_status lock guard poison") = status;
    }

    pub fn load_extent_header_status(&self) -> LoadExtentHeaderStatus {
        *self
            .load_extent_header_status
            .read()
            .expect("DataPartition.load_extent_header_status lock guard poison")
    }

    pub fn load_response(&self) -> LoadDataPartitionResponse {
        let snapshot = match self.load_extent_header_status() {
            LoadExtentHeaderStatus::Finished => self.snapshot(),
            _ => Vec::new(),
        };

        LoadDataPartitionResponse {
            result: TaskResult::succeeded(),
            partition_id: self.partition_id,
            partition_status: self.status(),
            used: self.used(),
            snapshot,
        }
    }

    /// Extent inventory served to a repairing leader.
    pub fn all_extents_meta(&self, mode: ExtentRepairMode) -> Result<Vec<ExtentInfo>, PartitionError> {
        let filter = match mode {
            ExtentRepairMode::Tiny => ExtentFilter::Tiny,
            ExtentRepairMode::Normal => ExtentFilter::Normal,
        };
        self.store.watermarks(filter).map_err(|e| {
            self.check_disk_error(&e);
            e.into()
        })
    }

    pub fn read(&self, extent_id: ExtentId, offset: u64, size: u32) -> Result<Bytes, PartitionError> {
        let mut buf = vec![0; size as usize];
        match self.store.read(extent_id, offset, &mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(Bytes::from(buf))
            }
            Err(e) => {
                self.check_disk_error(&e);
                Err(e.into())
            }
        }
    }

    /// Proposes a membership change through raft. On success the local peer list follows and is
    /// persisted.
    pub async fn change_raft_member(
        &self,
        change: ConfChangeType,
        peer: Peer,
        context: Bytes,
    ) -> Result<(), PartitionError> {
        let consensus = self
            .consensus
            .as_ref()
            .ok_or(PartitionError::NoConsensusGroup(self.partition_id))?;

        slog::info!(self.logger, "Raft member change {:?} {:?}", change, peer);
        consensus.change_member(change, peer.clone(), context).await?;
        self.apply_member_change(change, peer)?;
        Ok(())
    }

    /// Applies a committed membership change to the local peer list. Returns whether the list
    /// changed.
    pub fn apply_member_change(&self, change: ConfChangeType, peer: Peer) -> Result<bool, PartitionError> {
        let changed = {
            let mut peers = self.peers.write().expect("DataPartition.peers lock guard poison");
            let position = peers.iter().position(|p| p.id == peer.id);
            match (change, position) {
                (ConfChangeType::AddNode, None) => {
                    peers.push(peer);
                    peers.sort_by_key(|p| p.id);
                    true
                }
                (ConfChangeType::RemoveNode, Some(index)) => {
                    peers.remove(index);
                    true
                }
                _ => false,
            }
        };

        if changed {
            self.store_meta()?;
        }
        Ok(changed)
    }

    /// Replaces hosts and peers with the committed view pushed by the cluster.
    pub fn update_peers(&self, hosts: Vec<String>, mut peers: Vec<Peer>) -> Result<(), PartitionError> {
        peers.sort_by_key(|p| p.id);
        *self.peers.write().expect("DataPartition.peers lock guard poison") = peers;
        {
            let mut state = self.state.write().expect("DataPartition.state lock guard poison");
            state.replica_hosts = hosts;
            state.hosts_refreshed_at = Some(Instant::now());
        }
        self.store_meta()
    }

    pub async fn try_to_leader(&self) -> Result<(), PartitionError> {
        let consensus = self
            .consensus
            .as_ref()
            .ok_or(PartitionError::NoConsensusGroup(self.partition_id))?;
        consensus.try_to_leader().await?;
        Ok(())
    }

    pub fn store_meta(&self) -> Result<(), PartitionError> {
        let meta = DataPartitionMeta {
            volume_id: self.volume_id.clone(),
            partition_id: self.partition_id,
            partition_size: self.partition_size,
            create_time: self.create_time.clone(),
            random_write: self.random_write,
            peers: self.peers(),
        };
        meta.validate()?;
        write_meta_file(&self.path, &meta)?;
        Ok(())
    }

    pub fn report(&self) -> PartitionReport {
        let state = self.state.read().expect("DataPartition.state lock guard poison");
        PartitionReport {
            partition_id: self.partition_id,
            volume_id: self.volume_id.clone(),
            status: state.status,
            total: self.partition_size,
            used: state.used,
            extent_count: self.store.count() as u64,
            is_leader: state.is_leader,
            need_compare: self.load_extent_header_status() == LoadExtentHeaderStatus::Finished,
            disk_path: self.disk.path().display().to_string(),
        }
    }

    /// Installs the background scheduler. It runs until `stop()` or until the partition drops.
    pub(crate) fn attach_scheduler(&self, handle: TickerHandle) {
        *self.scheduler.lock().expect("DataPartition.scheduler mutex guard poison") = Some(handle);
    }

    pub fn stop(&self) {
        self.scheduler
            .lock()
            .expect("DataPartition.scheduler mutex guard poison")
            .take();
        self.store.close();
        slog::info!(self.logger, "Stopped");
    }

    pub fn logger(&self) -> &slog::Logger {
        &self.logger
    }

    pub fn random_write(&self) -> bool {
        self.random_write
    }

    pub fn partition_id(&self) -> u64 {
        self.partition_id
    }

    pub fn volume_id(&self) -> &str {
        &self.volume_id
    }

    pub fn partition_size(&self) -> u64 {
        self.partition_size
    }

    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn disk(&self) -> &Arc<Disk> {
        &self.disk
    }

    pub fn store(&self) -> &Arc<dyn ExtentStore> {
        &self.store
    }

    pub fn status(&self) -> PartitionStatus {
        self.state.read().expect("DataPartition.state lock guard poison").status
    }

    pub fn used(&self) -> u64 {
        self.state.read().expect("DataPartition.state lock guard poison").used
    }

    pub fn is_leader(&self) -> bool {
        self.state.read().expect("DataPartition.state lock guard poison").is_leader
    }

    pub fn replica_hosts(&self) -> Vec<String> {
        self.state
            .read()
            .expect("DataPartition.state lock guard poison")
            .replica_hosts
            .clone()
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.peers.read().expect("DataPartition.peers lock guard poison").clone()
    }

    pub fn apply_id(&self) -> u64 {
        self.apply_id.load(Ordering::Acquire)
    }

    pub fn set_apply_id(&self, apply_id: u64) {
        self.apply_id.store(apply_id, Ordering::Release);
    }

    pub fn last_truncate_id(&self) -> u64 {
        self.last_truncate_id.load(Ordering::Acquire)
    }

    pub fn set_last_truncate_id(&self, truncate_id: u64) {
        self.last_truncate_id.store(truncate_id, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DataNodeOptions;
    use crate::storage::InMemoryStoreFactory;
    use std::convert::TryFrom;
    use tokio::time::Duration;

    struct FixedHosts(Vec<String>);

    #[async_trait::async_trait]
    impl MasterClient for FixedHosts {
        async fn partition_hosts(&self, _partition_id: u64) -> Result<Vec<String>, RpcError> {
            Ok(self.0.clone())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        factory: Arc<InMemoryStoreFactory>,
        context: PartitionContext,
        disk: Arc<Disk>,
    }

    fn fixture(options: DataNodeOptions) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(InMemoryStoreFactory::new());
        let context = PartitionContext {
            logger: slog::Logger::root(slog::Discard, slog::o!()),
            node_id: 1,
            local_addr: "10.0.0.1:17310".to_string(),
            store_factory: factory.clone(),
            consensus_factory: None,
            options: Arc::new(DataNodeOptionsValidated::try_from(options).unwrap()),
        };
        let disk = Arc::new(Disk::new(dir.path(), 1 << 40));
        Fixture {
            _dir: dir,
            factory,
            context,
            disk,
        }
    }

    fn config(partition_id: u64) -> DataPartitionConfig {
        DataPartitionConfig {
            volume_id: "ltptest".to_string(),
            partition_id,
            partition_size: 1024,
            random_write: false,
            peers: vec![Peer::new(2, "10.0.0.2:17310"), Peer::new(1, "10.0.0.1:17310")],
            hosts: vec!["10.0.0.1:17310".to_string(), "10.0.0.2:17310".to_string()],
        }
    }

    fn eager_usage() -> DataNodeOptions {
        DataNodeOptions {
            usage_refresh_interval: Some(Duration::from_secs(0)),
            ..Default::default()
        }
    }

    #[test]
    fn dir_name_round_trip() {
        assert_eq!("datapartition_7_1024", partition_dir_name(7, 1024));
        assert_eq!(Some((7, 1024)), parse_partition_dir_name("datapartition_7_1024"));
        assert_eq!(None, parse_partition_dir_name("metapartition_7"));
        assert_eq!(None, parse_partition_dir_name("datapartition_x_1024"));
    }

    #[test]
    fn create_persists_sorted_peers_and_load_reopens() {
        let f = fixture(DataNodeOptions::default());
        let partition = DataPartition::create(&f.context, f.disk.clone(), config(7)).unwrap();
        assert_eq!(vec![1, 2], partition.peers().iter().map(|p| p.id).collect::<Vec<_>>());

        let meta: DataPartitionMeta = read_meta_file(partition.path()).unwrap();
        assert_eq!(7, meta.partition_id);
        assert_eq!(1, meta.peers[0].id);

        let path = partition.path().to_path_buf();
        partition.stop();
        let reloaded = DataPartition::load(&f.context, f.disk.clone(), &path).unwrap();
        assert_eq!("ltptest", reloaded.volume_id());
        assert_eq!(meta.peers, reloaded.peers());
        assert!(reloaded.replica_hosts().is_empty());
    }

    #[test]
    fn full_partition_goes_read_only() {
        let f = fixture(eager_usage());
        let partition = DataPartition::create(&f.context, f.disk.clone(), config(3)).unwrap();
        assert_eq!(PartitionStatus::ReadWrite, partition.status());

        let store = f.factory.store(3).unwrap();
        store.create(100, 0).unwrap();
        store.write(100, 0, &[7u8; 1024]).unwrap();

        partition.status_update();
        assert_eq!(PartitionStatus::ReadOnly, partition.status());
    }

    #[test]
    fn status_clamped_to_disk() {
        let f = fixture(eager_usage());
        let partition = DataPartition::create(&f.context, f.disk.clone(), config(3)).unwrap();

        f.disk.set_status(PartitionStatus::ReadOnly);
        partition.status_update();
        assert_eq!(PartitionStatus::ReadOnly, partition.status());

        f.disk.set_status(PartitionStatus::Unavailable);
        partition.status_update();
        assert_eq!(PartitionStatus::Unavailable, partition.status());

        f.disk.set_status(PartitionStatus::ReadWrite);
        partition.status_update();
        assert_eq!(PartitionStatus::ReadWrite, partition.status());
    }

    #[test]
    fn disk_error_marks_partition_unavailable() {
        let f = fixture(eager_usage());
        let partition = DataPartition::create(&f.context, f.disk.clone(), config(4)).unwrap();
        let store = f.factory.store(4).unwrap();
        store.create(100, 0).unwrap();

        store.inject_io_failure(true);
        assert!(partition.read(100, 0, 1).is_err());

        assert_eq!(PartitionStatus::Unavailable, f.disk.status());
        assert_eq!(PartitionStatus::Unavailable, partition.status());
        assert_eq!(1, f.disk.read_error_count());
    }

    #[test]
    fn non_disk_error_leaves_status() {
        let f = fixture(eager_usage());
        let partition = DataPartition::create(&f.context, f.disk.clone(), config(4)).unwrap();

        // Reading a missing extent is a plain NotFound.
        assert!(partition.read(999, 0, 1).is_err());
        assert_eq!(PartitionStatus::ReadWrite, partition.status());
        assert_eq!(PartitionStatus::ReadWrite, f.disk.status());
    }

    #[tokio::test]
    async fn leadership_without_consensus_follows_first_host() {
        let f = fixture(DataNodeOptions::default());
        let partition = DataPartition::create(&f.context, f.disk.clone(), config(5)).unwrap();

        let master = FixedHosts(vec!["10.0.0.2:17310".to_string(), "10.0.0.1:17310".to_string()]);
        partition.update_replica_hosts(&master).await.unwrap();
        assert!(!partition.is_leader());
        assert_eq!(Some("10.0.0.2:17310".to_string()), partition.is_raft_leader().0);
    }

    #[test]
    fn member_change_persists_peers() {
        let f = fixture(DataNodeOptions::default());
        let partition = DataPartition::create(&f.context, f.disk.clone(), config(6)).unwrap();

        assert!(partition
            .apply_member_change(ConfChangeType::AddNode, Peer::new(3, "10.0.0.3:17310"))
            .unwrap());
        assert!(!partition
            .apply_member_change(ConfChangeType::AddNode, Peer::new(3, "10.0.0.3:17310"))
            .unwrap());
        assert!(partition
            .apply_member_change(ConfChangeType::RemoveNode, Peer::new(1, "10.0.0.1:17310"))
            .unwrap());

        let meta: DataPartitionMeta = read_meta_file(partition.path()).unwrap();
        assert_eq!(vec![2, 3], meta.peers.iter().map(|p| p.id).collect::<Vec<_>>());
    }

    #[test]
    fn load_response_serves_snapshot_after_headers_load() {
        let f = fixture(DataNodeOptions::default());
        let partition = DataPartition::create(&f.context, f.disk.clone(), config(8)).unwrap();
        let store = f.factory.store(8).unwrap();
        store.create(100, 0).unwrap();
        store.write(100, 0, b"hello").unwrap();
        assert!(partition.load_response().snapshot.is_empty());
        assert!(!partition.report().need_compare);

        partition.force_load_header();
        let response = partition.load_response();
        assert_eq!(LoadExtentHeaderStatus::Finished, partition.load_extent_header_status());
        assert!(response
            .snapshot
            .iter()
            .any(|e| e.extent_id == 100 && e.size == 5 && e.crc == crc32fast::hash(b"hello")));
    }
}
