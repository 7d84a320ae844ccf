use crate::cluster::{ClusterNode, MembershipError, PartitionKind, PartitionRecord, Replica};
use crate::consensus::Peer;
use crate::rpc::{LoadDataPartitionResponse, MetaPartitionReport, PartitionReport};
use crate::storage::{ExtentCrc, ExtentId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::{Duration, Instant};

/// Who holds a partition. Persisted by the cluster and pushed to nodes on every change.
#[derive(Clone, Debug, PartialEq)]
pub struct Membership {
    pub hosts: Vec<String>,
    pub peers: Vec<Peer>,
    pub replica_num: u8,
}

/// Inode range of a metadata partition. The last partition of a volume is open-ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MetaRange {
    pub start: u64,
    pub end: u64,
}

impl MetaRange {
    pub fn is_open_ended(&self) -> bool {
        self.end == u64::MAX
    }
}

struct CheckState {
    replicas: Vec<Replica>,
    missing_nodes: HashMap<String, Instant>,
    files_in_core: BTreeMap<ExtentId, Vec<(String, ExtentCrc)>>,
    loaded_counts: HashMap<String, usize>,
    needs_recovery: bool,
    range: MetaRange,
}

/// Cluster-side state of one partition: its persisted membership plus the replica registry
/// and consistency-check state rebuilt from heartbeats.
pub struct ClusterPartition {
    logger: slog::Logger,
    partition_id: u64,
    volume_id: String,
    kind: PartitionKind,
    partition_size: u64,
    random_write: bool,
    // Held across persistence, so an async lock.
    membership: tokio::sync::RwLock<Membership>,
    check: Mutex<CheckState>,
    operation: tokio::sync::Mutex<()>,
}

impl ClusterPartition {
    pub fn new(logger: &slog::Logger, record: PartitionRecord) -> Self {
        ClusterPartition {
            logger: logger.new(slog::o!("PartitionId" => record.partition_id)),
            partition_id: record.partition_id,
            volume_id: record.volume_id,
            kind: record.kind,
            partition_size: record.partition_size,
            random_write: record.random_write,
            membership: tokio::sync::RwLock::new(Membership {
                hosts: record.hosts,
                peers: record.peers,
                replica_num: record.replica_num,
            }),
            check: Mutex::new(CheckState {
                replicas: Vec::new(),
                missing_nodes: HashMap::new(),
                files_in_core: BTreeMap::new(),
                loaded_counts: HashMap::new(),
                needs_recovery: false,
                range: MetaRange {
                    start: record.start,
                    end: record.end,
                },
            }),
            operation: tokio::sync::Mutex::new(()),
        }
    }

    pub fn logger(&self) -> &slog::Logger {
        &self.logger
    }

    pub fn partition_id(&self) -> u64 {
        self.partition_id
    }

    pub fn volume_id(&self) -> &str {
        &self.volume_id
    }

    pub fn kind(&self) -> PartitionKind {
        self.kind
    }

    pub fn partition_size(&self) -> u64 {
        self.partition_size
    }

    pub fn random_write(&self) -> bool {
        self.random_write
    }

    pub async fn membership(&self) -> Membership {
        self.membership.read().await.clone()
    }

    pub async fn hosts(&self) -> Vec<String> {
        self.membership.read().await.hosts.clone()
    }

    pub(crate) fn membership_lock(&self) -> &tokio::sync::RwLock<Membership> {
        &self.membership
    }

    /// Membership changes of one partition never overlap; a second request is turned away.
    pub(crate) fn try_begin_operation(&self) -> Result<tokio::sync::MutexGuard<'_, ()>, MembershipError> {
        self.operation
            .try_lock()
            .map_err(|_| MembershipError::OperationInProgress(self.partition_id))
    }

    pub fn record(&self, membership: &Membership) -> PartitionRecord {
        let range = self.meta_range();
        PartitionRecord {
            partition_id: self.partition_id,
            volume_id: self.volume_id.clone(),
            kind: self.kind,
            partition_size: self.partition_size,
            random_write: self.random_write,
            replica_num: membership.replica_num,
            hosts: membership.hosts.clone(),
            peers: membership.peers.clone(),
            start: range.start,
            end: range.end,
        }
    }

    pub fn meta_range(&self) -> MetaRange {
        self.check().range
    }

    pub fn set_meta_end(&self, end: u64) {
        self.check().range.end = end;
    }

    pub fn replicas(&self) -> Vec<Replica> {
        self.check().replicas.clone()
    }

    pub fn replica(&self, addr: &str) -> Option<Replica> {
        self.check().replicas.iter().find(|r| r.addr() == addr).cloned()
    }

    /// Applies a heartbeat report. Reports from nodes that are not hosts are dropped.
    pub async fn update_replica(&self, node: &Arc<ClusterNode>, report: &PartitionReport) -> bool {
        if !self.hosts().await.iter().any(|h| h == node.addr()) {
            return false;
        }
        let mut check = self.check();
        replica_entry(&mut check.replicas, node).update_from_report(report);
        check.missing_nodes.remove(node.addr());
        true
    }

    pub async fn update_meta_replica(&self, node: &Arc<ClusterNode>, report: &MetaPartitionReport) -> bool {
        if !self.hosts().await.iter().any(|h| h == node.addr()) {
            return false;
        }
        let mut check = self.check();
        replica_entry(&mut check.replicas, node).update_from_meta_report(report);
        check.missing_nodes.remove(node.addr());
        true
    }

    /// Registers a replica before its first heartbeat.
    pub fn ensure_replica(&self, node: &Arc<ClusterNode>) {
        replica_entry(&mut self.check().replicas, node);
    }

    pub fn remove_replica(&self, addr: &str) -> bool {
        let mut check = self.check();
        check.missing_nodes.remove(addr);
        let before = check.replicas.len();
        check.replicas.retain(|r| r.addr() != addr);
        check.replicas.len() != before
    }

    /// Address of the replica that last reported itself leader.
    pub fn leader_addr(&self) -> Option<String> {
        self.check()
            .replicas
            .iter()
            .find(|r| r.is_leader)
            .map(|r| r.addr().to_string())
    }

    pub fn live_replicas(&self, timeout: Duration) -> Vec<Replica> {
        self.check()
            .replicas
            .iter()
            .filter(|r| r.is_live(timeout))
            .cloned()
            .collect()
    }

    pub fn live_leader(&self, timeout: Duration) -> Option<Replica> {
        self.check()
            .replicas
            .iter()
            .find(|r| r.is_leader && r.is_live(timeout))
            .cloned()
    }

    /// True once every replica reports that its extent headers are loaded.
    pub fn needs_to_compare_crc(&self) -> bool {
        let check = self.check();
        !check.replicas.is_empty() && check.replicas.iter().all(|r| r.need_compare)
    }

    pub(crate) fn reset_load_round(&self) {
        let mut check = self.check();
        for replica in check.replicas.iter_mut() {
            replica.load_responded = false;
        }
        check.files_in_core.clear();
        check.loaded_counts.clear();
    }

    /// Records one replica's answer to the current load round.
    pub fn load_file(&self, addr: &str, response: &LoadDataPartitionResponse) -> bool {
        let mut check = self.check();
        let replica = match check.replicas.iter_mut().find(|r| r.addr() == addr) {
            Some(replica) => replica,
            None => return false,
        };
        replica.load_responded = true;

        check.loaded_counts.insert(addr.to_string(), response.snapshot.len());
        for crc in &response.snapshot {
            check
                .files_in_core
                .entry(crc.extent_id)
                .or_default()
                .push((addr.to_string(), *crc));
        }
        true
    }

    pub fn check_load_response(&self, hosts: &[String]) -> bool {
        let check = self.check();
        hosts.iter().all(|host| {
            check
                .replicas
                .iter()
                .any(|r| r.addr() == host && r.load_responded)
        })
    }

    /// Compares what the replicas loaded in this round and updates `needs_recovery`. Returns a
    /// description of every mismatch found.
    pub(crate) fn compare_loaded_extents<F>(&self, is_tiny: F) -> Vec<String>
    where
        F: Fn(ExtentId) -> bool,
    {
        let mut check = self.check();
        let mut problems = Vec::new();

        let mut counts = check.loaded_counts.iter();
        if let Some((first_addr, first_count)) = counts.next() {
            for (addr, count) in counts {
                if count != first_count {
                    problems.push(format!(
                        "file count {} on {} differs from {} on {}",
                        count, addr, first_count, first_addr
                    ));
                }
            }
        }

        for (extent_id, entries) in &check.files_in_core {
            if is_tiny(*extent_id) || entries.len() < 2 {
                continue;
            }
            let (first_addr, first) = &entries[0];
            // Differing sizes mean a write is still in flight.
            if entries.iter().any(|(_, crc)| crc.size != first.size) {
                continue;
            }
            for (addr, crc) in &entries[1..] {
                if crc.crc != first.crc {
                    problems.push(format!(
                        "extent {} crc {} on {} differs from {} on {}",
                        extent_id, crc.crc, addr, first.crc, first_addr
                    ));
                }
            }
        }

        check.needs_recovery = !problems.is_empty();
        problems
    }

    pub fn needs_recovery(&self) -> bool {
        self.check().needs_recovery
    }

    pub fn set_needs_recovery(&self, needs_recovery: bool) {
        self.check().needs_recovery = needs_recovery;
    }

    /// Records hosts whose replica has not reported within `timeout`, or never reported.
    /// Returns the hosts that went missing in this pass.
    pub fn check_missing_replicas(&self, hosts: &[String], timeout: Duration) -> Vec<String> {
        let mut check = self.check();
        let mut newly_missing = Vec::new();
        for host in hosts {
            let missing = match check.replicas.iter().find(|r| r.addr() == host) {
                Some(replica) => replica.is_missing(timeout),
                None => true,
            };
            if missing {
                if !check.missing_nodes.contains_key(host) {
                    check.missing_nodes.insert(host.clone(), Instant::now());
                    newly_missing.push(host.clone());
                }
            } else {
                check.missing_nodes.remove(host);
            }
        }
        newly_missing
    }

    pub fn missing_nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.check().missing_nodes.keys().cloned().collect();
        nodes.sort();
        nodes
    }

    fn check(&self) -> MutexGuard<'_, CheckState> {
        self.check.lock().expect("ClusterPartition.check lock guard poison")
    }
}

fn replica_entry<'a>(replicas: &'a mut Vec<Replica>, node: &Arc<ClusterNode>) -> &'a mut Replica {
    match replicas.iter().position(|r| r.addr() == node.addr()) {
        Some(index) => &mut replicas[index],
        None => {
            replicas.push(Replica::new(node.clone()));
            let last = replicas.len() - 1;
            &mut replicas[last]
        }
    }
}
