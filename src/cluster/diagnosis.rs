use crate::cluster::{Cluster, ClusterError, ClusterPartition, NodeKind};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PartitionHealth {
    #[serde(rename = "PartitionID")]
    pub partition_id: u64,
    pub replica_num: u8,
    pub host_count: usize,
    pub peer_count: usize,
    pub live_replica_count: usize,
    pub missing_nodes: Vec<String>,
    pub peers_match_hosts: bool,
    pub has_live_leader: bool,
    pub needs_recovery: bool,
    pub healthy: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Diagnosis {
    pub inactive_data_nodes: Vec<String>,
    pub inactive_meta_nodes: Vec<String>,
    pub lack_replica_partitions: Vec<u64>,
    pub corrupt_partitions: Vec<u64>,
    pub partitions: Vec<PartitionHealth>,
}

impl Cluster {
    pub async fn diagnose(&self) -> Diagnosis {
        let mut diagnosis = Diagnosis {
            inactive_data_nodes: self.inactive_nodes(NodeKind::Data),
            inactive_meta_nodes: self.inactive_nodes(NodeKind::Meta),
            ..Diagnosis::default()
        };

        for partition in self.partitions() {
            let health = self.health_of(&partition).await;
            let replica_num = health.replica_num as usize;
            if health.host_count < replica_num || health.live_replica_count < replica_num {
                diagnosis.lack_replica_partitions.push(health.partition_id);
            }
            if !health.has_live_leader {
                diagnosis.corrupt_partitions.push(health.partition_id);
            }
            diagnosis.partitions.push(health);
        }
        diagnosis
    }

    pub async fn partition_health(&self, partition_id: u64) -> Result<PartitionHealth, ClusterError> {
        let partition = self
            .partition(partition_id)
            .ok_or(ClusterError::PartitionNotFound(partition_id))?;
        Ok(self.health_of(&partition).await)
    }

    async fn health_of(&self, partition: &ClusterPartition) -> PartitionHealth {
        let membership = partition.membership().await;
        let timeout = self.options.replica_timeout;

        let hosts: BTreeSet<&str> = membership.hosts.iter().map(String::as_str).collect();
        let peer_addrs: BTreeSet<&str> = membership.peers.iter().map(|p| p.addr.as_str()).collect();
        let live_replica_count = partition
            .live_replicas(timeout)
            .iter()
            .filter(|r| hosts.contains(r.addr()))
            .count();
        let missing_nodes = partition.missing_nodes();
        let has_live_leader = partition.live_leader(timeout).is_some();
        let peers_match_hosts = hosts == peer_addrs && membership.hosts.len() == membership.peers.len();
        let replica_num = membership.replica_num as usize;

        let healthy = membership.hosts.len() == replica_num
            && membership.peers.len() == replica_num
            && peers_match_hosts
            && missing_nodes.is_empty()
            && live_replica_count >= replica_num
            && has_live_leader;

        PartitionHealth {
            partition_id: partition.partition_id(),
            replica_num: membership.replica_num,
            host_count: membership.hosts.len(),
            peer_count: membership.peers.len(),
            live_replica_count,
            missing_nodes,
            peers_match_hosts,
            has_live_leader,
            needs_recovery: partition.needs_recovery(),
            healthy,
        }
    }

    fn inactive_nodes(&self, kind: NodeKind) -> Vec<String> {
        let mut nodes: Vec<String> = self
            .topology
            .nodes(kind)
            .iter()
            .filter(|n| !n.is_active())
            .map(|n| n.addr().to_string())
            .collect();
        nodes.sort();
        nodes
    }
}
