use crate::cluster::{Cluster, ClusterNode, ClusterPartition, Membership, MembershipError, NodeKind, PartitionKind};
use crate::consensus::Peer;
use crate::rpc::{
    CreateDataPartitionRequest, TaskRequest, TaskResult, TaskStatus, UpdateMetaPartitionRequest,
    UpdatePartitionPeersRequest,
};
use std::sync::Arc;

impl Cluster {
    /// Replaces the replica of `partition_id` on `addr` with one on another node. Removing the
    /// old replica comes first, so the host list never grows beyond `replica_num + 1`.
    ///
    /// Decommissioning an address that is not a host succeeds without doing anything.
    pub async fn decommission_partition(&self, partition_id: u64, addr: &str) -> Result<(), MembershipError> {
        let partition = self.membership_target(partition_id)?;
        let _operation = partition.try_begin_operation()?;

        let membership = partition.membership().await;
        if !membership.hosts.iter().any(|h| h == addr) {
            slog::info!(partition.logger(), "{} is not a host, nothing to decommission", addr);
            return Ok(());
        }

        self.validate_decommission(&partition, &membership, addr)?;
        let replacement = self.choose_replacement(&partition, &membership, addr)?;
        slog::info!(
            partition.logger(),
            "Decommissioning replica on {}, replacing it with {}",
            addr,
            replacement.addr()
        );

        self.remove_host(&partition, addr).await?;
        self.add_host(&partition, &replacement).await?;

        slog::info!(partition.logger(), "Decommission of {} finished", addr);
        Ok(())
    }

    /// Removes one replica outright. Refused when fewer than `replica_num` hosts would remain.
    pub async fn delete_replica(&self, partition_id: u64, addr: &str) -> Result<(), MembershipError> {
        let partition = self.membership_target(partition_id)?;
        let _operation = partition.try_begin_operation()?;

        let membership = partition.membership().await;
        if !membership.hosts.iter().any(|h| h == addr) {
            return Err(MembershipError::NotAHost {
                partition_id,
                addr: addr.to_string(),
            });
        }
        let remaining = membership.hosts.len() - 1;
        if remaining < membership.replica_num as usize {
            return Err(MembershipError::ReplicaCountBelowMinimum {
                partition_id,
                remaining,
                replica_num: membership.replica_num,
            });
        }

        self.remove_host(&partition, addr).await
    }

    /// Adds a replica on the registered node at `addr`. The host list may grow to at most
    /// `replica_num + 1`.
    pub async fn add_replica(&self, partition_id: u64, addr: &str) -> Result<(), MembershipError> {
        let partition = self.membership_target(partition_id)?;
        let _operation = partition.try_begin_operation()?;

        let node = self
            .topology
            .node(addr)
            .ok_or_else(|| MembershipError::NodeNotFound(addr.to_string()))?;
        let expected = node_kind(partition.kind());
        if node.kind() != expected {
            return Err(MembershipError::NodeKindMismatch {
                addr: addr.to_string(),
                expected,
            });
        }
        let membership = partition.membership().await;
        if membership.hosts.iter().any(|h| h == addr) {
            return Err(MembershipError::HostAlreadyPresent {
                partition_id,
                addr: addr.to_string(),
            });
        }
        if membership.hosts.len() > membership.replica_num as usize {
            return Err(MembershipError::ReplicaCountAboveMaximum {
                partition_id,
                hosts: membership.hosts.len(),
                replica_num: membership.replica_num,
            });
        }

        self.add_host(&partition, &node).await
    }

    /// A node confirmed that it dropped its replica.
    pub async fn handle_delete_partition_response(&self, addr: &str, partition_id: u64, result: &TaskResult) {
        if result.status != TaskStatus::Succeeded {
            slog::warn!(self.logger, "Deleting partition {} on {} failed: {}", partition_id, addr, result.message);
            return;
        }
        let partition = match self.partition(partition_id) {
            Some(partition) => partition,
            None => return,
        };
        // The node may have been added back since the delete was sent.
        if partition.hosts().await.iter().any(|h| h == addr) {
            return;
        }
        if partition.remove_replica(addr) {
            slog::info!(partition.logger(), "Replica on {} deleted", addr);
        }
    }

    fn membership_target(&self, partition_id: u64) -> Result<Arc<ClusterPartition>, MembershipError> {
        self.partition(partition_id)
            .ok_or(MembershipError::PartitionNotFound(partition_id))
    }

    fn validate_decommission(
        &self,
        partition: &ClusterPartition,
        membership: &Membership,
        addr: &str,
    ) -> Result<(), MembershipError> {
        let live = partition
            .live_replicas(self.options.replica_timeout)
            .iter()
            .filter(|r| r.addr() != addr && membership.hosts.iter().any(|h| h == r.addr()))
            .count();
        let required = membership.replica_num as usize / 2 + 1;
        if live < required {
            return Err(MembershipError::NotEnoughLiveReplicas {
                partition_id: partition.partition_id(),
                live,
                required,
            });
        }
        Ok(())
    }

    fn choose_replacement(
        &self,
        partition: &ClusterPartition,
        membership: &Membership,
        addr: &str,
    ) -> Result<Arc<ClusterNode>, MembershipError> {
        let kind = node_kind(partition.kind());
        let node_set = self.topology.node(addr).map(|n| n.node_set_id()).unwrap_or_default();
        self.topology
            .choose_replacement(kind, node_set, &membership.hosts, self.max_used_ratio(kind))
            .ok_or(MembershipError::NoReplacementHost(partition.partition_id()))
    }

    async fn remove_host(&self, partition: &ClusterPartition, addr: &str) -> Result<(), MembershipError> {
        let partition_id = partition.partition_id();
        let membership = partition.membership().await;
        let peer = membership
            .peers
            .iter()
            .find(|p| p.addr == addr)
            .cloned()
            .ok_or_else(|| MembershipError::NotAHost {
                partition_id,
                addr: addr.to_string(),
            })?;
        let leader_addr = partition.leader_addr();

        self.send_with_failover(partition, &membership, TaskRequest::RemoveRaftMember(peer))
            .await?;

        {
            let mut guard = partition.membership_lock().write().await;
            let mut next = guard.clone();
            next.hosts.retain(|h| h != addr);
            next.peers.retain(|p| p.addr != addr);
            self.store.put_partition(&partition.record(&next)).await?;
            *guard = next;

            if leader_addr.as_deref() == Some(addr) {
                if let Some(new_leader) = guard.hosts.first() {
                    // Raft elects a leader on its own if the handoff fails.
                    if let Err(e) = self.send_sync(new_leader, partition_id, TaskRequest::TryToLeader).await {
                        slog::warn!(partition.logger(), "Leader handoff to {} failed: {}", new_leader, e);
                    }
                }
            }
        }

        partition.remove_replica(addr);
        let delete = match partition.kind() {
            PartitionKind::Data => TaskRequest::DeleteDataPartition,
            PartitionKind::Meta => TaskRequest::DeleteMetaPartition,
        };
        self.enqueue_task(addr, partition_id, delete);
        slog::info!(partition.logger(), "Removed {} from hosts", addr);
        Ok(())
    }

    async fn add_host(&self, partition: &ClusterPartition, node: &Arc<ClusterNode>) -> Result<(), MembershipError> {
        let partition_id = partition.partition_id();
        let membership = partition.membership().await;
        let peer = Peer::new(node.id(), node.addr());

        self.send_with_failover(partition, &membership, TaskRequest::AddRaftMember(peer.clone()))
            .await?;

        let committed = {
            let mut guard = partition.membership_lock().write().await;
            let mut next = guard.clone();
            next.hosts.push(node.addr().to_string());
            next.peers.push(peer);
            self.store.put_partition(&partition.record(&next)).await?;
            *guard = next.clone();

            let create = match partition.kind() {
                PartitionKind::Data => TaskRequest::CreateDataPartition(CreateDataPartitionRequest {
                    volume_id: partition.volume_id().to_string(),
                    partition_size: partition.partition_size(),
                    random_write: partition.random_write(),
                    peers: next.peers.clone(),
                    hosts: next.hosts.clone(),
                }),
                PartitionKind::Meta => crate::cluster::cluster::create_meta_request(&partition.record(&next)),
            };
            self.send_sync(node.addr(), partition_id, create).await?;
            next
        };

        self.after_creation(partition, node, &committed);
        slog::info!(partition.logger(), "Added {} to hosts", node.addr());
        Ok(())
    }

    /// Registers the new replica and sends it the state it cannot derive on its own.
    fn after_creation(&self, partition: &ClusterPartition, node: &Arc<ClusterNode>, membership: &Membership) {
        partition.ensure_replica(node);
        let request = match partition.kind() {
            PartitionKind::Data => TaskRequest::UpdatePartitionPeers(UpdatePartitionPeersRequest {
                hosts: membership.hosts.clone(),
                peers: membership.peers.clone(),
            }),
            PartitionKind::Meta => {
                let range = partition.meta_range();
                TaskRequest::UpdateMetaPartition(UpdateMetaPartitionRequest {
                    volume_id: partition.volume_id().to_string(),
                    start: range.start,
                    end: range.end,
                })
            }
        };
        self.enqueue_task(node.addr(), partition.partition_id(), request);
    }

    /// Sends a raft membership task to the believed leader first, then to every other host in
    /// turn, until one accepts it.
    async fn send_with_failover(
        &self,
        partition: &ClusterPartition,
        membership: &Membership,
        request: TaskRequest,
    ) -> Result<(), MembershipError> {
        let partition_id = partition.partition_id();
        let retry_interval = self.options.retry_send_sync_task_interval;

        let mut candidates: Vec<String> = Vec::with_capacity(membership.hosts.len());
        if let Some(leader) = partition.leader_addr() {
            if membership.hosts.contains(&leader) {
                candidates.push(leader);
            }
        }
        let leader_known = !candidates.is_empty();
        for host in &membership.hosts {
            if !candidates.contains(host) {
                candidates.push(host.clone());
            }
        }

        let mut last_error = None;
        for (attempt, addr) in candidates.iter().enumerate() {
            let pauses = pauses_before_attempt(attempt, leader_known, candidates.len(), membership.replica_num);
            if pauses > 0 {
                tokio::time::sleep(retry_interval * pauses).await;
            }
            match self.send_sync(addr, partition_id, request.clone()).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    slog::warn!(partition.logger(), "{} via {} failed: {}", request.name(), addr, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e.into()),
            None => Err(MembershipError::NoCandidate(partition_id)),
        }
    }
}

/// Retry intervals to wait before sending to the candidate at `attempt`: one after each failed
/// attempt, plus one on every attempt while no leader is known and the group is short of hosts,
/// since it is likely still electing.
fn pauses_before_attempt(attempt: usize, leader_known: bool, candidates: usize, replica_num: u8) -> u32 {
    let mut pauses = 0;
    if attempt > 0 {
        pauses += 1;
    }
    if !leader_known && candidates < replica_num as usize {
        pauses += 1;
    }
    pauses
}

fn node_kind(kind: PartitionKind) -> NodeKind {
    match kind {
        PartitionKind::Data => NodeKind::Data,
        PartitionKind::Meta => NodeKind::Meta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_leader_is_tried_at_once() {
        assert_eq!(0, pauses_before_attempt(0, true, 3, 3));
        assert_eq!(1, pauses_before_attempt(1, true, 3, 3));
        assert_eq!(1, pauses_before_attempt(2, true, 2, 3));
    }

    #[test]
    fn short_leaderless_group_waits_before_every_attempt() {
        assert_eq!(1, pauses_before_attempt(0, false, 2, 3));
        assert_eq!(2, pauses_before_attempt(1, false, 2, 3));
        assert_eq!(0, pauses_before_attempt(0, false, 3, 3));
        assert_eq!(1, pauses_before_attempt(2, false, 3, 3));
    }
}
