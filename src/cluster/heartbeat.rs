use crate::cluster::cluster::create_meta_request;
use crate::cluster::{Cluster, ClusterError, ClusterPartition, NodeKind, PartitionKind, PartitionRecord};
use crate::consensus::Peer;
use crate::rpc::{
    DataNodeHeartbeatResponse, MetaNodeHeartbeatResponse, MetaPartitionReport, TaskRequest, TaskStatus,
    UpdateMetaPartitionRequest,
};
use std::sync::Arc;

impl Cluster {
    /// Queues a heartbeat task to every registered node. Returns how many were queued.
    pub fn heartbeat_tick(&self) -> usize {
        let mut queued = 0;
        for node in self.topology.all_nodes() {
            let request = match node.kind() {
                NodeKind::Data => TaskRequest::DataNodeHeartbeat,
                NodeKind::Meta => TaskRequest::MetaNodeHeartbeat,
            };
            if self.enqueue_task(node.addr(), 0, request) {
                queued += 1;
            }
        }
        queued
    }

    pub async fn handle_data_node_heartbeat(&self, addr: &str, response: DataNodeHeartbeatResponse) {
        if response.result.status != TaskStatus::Succeeded {
            slog::warn!(self.logger, "Heartbeat of data node {} failed: {}", addr, response.result.message);
            return;
        }
        let node = match self.topology.node(addr) {
            Some(node) => node,
            None => {
                slog::warn!(self.logger, "Heartbeat from unregistered data node {}", addr);
                return;
            }
        };

        node.update_metrics(response.total, response.used, response.partition_reports.len());
        node.set_active();
        for disk in &response.bad_disks {
            slog::warn!(self.logger, "Data node {} reports bad disk {}", addr, disk);
        }

        for report in &response.partition_reports {
            let partition = match self.reported_partition(report.partition_id, &report.volume_id) {
                Some(partition) => partition,
                None => continue,
            };
            partition.update_replica(&node, report).await;
        }
    }

    pub async fn handle_meta_node_heartbeat(&self, addr: &str, response: MetaNodeHeartbeatResponse) {
        if response.result.status != TaskStatus::Succeeded {
            slog::warn!(self.logger, "Heartbeat of meta node {} failed: {}", addr, response.result.message);
            return;
        }
        let node = match self.topology.node(addr) {
            Some(node) => node,
            None => {
                slog::warn!(self.logger, "Heartbeat from unregistered meta node {}", addr);
                return;
            }
        };

        node.update_metrics(response.total, response.used, response.partition_reports.len());
        node.set_active();
        let memory_full = node.used_ratio() >= self.options.meta_node_memory_threshold;

        for report in &response.partition_reports {
            let partition = match self.reported_partition(report.partition_id, &report.volume_id) {
                Some(partition) => partition,
                None => continue,
            };

            let range = partition.meta_range();
            if report.end != range.end {
                self.enqueue_task(
                    addr,
                    partition.partition_id(),
                    TaskRequest::UpdateMetaPartition(UpdateMetaPartitionRequest {
                        volume_id: partition.volume_id().to_string(),
                        start: range.start,
                        end: range.end,
                    }),
                );
            }
            partition.update_meta_replica(&node, report).await;

            if let Some(end) = self.split_point(&partition, report, memory_full) {
                if let Err(e) = self.split_meta_partition(&partition, end).await {
                    slog::error!(partition.logger(), "Splitting at {} failed: {}", end, e);
                }
            }
        }
    }

    /// Marks nodes that stopped reporting as inactive. Returns their addresses.
    pub fn check_node_liveness(&self) -> Vec<String> {
        let mut went_inactive = Vec::new();
        for node in self.topology.all_nodes() {
            if node.check_liveness(self.options.node_timeout) {
                slog::warn!(self.logger, "{:?} node {} stopped reporting", node.kind(), node.addr());
                went_inactive.push(node.addr().to_string());
            }
        }
        went_inactive
    }

    /// Records replicas that stopped reporting. Returns `(partition, host)` for each one found
    /// missing in this pass.
    pub async fn check_missing_replicas(&self) -> Vec<(u64, String)> {
        let mut missing = Vec::new();
        for partition in self.partitions() {
            let hosts = partition.hosts().await;
            for addr in partition.check_missing_replicas(&hosts, self.options.replica_timeout) {
                slog::warn!(partition.logger(), "Replica on {} is missing", addr);
                missing.push((partition.partition_id(), addr));
            }
        }
        missing
    }

    fn reported_partition(&self, partition_id: u64, volume_id: &str) -> Option<Arc<ClusterPartition>> {
        let partition = self.partition(partition_id)?;
        let volume_name = if volume_id.is_empty() {
            partition.volume_id()
        } else {
            volume_id
        };
        if let Some(volume) = self.volume(volume_name) {
            if volume.is_marked_delete() {
                return None;
            }
        }
        Some(partition)
    }

    /// Only the open-ended partition of a volume is split.
    fn split_point(&self, partition: &ClusterPartition, report: &MetaPartitionReport, memory_full: bool) -> Option<u64> {
        let range = partition.meta_range();
        if partition.kind() != PartitionKind::Meta || !range.is_open_ended() {
            return None;
        }
        let inode_span = report.max_inode_id.saturating_sub(range.start);
        if !memory_full && inode_span < self.options.meta_partition_split_watermark {
            return None;
        }

        let step = self.options.inode_id_step;
        let end = if report.max_inode_id == 0 {
            range.start.saturating_add(step)
        } else {
            report.max_inode_id.saturating_add(step)
        };
        Some(end)
    }

    /// Closes `partition` at `end` and opens a new partition `[end + 1, ∞)` on fresh hosts.
    pub async fn split_meta_partition(&self, partition: &ClusterPartition, end: u64) -> Result<(), ClusterError> {
        let _operation = partition.try_begin_operation()?;
        if end == u64::MAX || !partition.meta_range().is_open_ended() {
            return Ok(());
        }

        let membership = partition.membership().await;
        let nodes = self.choose_hosts(NodeKind::Meta, membership.replica_num)?;

        {
            let guard = partition.membership_lock().write().await;
            partition.set_meta_end(end);
            if let Err(e) = self.store.put_partition(&partition.record(&guard)).await {
                partition.set_meta_end(u64::MAX);
                return Err(e.into());
            }
        }
        let range = partition.meta_range();
        for host in &membership.hosts {
            self.enqueue_task(
                host,
                partition.partition_id(),
                TaskRequest::UpdateMetaPartition(UpdateMetaPartitionRequest {
                    volume_id: partition.volume_id().to_string(),
                    start: range.start,
                    end: range.end,
                }),
            );
        }

        let record = PartitionRecord {
            partition_id: self.next_partition_id(),
            volume_id: partition.volume_id().to_string(),
            kind: PartitionKind::Meta,
            partition_size: 0,
            random_write: false,
            replica_num: membership.replica_num,
            hosts: nodes.iter().map(|n| n.addr().to_string()).collect(),
            peers: nodes.iter().map(|n| Peer::new(n.id(), n.addr())).collect(),
            start: end + 1,
            end: u64::MAX,
        };
        self.store.put_partition(&record).await?;

        let request = create_meta_request(&record);
        let new_partition = self.load_partition(record);
        for node in &nodes {
            self.enqueue_task(node.addr(), new_partition.partition_id(), request.clone());
        }

        slog::info!(
            partition.logger(),
            "Split at {}, partition {} now covers [{}, ∞)",
            end,
            new_partition.partition_id(),
            end + 1
        );
        Ok(())
    }
}
