use crate::cluster::cluster::send_task;
use crate::cluster::{Cluster, ClusterPartition, PartitionKind};
use crate::rpc::{
    AdminTask, LoadDataPartitionResponse, LoadMetaPartitionResponse, TaskRequest, TaskResponse, TaskStatus,
};
use crate::storage::default_tiny_extent_ids;
use crate::util::join_supervised;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of one consistency round of a partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Some replica is still loading extent headers.
    Skipped,
    /// Not every host answered; `needs_recovery` was left as it was.
    Incomplete,
    Consistent,
    Inconsistent(Vec<String>),
}

impl Cluster {
    /// Asks every host of a data partition for its extent CRCs and compares them.
    pub async fn load_data_partition(&self, partition: &ClusterPartition) -> CheckOutcome {
        if !partition.needs_to_compare_crc() {
            return CheckOutcome::Skipped;
        }

        partition.reset_load_round();
        let hosts = partition.hosts().await;
        for host in &hosts {
            self.enqueue_task(host, partition.partition_id(), TaskRequest::LoadDataPartition);
        }

        let mut responded = partition.check_load_response(&hosts);
        for _ in 0..self.options.load_response_polls {
            if responded {
                break;
            }
            tokio::time::sleep(self.options.load_response_poll_interval).await;
            responded = partition.check_load_response(&hosts);
        }
        if !responded {
            slog::warn!(partition.logger(), "Not every host answered the load round, skipping comparison");
            return CheckOutcome::Incomplete;
        }

        let tiny = default_tiny_extent_ids();
        let problems = partition.compare_loaded_extents(|extent_id| tiny.contains(&extent_id));
        if problems.is_empty() {
            slog::debug!(partition.logger(), "Replicas are consistent");
            return CheckOutcome::Consistent;
        }
        for problem in &problems {
            slog::warn!(partition.logger(), "Replica mismatch: {}", problem);
        }
        CheckOutcome::Inconsistent(problems)
    }

    pub(crate) fn handle_load_data_partition_response(
        &self,
        addr: &str,
        partition_id: u64,
        response: &LoadDataPartitionResponse,
    ) {
        let partition = match self.partition(partition_id) {
            Some(partition) => partition,
            None => return,
        };
        if response.result.status != TaskStatus::Succeeded {
            slog::warn!(partition.logger(), "Load on {} failed: {}", addr, response.result.message);
            return;
        }
        if !partition.load_file(addr, response) {
            slog::warn!(partition.logger(), "Load response from {}, which has no replica record", addr);
        }
    }

    /// Loads every host of a metadata partition in parallel and compares replicas that have
    /// applied the same raft index.
    pub async fn load_meta_partition(&self, partition: &ClusterPartition) -> CheckOutcome {
        let hosts = partition.hosts().await;

        let mut handles = Vec::with_capacity(hosts.len());
        for host in &hosts {
            let transport = self.transport.clone();
            let addr = host.clone();
            let task = AdminTask::new(self.addr.clone(), partition.partition_id(), TaskRequest::LoadMetaPartition);
            handles.push(tokio::spawn(async move {
                send_task(transport.as_ref(), &addr, &task).await
            }));
        }

        let mut loads: Vec<(String, LoadMetaPartitionResponse)> = Vec::with_capacity(hosts.len());
        let mut failed = false;
        for (host, handle) in hosts.iter().zip(handles) {
            match join_supervised(partition.logger(), "LoadMetaPartition", handle).await {
                Ok(Ok(TaskResponse::LoadMetaPartition(response))) => loads.push((host.clone(), response)),
                Ok(Ok(other)) => {
                    slog::warn!(partition.logger(), "Unexpected {:?} to LoadMetaPartition from {}", other, host);
                    failed = true;
                }
                Ok(Err(e)) => {
                    slog::warn!(partition.logger(), "{}", e);
                    failed = true;
                }
                Err(_) => failed = true,
            }
        }
        if failed {
            return CheckOutcome::Incomplete;
        }

        let problems = compare_meta_loads(&loads);
        partition.set_needs_recovery(!problems.is_empty());
        if problems.is_empty() {
            return CheckOutcome::Consistent;
        }
        for problem in &problems {
            slog::warn!(partition.logger(), "Metadata replica mismatch: {}", problem);
        }
        CheckOutcome::Inconsistent(problems)
    }

    /// Runs one consistency round on every partition concurrently.
    pub async fn check_consistency(self: &Arc<Self>) -> Vec<(u64, CheckOutcome)> {
        let partitions = self.partitions();
        let mut handles = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let cluster = self.clone();
            let partition_id = partition.partition_id();
            handles.push((
                partition_id,
                tokio::spawn(async move {
                    match partition.kind() {
                        PartitionKind::Data => cluster.load_data_partition(&partition).await,
                        PartitionKind::Meta => cluster.load_meta_partition(&partition).await,
                    }
                }),
            ));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (partition_id, handle) in handles {
            if let Ok(outcome) = join_supervised(&self.logger, "ConsistencyCheck", handle).await {
                outcomes.push((partition_id, outcome));
            }
        }
        outcomes
    }
}

fn compare_meta_loads(loads: &[(String, LoadMetaPartitionResponse)]) -> Vec<String> {
    let mut by_apply_id: BTreeMap<u64, Vec<&(String, LoadMetaPartitionResponse)>> = BTreeMap::new();
    for load in loads {
        by_apply_id.entry(load.1.apply_id).or_default().push(load);
    }

    let mut problems = Vec::new();
    for (apply_id, group) in by_apply_id {
        let (first_addr, first) = group[0];
        for (addr, load) in &group[1..] {
            let expected = (first.max_inode, first.inode_count, first.dentry_count);
            let actual = (load.max_inode, load.inode_count, load.dentry_count);
            if expected != actual {
                problems.push(format!(
                    "at apply id {} {} has (max inode, inodes, dentries) {:?}, {} has {:?}",
                    apply_id, addr, actual, first_addr, expected
                ));
            }
        }
    }
    problems
}
