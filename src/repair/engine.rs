use crate::options::DataNodeOptionsValidated;
use crate::partition::{DataPartition, PartitionError, PartitionStatus};
use crate::repair::{compute_repair_tasks, ExtentRepairMode, RepairTask, ReplicaInventory};
use crate::rpc::{MasterClient, PeerClient, RpcError};
use crate::storage::{ExtentId, ExtentInfo};
use crate::util::{join_supervised, TaskPanicked};
use std::cmp;
use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error("Extent store I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Panicked(#[from] TaskPanicked),

    // The source replica returned nothing although the extent should be longer.
    #[error("Empty read of extent {extent_id} at offset {offset} from {source_addr}")]
    EmptyRead {
        extent_id: ExtentId,
        offset: u64,
        source_addr: String,
    },
}

/// What one `merge_extent_store_repair()` call achieved. Failed extents are retried next cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepairOutcome {
    pub created: usize,
    pub fixed: usize,
    pub failed: usize,
}

/// RepairEngine converges the replicas of a data partition on the largest copy of each extent.
/// One engine serves every partition of a node.
pub struct RepairEngine {
    logger: slog::Logger,
    peers: Arc<dyn PeerClient>,
    master: Arc<dyn MasterClient>,
    options: Arc<DataNodeOptionsValidated>,
}

impl RepairEngine {
    pub fn new(
        logger: slog::Logger,
        peers: Arc<dyn PeerClient>,
        master: Arc<dyn MasterClient>,
        options: Arc<DataNodeOptionsValidated>,
    ) -> Self {
        RepairEngine {
            logger,
            peers,
            master,
            options,
        }
    }

    /// One scheduled repair cycle. Only the partition leader does any work; an unavailable
    /// partition or a failed host refresh skips the cycle.
    pub async fn launch_repair(
        &self,
        partition: &Arc<DataPartition>,
        mode: ExtentRepairMode,
    ) -> Result<RepairOutcome, RepairError> {
        if partition.status() == PartitionStatus::Unavailable {
            return Ok(RepairOutcome::default());
        }

        partition.update_replica_hosts(self.master.as_ref()).await?;
        if !partition.is_leader() {
            return Ok(RepairOutcome::default());
        }

        if mode == ExtentRepairMode::Tiny && partition.store().pending_tiny_extents().is_empty() {
            let promoted = partition.store().promote_tiny_extents(self.options.min_fix_tiny_extents);
            slog::debug!(partition.logger(), "Promoted {} tiny extents for checking", promoted);
        }

        self.repair(partition, mode).await
    }

    /// Computes a task list for every replica, hands followers theirs and executes the local one.
    pub async fn repair(
        &self,
        partition: &Arc<DataPartition>,
        mode: ExtentRepairMode,
    ) -> Result<RepairOutcome, RepairError> {
        let pending_tiny: BTreeSet<ExtentId> = partition.store().pending_tiny_extents().into_iter().collect();
        let (inventories, tasks) = self.build_repair_tasks(partition, mode, &pending_tiny).await?;

        for (inventory, task) in inventories.iter().zip(tasks.iter()).skip(1) {
            if task.is_empty() {
                continue;
            }
            if let Err(e) = self.peers.notify_repair(&inventory.addr, partition.partition_id(), task).await {
                slog::warn!(partition.logger(), "Notifying {} of repair failed: {}", inventory.addr, e);
            }
        }

        let local_task = tasks.into_iter().next().unwrap_or_default();
        let outcome = self.merge_extent_store_repair(partition, local_task).await;

        if mode == ExtentRepairMode::Tiny {
            let checked: Vec<ExtentId> = pending_tiny.into_iter().collect();
            partition.store().release_tiny_extents(&checked);
        }

        if outcome != RepairOutcome::default() {
            slog::info!(partition.logger(), "{:?} repair cycle: {:?}", mode, outcome);
        }
        Ok(outcome)
    }

    /// Gathers inventories, the local one first, and computes the matching task lists. Replicas
    /// that cannot be reached are left out of this cycle.
    pub async fn build_repair_tasks(
        &self,
        partition: &Arc<DataPartition>,
        mode: ExtentRepairMode,
        pending_tiny: &BTreeSet<ExtentId>,
    ) -> Result<(Vec<ReplicaInventory>, Vec<RepairTask>), RepairError> {
        let mut inventories = vec![ReplicaInventory {
            addr: partition.local_addr().to_string(),
            extents: partition.all_extents_meta(mode)?,
        }];

        for host in partition.replica_hosts() {
            if host == partition.local_addr() {
                continue;
            }
            match self
                .peers
                .fetch_extent_inventory(&host, partition.partition_id(), mode)
                .await
            {
                Ok(extents) => inventories.push(ReplicaInventory { addr: host, extents }),
                Err(e) => slog::warn!(partition.logger(), "Fetching inventory from {} failed: {}", host, e),
            }
        }

        let store = partition.store().clone();
        let tasks = compute_repair_tasks(mode, &inventories, |id| store.is_tiny_extent(id), pending_tiny);
        Ok((inventories, tasks))
    }

    /// Executes one replica's task list against its local store. Missing extents are created and
    /// then fixed like undersized ones; fixes run concurrently up to
    /// `simultaneously_recover_files`, each as its own supervised task.
    pub async fn merge_extent_store_repair(&self, partition: &Arc<DataPartition>, task: RepairTask) -> RepairOutcome {
        let store = partition.store().clone();
        let mut outcome = RepairOutcome::default();

        let mut fixes = task.fix_extent_sizes;
        for extent in task.add_extents {
            if store.is_tiny_extent(extent.file_id) {
                continue;
            }
            if !store.exists(extent.file_id) {
                if let Err(e) = store.create(extent.file_id, extent.inode) {
                    partition.check_disk_error(&e);
                    slog::warn!(partition.logger(), "Creating extent {} failed: {}", extent.file_id, e);
                    outcome.failed += 1;
                    continue;
                }
                outcome.created += 1;
            }
            fixes.push(extent);
        }

        let semaphore = Arc::new(Semaphore::new(self.options.simultaneously_recover_files));
        let mut handles = Vec::with_capacity(fixes.len());
        for extent in fixes {
            if !store.exists(extent.file_id) {
                continue;
            }

            let semaphore = semaphore.clone();
            let partition = partition.clone();
            let peers = self.peers.clone();
            let chunk_size = self.options.repair_read_chunk_size;
            let extent_id = extent.file_id;
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                stream_fix_extent(&partition, peers.as_ref(), &extent, chunk_size).await
            });
            handles.push((extent_id, handle));
        }

        for (extent_id, handle) in handles {
            let label = format!("FixExtent-{}-{}", partition.partition_id(), extent_id);
            match join_supervised(&self.logger, &label, handle).await {
                Ok(Ok(_copied)) => outcome.fixed += 1,
                Ok(Err(e)) => {
                    slog::warn!(partition.logger(), "Fixing extent {} failed: {}", extent_id, e);
                    outcome.failed += 1;
                }
                Err(_panicked) => outcome.failed += 1,
            }
        }

        outcome
    }
}

/// Copies the missing tail of one extent from its source replica, chunk by chunk, appending at
/// the local size. Returns the number of bytes copied.
async fn stream_fix_extent(
    partition: &DataPartition,
    peers: &dyn PeerClient,
    extent: &ExtentInfo,
    chunk_size: u32,
) -> Result<u64, RepairError> {
    let store = partition.store();
    let disk_checked = |e: io::Error| {
        partition.check_disk_error(&e);
        RepairError::Io(e)
    };

    let start = store.size(extent.file_id).map_err(disk_checked)?;
    let mut offset = start;
    while offset < extent.size {
        let len = cmp::min(chunk_size as u64, extent.size - offset) as u32;
        let data = peers
            .read_extent(&extent.source, partition.partition_id(), extent.file_id, offset, len)
            .await?;
        if data.is_empty() {
            return Err(RepairError::EmptyRead {
                extent_id: extent.file_id,
                offset,
                source_addr: extent.source.clone(),
            });
        }

        store.write(extent.file_id, offset, &data).map_err(disk_checked)?;
        offset += data.len() as u64;
    }

    Ok(offset - start)
}
