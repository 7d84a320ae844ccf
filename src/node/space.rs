use crate::ec::EcPartition;
use crate::node::start_ec_scheduler;
use crate::node::start_partition_scheduler;
use crate::partition::{
    parse_partition_dir_name, DataPartition, DataPartitionConfig, Disk, PartitionContext, PartitionError,
    PartitionStatus,
};
use crate::repair::RepairEngine;
use crate::rpc::{CreateDataPartitionRequest, CreateEcPartitionRequest, DataNodeHeartbeatResponse, TaskResult};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::{Arc, RwLock};

#[derive(Debug, thiserror::Error)]
pub enum SpaceError {
    #[error("No disk can host a partition of {0} bytes")]
    NoAvailableDisk(u64),

    #[error("Partition {0} not found")]
    PartitionNotFound(u64),

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error("Partition directory I/O failure: {0}")]
    Io(#[from] io::Error),
}

/// Space is the registry of every partition replica hosted by one data node, across its disks.
pub struct Space {
    logger: slog::Logger,
    context: PartitionContext,
    disks: Vec<Arc<Disk>>,
    repair: Arc<RepairEngine>,
    partitions: RwLock<HashMap<u64, Arc<DataPartition>>>,
    ec_partitions: RwLock<HashMap<u64, Arc<EcPartition>>>,
}

impl Space {
    pub fn new(context: PartitionContext, disks: Vec<Arc<Disk>>, repair: Arc<RepairEngine>) -> Self {
        Space {
            logger: context.logger.new(slog::o!("NodeAddr" => context.local_addr.clone())),
            context,
            disks,
            repair,
            partitions: RwLock::new(HashMap::new()),
            ec_partitions: RwLock::new(HashMap::new()),
        }
    }

    /// Reopens every partition found on the disks, as on node restart. A directory that fails
    /// to load is logged and left alone.
    pub fn load_partitions(&self) -> Result<usize, SpaceError> {
        let mut loaded = 0;
        for disk in &self.disks {
            for entry in fs::read_dir(disk.path())? {
                let dir = entry?.path();
                let name = match dir.file_name().and_then(|n| n.to_str()) {
                    Some(name) => name.to_string(),
                    None => continue,
                };

                if parse_partition_dir_name(&name).is_some() {
                    match DataPartition::load(&self.context, disk.clone(), &dir) {
                        Ok(partition) => {
                            self.attach(partition);
                            loaded += 1;
                        }
                        Err(e) => slog::error!(self.logger, "Loading {:?} failed: {}", dir, e),
                    }
                } else if name.starts_with("ecpartition_") {
                    match EcPartition::load(&self.context, disk.clone(), &dir) {
                        Ok(partition) => {
                            self.attach_ec(partition);
                            loaded += 1;
                        }
                        Err(e) => slog::error!(self.logger, "Loading {:?} failed: {}", dir, e),
                    }
                }
            }
        }

        slog::info!(self.logger, "Loaded {} partitions", loaded);
        Ok(loaded)
    }

    /// Creates a data partition replica. Creating one that already exists returns it unchanged.
    pub fn create_partition(
        &self,
        partition_id: u64,
        request: CreateDataPartitionRequest,
    ) -> Result<Arc<DataPartition>, SpaceError> {
        if let Some(existing) = self.partition(partition_id) {
            return Ok(existing);
        }

        let disk = self.select_disk(request.partition_size)?;
        let partition = DataPartition::create(
            &self.context,
            disk,
            DataPartitionConfig {
                volume_id: request.volume_id,
                partition_id,
                partition_size: request.partition_size,
                random_write: request.random_write,
                peers: request.peers,
                hosts: request.hosts,
            },
        )?;

        slog::info!(self.logger, "Created partition {} at {:?}", partition_id, partition.path());
        self.attach(partition.clone());
        Ok(partition)
    }

    pub fn create_ec_partition(
        &self,
        partition_id: u64,
        request: CreateEcPartitionRequest,
    ) -> Result<Arc<EcPartition>, SpaceError> {
        if let Some(existing) = self.ec_partition(partition_id) {
            return Ok(existing);
        }

        let disk = self.select_disk(request.partition_size)?;
        let partition = EcPartition::create(&self.context, disk, partition_id, request)?;
        self.attach_ec(partition.clone());
        Ok(partition)
    }

    /// Stops the replica and removes its directory.
    pub fn delete_partition(&self, partition_id: u64) -> Result<(), SpaceError> {
        let removed = self
            .partitions
            .write()
            .expect("Space.partitions lock guard poison")
            .remove(&partition_id);

        match removed {
            Some(partition) => {
                partition.stop();
                fs::remove_dir_all(partition.path())?;
                slog::info!(self.logger, "Deleted partition {}", partition_id);
                Ok(())
            }
            None => Err(SpaceError::PartitionNotFound(partition_id)),
        }
    }

    pub fn partition(&self, partition_id: u64) -> Option<Arc<DataPartition>> {
        self.partitions
            .read()
            .expect("Space.partitions lock guard poison")
            .get(&partition_id)
            .cloned()
    }

    pub fn ec_partition(&self, partition_id: u64) -> Option<Arc<EcPartition>> {
        self.ec_partitions
            .read()
            .expect("Space.ec_partitions lock guard poison")
            .get(&partition_id)
            .cloned()
    }

    pub fn partitions(&self) -> Vec<Arc<DataPartition>> {
        self.partitions
            .read()
            .expect("Space.partitions lock guard poison")
            .values()
            .cloned()
            .collect()
    }

    pub fn repair_engine(&self) -> &Arc<RepairEngine> {
        &self.repair
    }

    pub fn heartbeat_report(&self) -> DataNodeHeartbeatResponse {
        let mut partition_reports: Vec<_> = self.partitions().iter().map(|p| p.report()).collect();
        partition_reports.extend(
            self.ec_partitions
                .read()
                .expect("Space.ec_partitions lock guard poison")
                .values()
                .map(|p| p.report()),
        );
        partition_reports.sort_by_key(|r| r.partition_id);

        DataNodeHeartbeatResponse {
            result: TaskResult::succeeded(),
            total: self.disks.iter().map(|d| d.total()).sum(),
            used: partition_reports.iter().map(|r| r.used).sum(),
            partition_reports,
            bad_disks: self
                .disks
                .iter()
                .filter(|d| d.status() == PartitionStatus::Unavailable)
                .map(|d| d.path().display().to_string())
                .collect(),
        }
    }

    pub fn stop(&self) {
        for partition in self.partitions() {
            partition.stop();
        }
        for partition in self
            .ec_partitions
            .read()
            .expect("Space.ec_partitions lock guard poison")
            .values()
        {
            partition.stop();
        }
    }

    fn attach(&self, partition: Arc<DataPartition>) {
        start_partition_scheduler(&partition, self.repair.clone(), self.context.options.status_update_interval);
        self.partitions
            .write()
            .expect("Space.partitions lock guard poison")
            .insert(partition.partition_id(), partition);
    }

    fn attach_ec(&self, partition: Arc<EcPartition>) {
        start_ec_scheduler(&partition, self.context.options.status_update_interval);
        self.ec_partitions
            .write()
            .expect("Space.ec_partitions lock guard poison")
            .insert(partition.partition_id(), partition);
    }

    // The healthy disk with the most unallocated space.
    fn select_disk(&self, partition_size: u64) -> Result<Arc<Disk>, SpaceError> {
        let mut allocated: HashMap<&std::path::Path, u64> = HashMap::new();
        let partitions = self.partitions();
        for partition in &partitions {
            *allocated.entry(partition.disk().path()).or_default() += partition.partition_size();
        }

        self.disks
            .iter()
            .filter(|d| d.status() == PartitionStatus::ReadWrite)
            .map(|d| {
                let used = allocated.get(d.path()).copied().unwrap_or(0);
                (d, d.total().saturating_sub(used))
            })
            .filter(|(_, free)| *free >= partition_size)
            .max_by_key(|(_, free)| *free)
            .map(|(d, _)| d.clone())
            .ok_or(SpaceError::NoAvailableDisk(partition_size))
    }
}
