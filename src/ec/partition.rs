use crate::ec::{stripe_read, StripeGeometry, StripeReadError};
use crate::options::DataNodeOptionsValidated;
use crate::partition::{
    create_time_now, read_meta_file, status_from_usage, write_meta_file, Disk, MetaFileError, PartitionContext,
    PartitionError, PartitionStatus,
};
use crate::rpc::{CreateEcPartitionRequest, PartitionReport, PeerClient};
use crate::storage::{is_disk_error, ExtentId, ExtentStore};
use crate::util::TickerHandle;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

/// Persisted identity and stripe geometry of an erasure-coded partition replica.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EcPartitionMeta {
    #[serde(rename = "PartitionID")]
    pub partition_id: u64,
    #[serde(rename = "PartitionSize")]
    pub partition_size: u64,
    #[serde(rename = "VolumeID")]
    pub volume_id: String,
    #[serde(rename = "StripeBlockSize")]
    pub stripe_block_size: u64,
    #[serde(rename = "DataNodeNum")]
    pub data_node_num: u32,
    #[serde(rename = "ParityNodeNum")]
    pub parity_node_num: u32,
    #[serde(rename = "NodeIndex")]
    pub node_index: u32,
    #[serde(rename = "DataNodes")]
    pub data_nodes: Vec<String>,
    #[serde(rename = "ParityNodes")]
    pub parity_nodes: Vec<String>,
    #[serde(rename = "CreateTime")]
    pub create_time: String,
}

impl EcPartitionMeta {
    pub fn validate(&self) -> Result<(), MetaFileError> {
        if self.volume_id.trim().is_empty() {
            return Err(MetaFileError::Invalid("empty volume ID"));
        }
        if self.partition_id == 0 || self.partition_size == 0 {
            return Err(MetaFileError::Invalid("partition ID or size is 0"));
        }
        if self.stripe_block_size == 0 || self.data_node_num == 0 {
            return Err(MetaFileError::Invalid("empty stripe geometry"));
        }
        if self.data_nodes.len() != self.data_node_num as usize {
            return Err(MetaFileError::Invalid("data node list does not match data node count"));
        }
        if self.parity_nodes.len() != self.parity_node_num as usize {
            return Err(MetaFileError::Invalid("parity node list does not match parity node count"));
        }
        if self.node_index >= self.data_node_num + self.parity_node_num {
            return Err(MetaFileError::Invalid("node index out of range"));
        }
        Ok(())
    }
}

struct EcPartitionState {
    status: PartitionStatus,
    used: u64,
    usage_refreshed_at: Option<Instant>,
}

pub struct EcPartition {
    logger: slog::Logger,
    meta: EcPartitionMeta,
    path: PathBuf,
    disk: Arc<Disk>,
    store: Arc<dyn ExtentStore>,
    options: Arc<DataNodeOptionsValidated>,
    state: RwLock<EcPartitionState>,
    scheduler: Mutex<Option<TickerHandle>>,
}

pub(crate) fn ec_partition_dir_name(partition_id: u64, partition_size: u64) -> String {
    format!("ecpartition_{}_{}", partition_id, partition_size)
}

impl EcPartition {
    pub fn create(
        context: &PartitionContext,
        disk: Arc<Disk>,
        partition_id: u64,
        request: CreateEcPartitionRequest,
    ) -> Result<Arc<Self>, PartitionError> {
        let meta = EcPartitionMeta {
            partition_id,
            partition_size: request.partition_size,
            volume_id: request.volume_id,
            stripe_block_size: request.stripe_block_size,
            data_node_num: request.data_node_num,
            parity_node_num: request.parity_node_num,
            node_index: request.node_index,
            data_nodes: request.data_nodes,
            parity_nodes: request.parity_nodes,
            create_time: create_time_now(),
        };
        meta.validate()?;

        let path = disk.path().join(ec_partition_dir_name(partition_id, meta.partition_size));
        fs::create_dir_all(&path)?;

        let partition = Self::open(context, disk, path, meta)?;
        partition.persist_meta()?;
        Ok(partition)
    }

    pub fn load(context: &PartitionContext, disk: Arc<Disk>, dir: &Path) -> Result<Arc<Self>, PartitionError> {
        let meta: EcPartitionMeta = read_meta_file(dir)?;
        meta.validate()?;
        Self::open(context, disk, dir.to_path_buf(), meta)
    }

    fn open(
        context: &PartitionContext,
        disk: Arc<Disk>,
        path: PathBuf,
        meta: EcPartitionMeta,
    ) -> Result<Arc<Self>, PartitionError> {
        let logger = context
            .logger
            .new(slog::o!("PartitionId" => meta.partition_id, "NodeIndex" => meta.node_index));
        let store = context
            .store_factory
            .open(&path, meta.partition_id, meta.partition_size)?;

        let partition = Arc::new(EcPartition {
            logger,
            meta,
            path,
            disk,
            store,
            options: context.options.clone(),
            state: RwLock::new(EcPartitionState {
                status: PartitionStatus::ReadWrite,
                used: 0,
                usage_refreshed_at: None,
            }),
            scheduler: Mutex::new(None),
        });
        partition.status_update();
        Ok(partition)
    }

    pub fn persist_meta(&self) -> Result<(), PartitionError> {
        write_meta_file(&self.path, &self.meta)?;
        slog::info!(self.logger, "Persisted meta {:?}", self.meta);
        Ok(())
    }

    /// Like the data partition status update, except that `Unavailable` never recovers.
    pub fn status_update(&self) {
        let refresh_due = {
            let state = self.state.read().expect("EcPartition.state lock guard poison");
            state
                .usage_refreshed_at
                .map_or(true, |at| at.elapsed() >= self.options.usage_refresh_interval)
        };

        let fresh_usage = if refresh_due {
            match self.store.used_size() {
                Ok(used) => Some(used),
                Err(e) => {
                    self.check_disk_error(&e);
                    return;
                }
            }
        } else {
            None
        };

        let extent_count = self.store.count();
        let disk_status = self.disk.status();
        let mut state = self.state.write().expect("EcPartition.state lock guard poison");
        if let Some(used) = fresh_usage {
            state.used = used;
            state.usage_refreshed_at = Some(Instant::now());
        }

        let mut computed = status_from_usage(
            state.used,
            self.meta.partition_size,
            extent_count,
            self.options.max_active_extents,
        );
        if state.status == PartitionStatus::Unavailable {
            computed = PartitionStatus::Unavailable;
        }
        state.status = computed.clamp_to_disk(disk_status);
    }

    pub fn check_disk_error(&self, error: &io::Error) -> bool {
        if !is_disk_error(error) {
            return false;
        }
        slog::error!(self.logger, "Disk error on {:?}: {}", self.disk.path(), error);
        self.disk.record_io_error();
        let mut state = self.state.write().expect("EcPartition.state lock guard poison");
        state.status = state.status.clamp_to_disk(self.disk.status());
        true
    }

    pub fn is_stripe_read(&self, offset: u64, size: u32) -> bool {
        self.geometry().is_stripe_read(self.meta.node_index, offset, size)
    }

    pub fn local_read(&self, extent_id: ExtentId, offset: u64, size: u32) -> Result<Bytes, StripeReadError> {
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

    pub async fn remote_read(
        &self,
        peers: &dyn PeerClient,
        node_index: u32,
        extent_id: ExtentId,
        offset: u64,
        size: u32,
    ) -> Result<Bytes, StripeReadError> {
        let addr = self
            .meta
            .data_nodes
            .get(node_index as usize)
            .ok_or(StripeReadError::NodeIndexOutOfRange(node_index))?;

        peers
            .read_extent(addr, self.meta.partition_id, extent_id, offset, size)
            .await
            .map_err(|source| StripeReadError::Remote {
                addr: addr.clone(),
                source,
            })
    }

    /// Serves a read, fanning out to the other data nodes when the range is not all local.
    pub async fn read(
        self: &Arc<Self>,
        peers: &Arc<dyn PeerClient>,
        extent_id: ExtentId,
        offset: u64,
        size: u32,
    ) -> Result<Bytes, StripeReadError> {
        if self.is_stripe_read(offset, size) {
            stripe_read(self, peers, extent_id, offset, size).await
        } else {
            self.local_read(extent_id, offset, size)
        }
    }

    pub(crate) fn attach_scheduler(&self, handle: TickerHandle) {
        *self.scheduler.lock().expect("EcPartition.scheduler mutex guard poison") = Some(handle);
    }

    pub fn stop(&self) {
        self.scheduler
            .lock()
            .expect("EcPartition.scheduler mutex guard poison")
            .take();
        self.store.close();
    }

    pub fn geometry(&self) -> StripeGeometry {
        StripeGeometry {
            stripe_block_size: self.meta.stripe_block_size,
            data_node_num: self.meta.data_node_num,
        }
    }

    pub fn logger(&self) -> &slog::Logger {
        &self.logger
    }

    pub fn meta(&self) -> &EcPartitionMeta {
        &self.meta
    }

    pub fn partition_id(&self) -> u64 {
        self.meta.partition_id
    }

    pub fn node_index(&self) -> u32 {
        self.meta.node_index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &Arc<dyn ExtentStore> {
        &self.store
    }

    pub fn status(&self) -> PartitionStatus {
        self.state.read().expect("EcPartition.state lock guard poison").status
    }

    pub fn used(&self) -> u64 {
        self.state.read().expect("EcPartition.state lock guard poison").used
    }

    /// EC replicas take part in neither raft nor the CRC compare.
    pub fn report(&self) -> PartitionReport {
        let state = self.state.read().expect("EcPartition.state lock guard poison");
        PartitionReport {
            partition_id: self.meta.partition_id,
            volume_id: self.meta.volume_id.clone(),
            status: state.status,
            total: self.meta.partition_size,
            used: state.used,
            extent_count: self.store.count() as u64,
            is_leader: false,
            need_compare: false,
            disk_path: self.disk.path().display().to_string(),
        }
    }
}
