use crate::cluster::PersistError;
use crate::consensus::Peer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionKind {
    Data,
    Meta,
}

/// Durable part of a cluster-side partition. The host list here is the source of truth.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PartitionRecord {
    #[serde(rename = "PartitionID")]
    pub partition_id: u64,
    #[serde(rename = "VolumeID")]
    pub volume_id: String,
    pub kind: PartitionKind,
    #[serde(default)]
    pub partition_size: u64,
    #[serde(default)]
    pub random_write: bool,
    pub replica_num: u8,
    pub hosts: Vec<String>,
    pub peers: Vec<Peer>,
    #[serde(default)]
    pub start: u64,
    #[serde(default)]
    pub end: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeRecord {
    pub name: String,
    pub replica_num: u8,
    #[serde(default)]
    pub random_write: bool,
    pub mark_delete: bool,
}

/// Where the cluster keeps partition membership and volume records.
#[async_trait::async_trait]
pub trait ClusterStore: Send + Sync {
    async fn put_partition(&self, record: &PartitionRecord) -> Result<(), PersistError>;

    async fn put_volume(&self, record: &VolumeRecord) -> Result<(), PersistError>;
}

/// Keeps records as JSON in memory. Writes can be made to fail for tests of the persist path.
pub struct InMemoryClusterStore {
    partitions: Mutex<HashMap<u64, String>>,
    volumes: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl InMemoryClusterStore {
    pub fn new() -> Self {
        InMemoryClusterStore {
            partitions: Mutex::new(HashMap::new()),
            volumes: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    pub fn partition(&self, partition_id: u64) -> Option<PartitionRecord> {
        let partitions = self
            .partitions
            .lock()
            .expect("InMemoryClusterStore.partitions lock guard poison");
        partitions
            .get(&partition_id)
            .and_then(|json| serde_json::from_str(json).ok())
    }

    pub fn volume(&self, name: &str) -> Option<VolumeRecord> {
        let volumes = self
            .volumes
            .lock()
            .expect("InMemoryClusterStore.volumes lock guard poison");
        volumes.get(name).and_then(|json| serde_json::from_str(json).ok())
    }

    fn check_available(&self) -> Result<(), PersistError> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(PersistError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryClusterStore {
    fn default() -> Self {
        InMemoryClusterStore::new()
    }
}

#[async_trait::async_trait]
impl ClusterStore for InMemoryClusterStore {
    async fn put_partition(&self, record: &PartitionRecord) -> Result<(), PersistError> {
        self.check_available()?;
        let json = serde_json::to_string(record)?;
        self.partitions
            .lock()
            .expect("InMemoryClusterStore.partitions lock guard poison")
            .insert(record.partition_id, json);
        Ok(())
    }

    async fn put_volume(&self, record: &VolumeRecord) -> Result<(), PersistError> {
        self.check_available()?;
        let json = serde_json::to_string(record)?;
        self.volumes
            .lock()
            .expect("InMemoryClusterStore.volumes lock guard poison")
            .insert(record.name.clone(), json);
        Ok(())
    }
}
