use crate::consensus::Peer;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

pub const META_FILE_NAME: &str = "META";
pub const TEMP_META_FILE_NAME: &str = ".meta";

const CREATE_TIME_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, thiserror::Error)]
pub enum MetaFileError {
    #[error("Meta file I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error("Meta file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Meta file rejected: {0}")]
    Invalid(&'static str),
}

/// Persisted identity of a data partition replica, enough to reopen it after a restart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataPartitionMeta {
    #[serde(rename = "VolumeID")]
    pub volume_id: String,
    #[serde(rename = "PartitionID")]
    pub partition_id: u64,
    #[serde(rename = "PartitionSize")]
    pub partition_size: u64,
    #[serde(rename = "CreateTime")]
    pub create_time: String,
    #[serde(rename = "RandomWrite", default)]
    pub random_write: bool,
    #[serde(rename = "Peers")]
    pub peers: Vec<Peer>,
}

impl DataPartitionMeta {
    pub fn validate(&self) -> Result<(), MetaFileError> {
        if self.volume_id.trim().is_empty() {
            return Err(MetaFileError::Invalid("empty volume ID"));
        }
        if self.partition_id == 0 {
            return Err(MetaFileError::Invalid("partition ID is 0"));
        }
        if self.partition_size == 0 {
            return Err(MetaFileError::Invalid("partition size is 0"));
        }
        if self.peers.is_empty() {
            return Err(MetaFileError::Invalid("no peers"));
        }
        let unique: HashSet<_> = self.peers.iter().map(|p| p.id).collect();
        if unique.len() != self.peers.len() {
            return Err(MetaFileError::Invalid("duplicate peer ID"));
        }

        Ok(())
    }
}

pub(crate) fn create_time_now() -> String {
    chrono::Local::now().format(CREATE_TIME_LAYOUT).to_string()
}

/// Atomically replaces `dir/META`: the document is written and fsync'ed to a temp file which is
/// then renamed over the old one, so a crash never leaves a torn meta file behind.
pub fn write_meta_file<T: Serialize>(dir: &Path, meta: &T) -> Result<(), MetaFileError> {
    let bytes = serde_json::to_vec(meta)?;
    let temp_path = dir.join(TEMP_META_FILE_NAME);

    let mut file = File::create(&temp_path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, dir.join(META_FILE_NAME))?;
    Ok(())
}

pub fn read_meta_file<T: DeserializeOwned>(dir: &Path) -> Result<T, MetaFileError> {
    let bytes = fs::read(dir.join(META_FILE_NAME))?;
    Ok(serde_json::from_slice(&bytes)?)
}
