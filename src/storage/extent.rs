use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

pub type ExtentId = u64;

// Tiny extents are pre-allocated at the bottom of every store's ID space and shared by small
// files. Everything above the range is a normal extent.
pub const TINY_EXTENT_START_ID: ExtentId = 1;
pub const TINY_EXTENT_COUNT: u64 = 64;

pub fn default_tiny_extent_ids() -> RangeInclusive<ExtentId> {
    TINY_EXTENT_START_ID..=(TINY_EXTENT_START_ID + TINY_EXTENT_COUNT - 1)
}

/// Size/provenance of one extent as seen by one replica. Inside repair task lists `size` is the
/// target size and `source` the replica to copy from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtentInfo {
    #[serde(rename = "FileID")]
    pub file_id: ExtentId,
    pub size: u64,
    #[serde(default)]
    pub inode: u64,
    #[serde(default)]
    pub crc: u32,
    #[serde(default)]
    pub source: String,
}

impl ExtentInfo {
    pub fn new(file_id: ExtentId, size: u64) -> Self {
        ExtentInfo {
            file_id,
            size,
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// One entry of a partition snapshot, compared across replicas by the consistency checker.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtentCrc {
    pub extent_id: ExtentId,
    pub size: u64,
    pub crc: u32,
}
