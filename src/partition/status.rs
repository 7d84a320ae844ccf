use serde::{Deserialize, Serialize};
use std::cmp;

/// Serving status of a partition replica or a disk. Variants are declared worst-first so the
/// derived ordering lets a disk fault dominate with a plain `min`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PartitionStatus {
    Unavailable,
    ReadOnly,
    ReadWrite,
}

impl PartitionStatus {
    pub fn clamp_to_disk(self, disk_status: PartitionStatus) -> PartitionStatus {
        cmp::min(self, disk_status)
    }

    pub fn is_writable(self) -> bool {
        self == PartitionStatus::ReadWrite
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadExtentHeaderStatus {
    NotStarted,
    InProgress,
    Finished,
}

/// Status a partition deserves from its own usage alone, before the disk clamp.
pub(crate) fn status_from_usage(used: u64, size: u64, extent_count: usize, max_active_extents: usize) -> PartitionStatus {
    if used >= size || extent_count >= max_active_extents {
        PartitionStatus::ReadOnly
    } else {
        PartitionStatus::ReadWrite
    }
}
