use crate::storage::{ExtentCrc, ExtentId, ExtentInfo};
use std::io;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExtentFilter {
    All,
    Normal,
    Tiny,
}

/// ExtentStore is the byte storage of one partition replica, keyed by extent ID.
///
/// Writes are append-only length extensions as far as the replication core is concerned: repair
/// only ever writes at an offset equal to the extent's current size.
pub trait ExtentStore: Send + Sync {
    fn exists(&self, extent_id: ExtentId) -> bool;

    /// Current length of one extent.
    fn size(&self, extent_id: ExtentId) -> io::Result<u64>;

    /// Creates an empty extent. `inode` is the owning file, kept as a hint.
    fn create(&self, extent_id: ExtentId, inode: u64) -> io::Result<()>;

    /// Reads exactly `buf.len()` bytes starting at `offset`.
    fn read(&self, extent_id: ExtentId, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&self, extent_id: ExtentId, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Sizes of every extent matched by `filter`, ordered by extent ID.
    fn watermarks(&self, filter: ExtentFilter) -> io::Result<Vec<ExtentInfo>>;

    fn count(&self) -> usize;

    /// Bytes of disk used by the store.
    fn used_size(&self) -> io::Result<u64>;

    fn snapshot(&self) -> io::Result<Vec<ExtentCrc>>;

    /// Physically removes extents that were marked deleted.
    fn flush_delete(&self) -> io::Result<()>;

    fn tiny_extent_ids(&self) -> RangeInclusive<ExtentId>;

    fn is_tiny_extent(&self, extent_id: ExtentId) -> bool {
        self.tiny_extent_ids().contains(&extent_id)
    }

    /// Tiny extents waiting for a length check against the other replicas.
    fn pending_tiny_extents(&self) -> Vec<ExtentId>;

    /// Moves up to `count` available tiny extents into the pending-check set and returns how
    /// many were moved.
    fn promote_tiny_extents(&self, count: usize) -> usize;

    /// Returns checked tiny extents to the available set.
    fn release_tiny_extents(&self, extent_ids: &[ExtentId]);

    fn close(&self);
}

pub trait ExtentStoreFactory: Send + Sync {
    fn open(&self, path: &Path, partition_id: u64, partition_size: u64) -> io::Result<Arc<dyn ExtentStore>>;
}
