use crate::partition::PartitionStatus;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Disk is one data directory of a node. Every partition hosted on it is clamped to its status.
pub struct Disk {
    path: PathBuf,
    total: u64,
    status: RwLock<PartitionStatus>,
    read_error_count: AtomicU64,
    write_error_count: AtomicU64,
}

impl Disk {
    pub fn new(path: impl Into<PathBuf>, total: u64) -> Self {
        Disk {
            path: path.into(),
            total,
            status: RwLock::new(PartitionStatus::ReadWrite),
            read_error_count: AtomicU64::new(0),
            write_error_count: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn status(&self) -> PartitionStatus {
        *self.status.read().expect("Disk.status() lock guard poison")
    }

    pub fn set_status(&self, status: PartitionStatus) {
        *self.status.write().expect("Disk.set_status() lock guard poison") = status;
    }

    /// A disk I/O error was observed. The disk stays unavailable until an operator intervenes.
    pub fn record_io_error(&self) {
        self.read_error_count.fetch_add(1, Ordering::Relaxed);
        self.write_error_count.fetch_add(1, Ordering::Relaxed);
        self.set_status(PartitionStatus::Unavailable);
    }

    pub fn read_error_count(&self) -> u64 {
        self.read_error_count.load(Ordering::Relaxed)
    }

    pub fn write_error_count(&self) -> u64 {
        self.write_error_count.load(Ordering::Relaxed)
    }
}
