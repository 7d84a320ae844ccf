use crate::cluster::VolumeRecord;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct Volume {
    name: String,
    replica_num: u8,
    random_write: bool,
    mark_delete: AtomicBool,
}

impl Volume {
    /// A volume whose data partitions accept overwrites.
    pub fn new(name: impl Into<String>, replica_num: u8) -> Self {
        Volume {
            name: name.into(),
            replica_num,
            random_write: true,
            mark_delete: AtomicBool::new(false),
        }
    }

    pub fn append_only(mut self) -> Self {
        self.random_write = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn replica_num(&self) -> u8 {
        self.replica_num
    }

    pub fn random_write(&self) -> bool {
        self.random_write
    }

    /// Reports for partitions of a volume marked for deletion are ignored.
    pub fn is_marked_delete(&self) -> bool {
        self.mark_delete.load(Ordering::Acquire)
    }

    pub fn mark_delete(&self) {
        self.mark_delete.store(true, Ordering::Release);
    }

    pub fn record(&self) -> VolumeRecord {
        VolumeRecord {
            name: self.name.clone(),
            replica_num: self.replica_num,
            random_write: self.random_write,
            mark_delete: self.is_marked_delete(),
        }
    }
}
