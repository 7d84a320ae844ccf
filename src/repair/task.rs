use crate::storage::{ExtentId, ExtentInfo};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which extents one repair cycle looks at. Cycles alternate between the two.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtentRepairMode {
    Tiny,
    Normal,
}

impl ExtentRepairMode {
    /// Even ticks check tiny extents, odd ticks check normal ones.
    pub fn for_tick(tick: u64) -> Self {
        if tick % 2 == 0 {
            ExtentRepairMode::Tiny
        } else {
            ExtentRepairMode::Normal
        }
    }
}

/// Work one replica must do to catch up with the largest copy of every extent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairTask {
    #[serde(rename = "AddExtentsTasks")]
    pub add_extents: Vec<ExtentInfo>,
    #[serde(rename = "FixExtentSizeTasks")]
    pub fix_extent_sizes: Vec<ExtentInfo>,
}

impl RepairTask {
    pub fn is_empty(&self) -> bool {
        self.add_extents.is_empty() && self.fix_extent_sizes.is_empty()
    }
}

/// The extents one replica reported, keyed by its address.
#[derive(Clone, Debug)]
pub struct ReplicaInventory {
    pub addr: String,
    pub extents: Vec<ExtentInfo>,
}

/// Builds one task per replica, in the order of `replicas`.
///
/// For every extent the largest reported copy is the target and its replica the source. Replicas
/// that lack a normal extent get an add task, replicas with a shorter copy get a fix task. In
/// tiny mode only the extents in `pending_tiny` are looked at, and tiny extents are never added
/// because every store pre-allocates them.
pub fn compute_repair_tasks<F>(
    mode: ExtentRepairMode,
    replicas: &[ReplicaInventory],
    is_tiny: F,
    pending_tiny: &BTreeSet<ExtentId>,
) -> Vec<RepairTask>
where
    F: Fn(ExtentId) -> bool,
{
    let in_scope = |extent_id: ExtentId| match mode {
        ExtentRepairMode::Normal => !is_tiny(extent_id),
        ExtentRepairMode::Tiny => is_tiny(extent_id) && pending_tiny.contains(&extent_id),
    };

    let mut largest: BTreeMap<ExtentId, ExtentInfo> = BTreeMap::new();
    let mut per_replica: Vec<BTreeMap<ExtentId, u64>> = Vec::with_capacity(replicas.len());
    for replica in replicas {
        let mut sizes = BTreeMap::new();
        for extent in replica.extents.iter().filter(|e| in_scope(e.file_id)) {
            sizes.insert(extent.file_id, extent.size);
            let replace = match largest.get(&extent.file_id) {
                Some(current) => extent.size > current.size,
                None => true,
            };
            if replace {
                largest.insert(extent.file_id, extent.clone().with_source(replica.addr.clone()));
            }
        }
        per_replica.push(sizes);
    }

    per_replica
        .iter()
        .map(|sizes| {
            let mut task = RepairTask::default();
            for (extent_id, target) in &largest {
                match sizes.get(extent_id) {
                    None if mode == ExtentRepairMode::Normal => task.add_extents.push(target.clone()),
                    None => {}
                    Some(size) if *size < target.size => task.fix_extent_sizes.push(target.clone()),
                    Some(_) => {}
                }
            }
            task
        })
        .collect()
}
