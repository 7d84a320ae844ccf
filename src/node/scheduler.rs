use crate::ec::EcPartition;
use crate::partition::DataPartition;
use crate::repair::{ExtentRepairMode, RepairEngine};
use crate::util::spawn_ticker;
use std::sync::Arc;
use tokio::time::Duration;

/// Starts the per-partition background loop: every tick recomputes the status, runs one repair
/// cycle (tiny and normal extents alternate) and refreshes the cached snapshot.
///
/// The loop only holds a weak reference, so it ends with the partition or with `stop()`.
pub(crate) fn start_partition_scheduler(partition: &Arc<DataPartition>, repair: Arc<RepairEngine>, period: Duration) {
    let weak = Arc::downgrade(partition);
    let logger = partition.logger().clone();

    let handle = spawn_ticker(logger, "PartitionScheduler", period, move |tick| {
        let weak = weak.clone();
        let repair = repair.clone();
        async move {
            let partition = match weak.upgrade() {
                Some(partition) => partition,
                None => return,
            };

            partition.status_update();

            let mode = ExtentRepairMode::for_tick(tick);
            if let Err(e) = repair.launch_repair(&partition, mode).await {
                slog::warn!(partition.logger(), "{:?} repair cycle skipped: {}", mode, e);
            }

            if let Err(e) = partition.reload_snapshot() {
                slog::warn!(partition.logger(), "Snapshot reload failed: {}", e);
            }
        }
    });

    partition.attach_scheduler(handle);
}

pub(crate) fn start_ec_scheduler(partition: &Arc<EcPartition>, period: Duration) {
    let weak = Arc::downgrade(partition);
    let logger = partition.logger().clone();

    let handle = spawn_ticker(logger, "EcPartitionScheduler", period, move |_| {
        let weak = weak.clone();
        async move {
            if let Some(partition) = weak.upgrade() {
                partition.status_update();
            }
        }
    });

    partition.attach_scheduler(handle);
}
