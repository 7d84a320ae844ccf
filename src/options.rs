use std::convert::TryFrom;
use tokio::time::Duration;

/// Tunables of a storage node. Every field is optional; missing values fall back to the
/// defaults applied by [`DataNodeOptionsValidated::try_from`].
#[derive(Clone, Default)]
pub struct DataNodeOptions {
    pub status_update_interval: Option<Duration>,
    pub usage_refresh_interval: Option<Duration>,
    pub replica_hosts_refresh_interval: Option<Duration>,
    pub max_active_extents: Option<usize>,
    pub min_fix_tiny_extents: Option<usize>,
    pub simultaneously_recover_files: Option<usize>,
    pub repair_read_chunk_size: Option<u32>,
    pub rpc_timeout: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct DataNodeOptionsValidated {
    pub status_update_interval: Duration,
    pub usage_refresh_interval: Duration,
    pub replica_hosts_refresh_interval: Duration,
    pub max_active_extents: usize,
    pub min_fix_tiny_extents: usize,
    pub simultaneously_recover_files: usize,
    pub repair_read_chunk_size: u32,
    pub rpc_timeout: Duration,
}

impl DataNodeOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.status_update_interval == Duration::from_secs(0) {
            return Err("Status update interval must be non-zero");
        }
        if self.max_active_extents == 0 {
            return Err("Max active extents must be non-zero");
        }
        if self.simultaneously_recover_files == 0 {
            return Err("At least one extent fix must be allowed to run at a time");
        }
        if self.repair_read_chunk_size == 0 {
            return Err("Repair read chunk size must be non-zero");
        }
        if self.rpc_timeout == Duration::from_secs(0) {
            return Err("RPC timeout must be non-zero");
        }

        Ok(())
    }
}

impl TryFrom<DataNodeOptions> for DataNodeOptionsValidated {
    type Error = &'static str;

    fn try_from(options: DataNodeOptions) -> Result<Self, Self::Error> {
        let values = DataNodeOptionsValidated {
            status_update_interval: options.status_update_interval.unwrap_or(Duration::from_secs(10)),
            usage_refresh_interval: options.usage_refresh_interval.unwrap_or(Duration::from_secs(60)),
            replica_hosts_refresh_interval: options
                .replica_hosts_refresh_interval
                .unwrap_or(Duration::from_secs(60)),
            max_active_extents: options.max_active_extents.unwrap_or(20_000),
            min_fix_tiny_extents: options.min_fix_tiny_extents.unwrap_or(10),
            simultaneously_recover_files: options.simultaneously_recover_files.unwrap_or(7),
            repair_read_chunk_size: options.repair_read_chunk_size.unwrap_or(64 * 1024),
            rpc_timeout: options.rpc_timeout.unwrap_or(Duration::from_secs(5)),
        };

        values.validate()?;
        Ok(values)
    }
}

/// Tunables of the cluster manager.
#[derive(Clone, Default)]
pub struct ClusterOptions {
    pub heartbeat_interval: Option<Duration>,
    pub node_timeout: Option<Duration>,
    pub replica_timeout: Option<Duration>,
    pub load_response_polls: Option<u32>,
    pub load_response_poll_interval: Option<Duration>,
    pub consistency_check_interval: Option<Duration>,
    pub retry_send_sync_task_interval: Option<Duration>,
    pub meta_node_memory_threshold: Option<f64>,
    pub meta_partition_split_watermark: Option<u64>,
    pub inode_id_step: Option<u64>,
    pub space_warn_ratio: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct ClusterOptionsValidated {
    pub heartbeat_interval: Duration,
    pub node_timeout: Duration,
    pub replica_timeout: Duration,
    pub load_response_polls: u32,
    pub load_response_poll_interval: Duration,
    pub consistency_check_interval: Duration,
    pub retry_send_sync_task_interval: Duration,
    pub meta_node_memory_threshold: f64,
    pub meta_partition_split_watermark: u64,
    pub inode_id_step: u64,
    pub space_warn_ratio: f64,
}

impl ClusterOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.heartbeat_interval == Duration::from_secs(0) {
            return Err("Heartbeat interval must be non-zero");
        }
        if self.node_timeout <= self.heartbeat_interval {
            return Err("Node timeout must be greater than the heartbeat interval");
        }
        if self.replica_timeout <= self.heartbeat_interval {
            return Err("Replica timeout must be greater than the heartbeat interval");
        }
        if self.load_response_polls == 0 {
            return Err("Load response poll count must be non-zero");
        }
        if !(0.0..=1.0).contains(&self.meta_node_memory_threshold) {
            return Err("Meta node memory threshold must be a ratio in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.space_warn_ratio) {
            return Err("Space warn ratio must be a ratio in [0, 1]");
        }
        if self.inode_id_step == 0 {
            return Err("Inode ID step must be non-zero");
        }

        Ok(())
    }
}

impl TryFrom<ClusterOptions> for ClusterOptionsValidated {
    type Error = &'static str;

    fn try_from(options: ClusterOptions) -> Result<Self, Self::Error> {
        let values = ClusterOptionsValidated {
            heartbeat_interval: options.heartbeat_interval.unwrap_or(Duration::from_secs(60)),
            node_timeout: options.node_timeout.unwrap_or(Duration::from_secs(180)),
            replica_timeout: options.replica_timeout.unwrap_or(Duration::from_secs(600)),
            load_response_polls: options.load_response_polls.unwrap_or(120),
            load_response_poll_interval: options.load_response_poll_interval.unwrap_or(Duration::from_secs(1)),
            consistency_check_interval: options
                .consistency_check_interval
                .unwrap_or(Duration::from_secs(120)),
            retry_send_sync_task_interval: options
                .retry_send_sync_task_interval
                .unwrap_or(Duration::from_secs(3)),
            meta_node_memory_threshold: options.meta_node_memory_threshold.unwrap_or(0.75),
            meta_partition_split_watermark: options.meta_partition_split_watermark.unwrap_or(1 << 23),
            inode_id_step: options.inode_id_step.unwrap_or(1 << 24),
            space_warn_ratio: options.space_warn_ratio.unwrap_or(0.9),
        };

        values.validate()?;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_node_defaults() {
        let validated = DataNodeOptionsValidated::try_from(DataNodeOptions::default()).unwrap();
        assert_eq!(validated.status_update_interval, Duration::from_secs(10));
        assert_eq!(validated.simultaneously_recover_files, 7);
        assert_eq!(validated.min_fix_tiny_extents, 10);
    }

    #[test]
    fn data_node_rejects_zero_concurrency() {
        let options = DataNodeOptions {
            simultaneously_recover_files: Some(0),
            ..Default::default()
        };
        assert!(DataNodeOptionsValidated::try_from(options).is_err());
    }

    #[test]
    fn cluster_rejects_timeout_shorter_than_heartbeat() {
        let options = ClusterOptions {
            heartbeat_interval: Some(Duration::from_secs(10)),
            node_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        assert!(ClusterOptionsValidated::try_from(options).is_err());
    }

    #[test]
    fn cluster_rejects_bad_threshold() {
        let options = ClusterOptions {
            meta_node_memory_threshold: Some(1.5),
            ..Default::default()
        };
        assert!(ClusterOptionsValidated::try_from(options).is_err());
    }
}
