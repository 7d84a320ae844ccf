use crate::cluster::ClusterNode;
use crate::partition::PartitionStatus;
use crate::rpc::{MetaPartitionReport, PartitionReport};
use std::sync::Arc;
use tokio::time::{Duration, Instant};

/// The cluster's record of one replica, derived from heartbeats and never persisted.
#[derive(Clone)]
pub struct Replica {
    node: Arc<ClusterNode>,
    pub report_time: Instant,
    pub file_count: u64,
    pub total: u64,
    pub used: u64,
    pub is_leader: bool,
    pub status: PartitionStatus,
    pub need_compare: bool,
    pub disk_path: String,
    /// Whether the replica answered the current load round.
    pub load_responded: bool,
    pub max_inode_id: u64,
    pub inode_count: u64,
    pub dentry_count: u64,
}

impl Replica {
    pub fn new(node: Arc<ClusterNode>) -> Self {
        Replica {
            node,
            report_time: Instant::now(),
            file_count: 0,
            total: 0,
            used: 0,
            is_leader: false,
            status: PartitionStatus::ReadWrite,
            need_compare: false,
            disk_path: String::new(),
            load_responded: false,
            max_inode_id: 0,
            inode_count: 0,
            dentry_count: 0,
        }
    }

    pub fn addr(&self) -> &str {
        self.node.addr()
    }

    pub fn node(&self) -> &Arc<ClusterNode> {
        &self.node
    }

    pub fn update_from_report(&mut self, report: &PartitionReport) {
        self.report_time = Instant::now();
        self.file_count = report.extent_count;
        self.total = report.total;
        self.used = report.used;
        self.is_leader = report.is_leader;
        self.status = report.status;
        self.need_compare = report.need_compare;
        self.disk_path = report.disk_path.clone();
    }

    pub fn update_from_meta_report(&mut self, report: &MetaPartitionReport) {
        self.report_time = Instant::now();
        self.is_leader = report.is_leader;
        self.status = report.status;
        self.max_inode_id = report.max_inode_id;
        self.inode_count = report.inode_count;
        self.dentry_count = report.dentry_count;
        // Metadata replicas are compared on every round.
        self.need_compare = true;
    }

    pub fn is_live(&self, timeout: Duration) -> bool {
        self.node.is_active() && self.status != PartitionStatus::Unavailable && self.report_time.elapsed() <= timeout
    }

    /// No report for longer than `timeout`, regardless of node state.
    pub fn is_missing(&self, timeout: Duration) -> bool {
        self.report_time.elapsed() > timeout
    }
}
