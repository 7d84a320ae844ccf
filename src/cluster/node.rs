use crate::consensus::NodeId;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::time::{Duration, Instant};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Data,
    Meta,
}

struct NodeState {
    total: u64,
    used: u64,
    active: bool,
    report_time: Instant,
    partition_count: usize,
}

/// The cluster's view of one storage or metadata node, refreshed by heartbeats.
pub struct ClusterNode {
    id: NodeId,
    addr: String,
    kind: NodeKind,
    node_set_id: u64,
    state: Mutex<NodeState>,
}

impl ClusterNode {
    /// A freshly registered node counts as active until it misses heartbeats.
    pub fn new(id: NodeId, addr: impl Into<String>, kind: NodeKind, node_set_id: u64) -> Self {
        ClusterNode {
            id,
            addr: addr.into(),
            kind,
            node_set_id,
            state: Mutex::new(NodeState {
                total: 0,
                used: 0,
                active: true,
                report_time: Instant::now(),
                partition_count: 0,
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn node_set_id(&self) -> u64 {
        self.node_set_id
    }

    pub fn is_active(&self) -> bool {
        self.state().active
    }

    pub fn total(&self) -> u64 {
        self.state().total
    }

    pub fn used(&self) -> u64 {
        self.state().used
    }

    pub fn partition_count(&self) -> usize {
        self.state().partition_count
    }

    pub fn report_time(&self) -> Instant {
        self.state().report_time
    }

    /// A node that has not reported capacity yet is treated as full.
    pub fn used_ratio(&self) -> f64 {
        let state = self.state();
        if state.total == 0 {
            return 1.0;
        }
        state.used as f64 / state.total as f64
    }

    pub fn update_metrics(&self, total: u64, used: u64, partition_count: usize) {
        let mut state = self.state();
        state.total = total;
        state.used = used;
        state.partition_count = partition_count;
    }

    pub fn set_active(&self) {
        let mut state = self.state();
        state.active = true;
        state.report_time = Instant::now();
    }

    /// Marks the node inactive if its last report is older than `timeout`. Returns whether the
    /// node went from active to inactive.
    pub fn check_liveness(&self, timeout: Duration) -> bool {
        let mut state = self.state();
        if state.active && state.report_time.elapsed() > timeout {
            state.active = false;
            return true;
        }
        false
    }

    fn state(&self) -> std::sync::MutexGuard<'_, NodeState> {
        self.state.lock().expect("ClusterNode.state lock guard poison")
    }
}
