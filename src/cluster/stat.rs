use crate::cluster::{Cluster, NodeKind};
use serde::Serialize;

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeStat {
    pub total: u64,
    pub used: u64,
    pub used_ratio: f64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterStat {
    pub data_nodes: NodeStat,
    pub meta_nodes: NodeStat,
}

impl Cluster {
    /// Sums capacity over data and meta nodes. A kind with no reported capacity keeps its
    /// previous figures.
    pub fn update_stat_info(&self) -> ClusterStat {
        let data = self.node_stat(NodeKind::Data);
        let meta = self.node_stat(NodeKind::Meta);

        let mut stat = self.stat.lock().expect("Cluster.stat lock guard poison");
        if let Some(data) = data {
            stat.data_nodes = data;
        }
        if let Some(meta) = meta {
            stat.meta_nodes = meta;
        }
        *stat
    }

    pub fn stat(&self) -> ClusterStat {
        *self.stat.lock().expect("Cluster.stat lock guard poison")
    }

    fn node_stat(&self, kind: NodeKind) -> Option<NodeStat> {
        let (total, used) = self
            .topology
            .nodes(kind)
            .iter()
            .fold((0u64, 0u64), |(total, used), node| (total + node.total(), used + node.used()));
        if total == 0 {
            return None;
        }

        let used_ratio = used as f64 / total as f64;
        if used_ratio > self.options.space_warn_ratio {
            slog::warn!(
                self.logger,
                "{:?} node space utilization reached {:.3} (used {}, total {}), add nodes",
                kind,
                used_ratio,
                used,
                total
            );
        }
        Some(NodeStat { total, used, used_ratio })
    }
}
