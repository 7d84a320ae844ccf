use crate::cluster::{ClusterNode, NodeKind};
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Registered nodes, grouped into node-sets for placement.
pub struct Topology {
    nodes: RwLock<HashMap<String, Arc<ClusterNode>>>,
}

impl Topology {
    pub fn new() -> Self {
        Topology {
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Returns false if a node with the same address is already registered.
    pub fn register(&self, node: Arc<ClusterNode>) -> bool {
        let mut nodes = self.nodes.write().expect("Topology.nodes lock guard poison");
        if nodes.contains_key(node.addr()) {
            return false;
        }
        nodes.insert(node.addr().to_string(), node);
        true
    }

    pub fn node(&self, addr: &str) -> Option<Arc<ClusterNode>> {
        self.nodes
            .read()
            .expect("Topology.nodes lock guard poison")
            .get(addr)
            .cloned()
    }

    pub fn nodes(&self, kind: NodeKind) -> Vec<Arc<ClusterNode>> {
        self.nodes
            .read()
            .expect("Topology.nodes lock guard poison")
            .values()
            .filter(|node| node.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn all_nodes(&self) -> Vec<Arc<ClusterNode>> {
        self.nodes
            .read()
            .expect("Topology.nodes lock guard poison")
            .values()
            .cloned()
            .collect()
    }

    /// Picks a node to take over a replica. Nodes in `preferred_set` are tried first, then every
    /// other node-set in id order.
    pub fn choose_replacement(
        &self,
        kind: NodeKind,
        preferred_set: u64,
        exclude: &[String],
        max_used_ratio: f64,
    ) -> Option<Arc<ClusterNode>> {
        let mut by_set: BTreeMap<u64, Vec<Arc<ClusterNode>>> = BTreeMap::new();
        for node in self.nodes(kind) {
            by_set.entry(node.node_set_id()).or_default().push(node);
        }

        if let Some(nodes) = by_set.remove(&preferred_set) {
            if let Some(node) = least_used(&nodes, exclude, max_used_ratio) {
                return Some(node);
            }
        }
        by_set
            .values()
            .find_map(|nodes| least_used(nodes, exclude, max_used_ratio))
    }

    /// Picks `count` distinct writable nodes for a new partition.
    pub fn choose_hosts(&self, kind: NodeKind, count: usize, max_used_ratio: f64) -> Vec<Arc<ClusterNode>> {
        let nodes = self.nodes(kind);
        let mut chosen: Vec<Arc<ClusterNode>> = Vec::with_capacity(count);
        let mut exclude: Vec<String> = Vec::with_capacity(count);
        while chosen.len() < count {
            match least_used(&nodes, &exclude, max_used_ratio) {
                Some(node) => {
                    exclude.push(node.addr().to_string());
                    chosen.push(node);
                }
                None => break,
            }
        }
        chosen
    }
}

impl Default for Topology {
    fn default() -> Self {
        Topology::new()
    }
}

// Active, below the usage threshold and not excluded; ties broken at random.
fn least_used(nodes: &[Arc<ClusterNode>], exclude: &[String], max_used_ratio: f64) -> Option<Arc<ClusterNode>> {
    let candidates: Vec<(f64, &Arc<ClusterNode>)> = nodes
        .iter()
        .filter(|node| node.is_active() && !exclude.iter().any(|addr| addr == node.addr()))
        .map(|node| (node.used_ratio(), node))
        .filter(|(ratio, _)| *ratio < max_used_ratio)
        .collect();

    let lowest = candidates
        .iter()
        .map(|(ratio, _)| *ratio)
        .fold(f64::INFINITY, f64::min);
    let best: Vec<&Arc<ClusterNode>> = candidates
        .iter()
        .filter(|(ratio, _)| *ratio == lowest)
        .map(|(_, node)| *node)
        .collect();

    best.choose(&mut rand::thread_rng()).map(|node| Arc::clone(node))
}
