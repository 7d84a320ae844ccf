use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Raft identity of a node. `0` is reserved for "no node".
pub type NodeId = u64;

/// A raft voter: the node identity plus the address its partition replica is served at.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    #[serde(rename = "ID")]
    pub id: NodeId,
    #[serde(rename = "Addr")]
    pub addr: String,
}

impl Peer {
    pub fn new(id: NodeId, addr: impl Into<String>) -> Self {
        Peer { id, addr: addr.into() }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfChangeType {
    AddNode,
    RemoveNode,
}

#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    // Retry against the reported leader.
    #[error("Not leader, current leader is node {leader}")]
    NotLeader { leader: NodeId },

    // Likely an election is in progress. Retry with backoff.
    #[error("No leader elected")]
    NoLeader,

    #[error("Consensus group has stopped")]
    Stopped,

    #[error("Consensus failure: {0}")]
    Other(String),
}

/// ConsensusGroup is the per-partition raft group. Its transport and log are owned elsewhere;
/// the replication core only drives membership and asks who leads.
#[async_trait::async_trait]
pub trait ConsensusGroup: Send + Sync {
    /// Returns `(leader, term)`. A leader of `0` means no leader is known.
    fn leader_term(&self) -> (NodeId, u64);

    /// Only guaranteed to succeed on the current leader.
    async fn change_member(&self, change: ConfChangeType, peer: Peer, context: Bytes) -> Result<Bytes, ConsensusError>;

    async fn propose(&self, entry: Bytes) -> Result<(), ConsensusError>;

    /// Asks the local replica to campaign and take over leadership.
    async fn try_to_leader(&self) -> Result<(), ConsensusError>;
}

pub trait ConsensusFactory: Send + Sync {
    fn start_group(
        &self,
        partition_id: u64,
        local_node: NodeId,
        peers: &[Peer],
    ) -> Result<Arc<dyn ConsensusGroup>, ConsensusError>;
}
