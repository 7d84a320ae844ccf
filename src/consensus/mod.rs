mod group;

pub use group::ConfChangeType;
pub use group::ConsensusError;
pub use group::ConsensusFactory;
pub use group::ConsensusGroup;
pub use group::NodeId;
pub use group::Peer;
