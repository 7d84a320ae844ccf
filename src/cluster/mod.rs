mod cluster;
mod diagnosis;
mod error;
mod handler;
mod heartbeat;
mod load_check;
mod membership;
mod node;
mod partition;
mod persist;
mod replica;
mod stat;
mod task;
mod topology;
mod volume;

pub use cluster::Cluster;
pub use diagnosis::Diagnosis;
pub use diagnosis::PartitionHealth;
pub use error::ClusterError;
pub use error::MembershipError;
pub use error::PersistError;
pub use error::TaskError;
pub use handler::ClusterHandler;
pub use load_check::CheckOutcome;
pub use node::ClusterNode;
pub use node::NodeKind;
pub use partition::ClusterPartition;
pub use partition::Membership;
pub use partition::MetaRange;
pub use persist::ClusterStore;
pub use persist::InMemoryClusterStore;
pub use persist::PartitionKind;
pub use persist::PartitionRecord;
pub use persist::VolumeRecord;
pub use replica::Replica;
pub use stat::ClusterStat;
pub use stat::NodeStat;
pub use task::PendingTask;
pub use topology::Topology;
pub use volume::Volume;
