mod cluster;
mod consensus;
mod ec;
mod node;
mod options;
mod partition;
mod repair;
mod rpc;
mod storage;
mod util;
mod grpc {
    include!("../generated/node.rs");
}

pub use cluster::CheckOutcome;
pub use cluster::Cluster;
pub use cluster::ClusterError;
pub use cluster::ClusterHandler;
pub use cluster::ClusterNode;
pub use cluster::ClusterPartition;
pub use cluster::ClusterStat;
pub use cluster::ClusterStore;
pub use cluster::Diagnosis;
pub use cluster::InMemoryClusterStore;
pub use cluster::Membership;
pub use cluster::MembershipError;
pub use cluster::MetaRange;
pub use cluster::NodeKind;
pub use cluster::NodeStat;
pub use cluster::PartitionHealth;
pub use cluster::PartitionKind;
pub use cluster::PartitionRecord;
pub use cluster::PendingTask;
pub use cluster::PersistError;
pub use cluster::Replica;
pub use cluster::TaskError;
pub use cluster::Topology;
pub use cluster::Volume;
pub use cluster::VolumeRecord;
pub use consensus::ConfChangeType;
pub use consensus::ConsensusError;
pub use consensus::ConsensusFactory;
pub use consensus::ConsensusGroup;
pub use consensus::NodeId;
pub use consensus::Peer;
pub use ec::plan_stripe_reads;
pub use ec::stripe_read;
pub use ec::EcPartition;
pub use ec::EcPartitionMeta;
pub use ec::StripeGeometry;
pub use ec::StripePiece;
pub use ec::StripeReadError;
pub use node::DataNodeHandler;
pub use node::Space;
pub use node::SpaceError;
pub use options::ClusterOptions;
pub use options::ClusterOptionsValidated;
pub use options::DataNodeOptions;
pub use options::DataNodeOptionsValidated;
pub use partition::read_meta_file;
pub use partition::write_meta_file;
pub use partition::DataPartition;
pub use partition::DataPartitionConfig;
pub use partition::DataPartitionMeta;
pub use partition::Disk;
pub use partition::LoadExtentHeaderStatus;
pub use partition::MetaFileError;
pub use partition::PartitionContext;
pub use partition::PartitionError;
pub use partition::PartitionStatus;
pub use partition::META_FILE_NAME;
pub use partition::TEMP_META_FILE_NAME;
pub use repair::compute_repair_tasks;
pub use repair::ExtentRepairMode;
pub use repair::RepairEngine;
pub use repair::RepairError;
pub use repair::RepairOutcome;
pub use repair::RepairTask;
pub use repair::ReplicaInventory;
pub use rpc::shutdown_signal;
pub use rpc::AdminTask;
pub use rpc::CreateDataPartitionRequest;
pub use rpc::CreateEcPartitionRequest;
pub use rpc::CreateMetaPartitionRequest;
pub use rpc::DataNodeHeartbeatResponse;
pub use rpc::LoadDataPartitionResponse;
pub use rpc::LoadMetaPartitionResponse;
pub use rpc::MasterClient;
pub use rpc::MetaNodeHeartbeatResponse;
pub use rpc::MetaPartitionReport;
pub use rpc::NodeTransport;
pub use rpc::Opcode;
pub use rpc::Packet;
pub use rpc::PacketHandler;
pub use rpc::PartitionReport;
pub use rpc::PeerClient;
pub use rpc::ResultCode;
pub use rpc::RpcClient;
pub use rpc::RpcError;
pub use rpc::RpcMasterClient;
pub use rpc::RpcServer;
pub use rpc::RpcServerShutdownHandle;
pub use rpc::RpcServerShutdownSignal;
pub use rpc::TaskReply;
pub use rpc::TaskRequest;
pub use rpc::TaskResponse;
pub use rpc::TaskResult;
pub use rpc::TaskStatus;
pub use rpc::UpdateMetaPartitionRequest;
pub use rpc::UpdatePartitionPeersRequest;
pub use storage::default_tiny_extent_ids;
pub use storage::is_disk_error;
pub use storage::ExtentCrc;
pub use storage::ExtentFilter;
pub use storage::ExtentId;
pub use storage::ExtentInfo;
pub use storage::ExtentStore;
pub use storage::ExtentStoreFactory;
pub use storage::InMemoryExtentStore;
pub use storage::InMemoryStoreFactory;
pub use storage::TINY_EXTENT_COUNT;
pub use storage::TINY_EXTENT_START_ID;

// The crate root only declares modules and re-exports. All `mod` statements stay private; the
// public surface is exactly the `pub use` list above.
