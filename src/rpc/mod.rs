mod admin_task;
mod client;
mod error;
mod packet;
mod server;
mod shutdown;
mod transport;

pub use admin_task::AdminTask;
pub use admin_task::CreateDataPartitionRequest;
pub use admin_task::CreateEcPartitionRequest;
pub use admin_task::CreateMetaPartitionRequest;
pub use admin_task::DataNodeHeartbeatResponse;
pub use admin_task::LoadDataPartitionResponse;
pub use admin_task::LoadMetaPartitionResponse;
pub use admin_task::MetaNodeHeartbeatResponse;
pub use admin_task::MetaPartitionReport;
pub use admin_task::PartitionReport;
pub use admin_task::TaskReply;
pub use admin_task::TaskRequest;
pub use admin_task::TaskResponse;
pub use admin_task::TaskResult;
pub use admin_task::TaskStatus;
pub use admin_task::UpdateMetaPartitionRequest;
pub use admin_task::UpdatePartitionPeersRequest;
pub use client::RpcClient;
pub use client::RpcMasterClient;
pub use error::RpcError;
pub use packet::Opcode;
pub use packet::Packet;
pub use packet::ResultCode;
pub use server::PacketHandler;
pub use server::RpcServer;
pub use shutdown::shutdown_signal;
pub use shutdown::RpcServerShutdownHandle;
pub use shutdown::RpcServerShutdownSignal;
pub use transport::MasterClient;
pub use transport::NodeTransport;
pub use transport::PeerClient;
