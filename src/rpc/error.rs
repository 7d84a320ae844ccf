use crate::rpc::ResultCode;
use tokio::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid node address '{0}'")]
    InvalidAddress(String),

    // Connection-level failures evict the pooled connection.
    #[error("Transport failure: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("RPC failed with status: {0}")]
    Status(#[from] tonic::Status),

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    // The peer processed the request and rejected it.
    #[error("Peer replied {code:?}: {message}")]
    Remote { code: ResultCode, message: String },

    #[error("Malformed packet: {0}")]
    Malformed(String),

    #[error("Payload codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}
