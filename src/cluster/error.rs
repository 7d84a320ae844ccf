use crate::rpc::RpcError;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Cluster store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A synchronous admin task that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("{task} to {addr} failed: {source}")]
    Rpc {
        addr: String,
        task: &'static str,
        source: RpcError,
    },

    #[error("{task} on {addr} failed: {message}")]
    Failed {
        addr: String,
        task: &'static str,
        message: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("Partition {0} not found")]
    PartitionNotFound(u64),

    #[error("Node {0} is not registered")]
    NodeNotFound(String),

    #[error("{addr} is not a host of partition {partition_id}")]
    NotAHost { partition_id: u64, addr: String },

    #[error("Partition {partition_id} has {live} live replicas besides the target, needs {required}")]
    NotEnoughLiveReplicas {
        partition_id: u64,
        live: usize,
        required: usize,
    },

    #[error("Partition {partition_id} would drop to {remaining} hosts, below replica count {replica_num}")]
    ReplicaCountBelowMinimum {
        partition_id: u64,
        remaining: usize,
        replica_num: u8,
    },

    #[error("Partition {partition_id} already has {hosts} hosts, the most replica count {replica_num} allows")]
    ReplicaCountAboveMaximum {
        partition_id: u64,
        hosts: usize,
        replica_num: u8,
    },

    #[error("{addr} is not a {expected:?} node")]
    NodeKindMismatch {
        addr: String,
        expected: crate::cluster::NodeKind,
    },

    #[error("{addr} already hosts partition {partition_id}")]
    HostAlreadyPresent { partition_id: u64, addr: String },

    #[error("Another membership change of partition {0} is in progress")]
    OperationInProgress(u64),

    #[error("No node can take over a replica of partition {0}")]
    NoReplacementHost(u64),

    #[error("Partition {0} has no host left to send to")]
    NoCandidate(u64),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("Partition {0} not found")]
    PartitionNotFound(u64),

    #[error("Volume {0} not found")]
    VolumeNotFound(String),

    #[error("Node {0} is already registered")]
    NodeAlreadyRegistered(String),

    #[error("Not enough writable {kind:?} nodes: need {required}, found {available}")]
    NotEnoughNodes {
        kind: crate::cluster::NodeKind,
        required: usize,
        available: usize,
    },

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Membership(#[from] MembershipError),
}
