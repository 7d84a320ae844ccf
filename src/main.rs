use replicated_store::{
    shutdown_signal, Cluster, ClusterHandler, ClusterOptions, ClusterOptionsValidated, DataNodeHandler,
    DataNodeOptions, DataNodeOptionsValidated, Disk, InMemoryClusterStore, InMemoryStoreFactory, NodeKind,
    PartitionContext, RepairEngine, RpcClient, RpcMasterClient, RpcServer, Space,
};
use slog::Drain;
use std::convert::TryFrom;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

const CLUSTER_ADDR: &str = "127.0.0.1:17010";
const DATA_NODE_ADDR: &str = "127.0.0.1:17310";
const DISK_CAPACITY: u64 = 64 << 30;

/// Runs a cluster manager and a single data node in one process.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let logger = create_root_logger();

    let node_options = Arc::new(DataNodeOptionsValidated::try_from(DataNodeOptions::default())?);
    let cluster_options = Arc::new(ClusterOptionsValidated::try_from(ClusterOptions::default())?);

    let rpc_client = Arc::new(RpcClient::new(logger.new(slog::o!("Component" => "RpcClient")), node_options.rpc_timeout));
    let master = Arc::new(RpcMasterClient::new(rpc_client.clone(), vec![CLUSTER_ADDR.to_string()]));

    let cluster = Cluster::new(
        logger.new(slog::o!("Component" => "Cluster")),
        CLUSTER_ADDR,
        cluster_options,
        Arc::new(InMemoryClusterStore::new()),
        rpc_client.clone(),
    );
    cluster.register_node(1, DATA_NODE_ADDR, NodeKind::Data, 1)?;
    cluster.start_schedulers();

    let disk_path = std::env::temp_dir().join("replicated-store").join("disk1");
    std::fs::create_dir_all(&disk_path)?;
    let node_logger = logger.new(slog::o!("Component" => "DataNode"));
    let context = PartitionContext {
        logger: node_logger.clone(),
        node_id: 1,
        local_addr: DATA_NODE_ADDR.to_string(),
        store_factory: Arc::new(InMemoryStoreFactory::new()),
        consensus_factory: None,
        options: node_options.clone(),
    };
    let repair = Arc::new(RepairEngine::new(node_logger.clone(), rpc_client.clone(), master, node_options));
    let space = Arc::new(Space::new(context, vec![Arc::new(Disk::new(disk_path, DISK_CAPACITY))], repair));
    let loaded = space.load_partitions()?;
    slog::info!(logger, "Loaded {} partitions from disk", loaded);

    let (cluster_shutdown, cluster_signal) = shutdown_signal();
    let (node_shutdown, node_signal) = shutdown_signal();

    let cluster_server = RpcServer::new(logger.clone(), Arc::new(ClusterHandler::new(cluster.clone())));
    let node_server = RpcServer::new(logger.clone(), Arc::new(DataNodeHandler::new(node_logger, space.clone())));
    let cluster_task = tokio::spawn(cluster_server.run(CLUSTER_ADDR.parse::<SocketAddr>()?, cluster_signal));
    let node_task = tokio::spawn(node_server.run(DATA_NODE_ADDR.parse::<SocketAddr>()?, node_signal));

    tokio::signal::ctrl_c().await?;
    slog::info!(logger, "Shutting down");

    cluster.stop();
    space.stop();
    cluster_shutdown.shutdown();
    node_shutdown.shutdown();
    let _ = tokio::join!(cluster_task, node_task);

    Ok(())
}

fn create_root_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}
