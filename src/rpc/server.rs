use crate::grpc::node_rpc_server::{NodeRpc, NodeRpcServer};
use crate::grpc::ProtoPacket;
use crate::rpc::{Packet, RpcServerShutdownSignal};
use std::convert::TryFrom;
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// Application side of the node RPC. Every request packet gets exactly one reply packet; failures
/// are expressed through the reply's result code.
#[async_trait::async_trait]
pub trait PacketHandler: Send + Sync + 'static {
    async fn handle(&self, request: Packet) -> Packet;
}

/// RpcServer is the type that implements the node gRPC interface.
pub struct RpcServer<H: PacketHandler> {
    logger: slog::Logger,
    handler: Arc<H>,
}

impl<H: PacketHandler> RpcServer<H> {
    pub fn new(logger: slog::Logger, handler: Arc<H>) -> Self {
        RpcServer { logger, handler }
    }

    pub async fn run(self, socket_addr: SocketAddr, shutdown_signal: RpcServerShutdownSignal) {
        let logger = self.logger.clone();
        slog::info!(logger, "Listening on '{:?}'", socket_addr);

        let result = Server::builder()
            .add_service(NodeRpcServer::new(self))
            .serve_with_shutdown(socket_addr, shutdown_signal)
            .await;

        slog::info!(logger, "Server run() has exited: {:?}", result);
    }
}

#[async_trait::async_trait]
impl<H: PacketHandler> NodeRpc for RpcServer<H> {
    async fn exchange(&self, rpc_request_wrapped: Request<ProtoPacket>) -> Result<Response<ProtoPacket>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);

        let request = Packet::try_from(rpc_request).map_err(|e| Status::invalid_argument(e.to_string()))?;
        let reply = self.handler.handle(request).await;

        let rpc_reply = ProtoPacket::from(reply);
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_reply);

        Ok(Response::new(rpc_reply))
    }
}
