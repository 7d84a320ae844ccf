#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoPacket {
    #[prost(uint64, tag = "1")]
    pub req_id: u64,
    #[prost(enumeration = "ProtoOpcode", tag = "2")]
    pub opcode: i32,
    #[prost(uint64, tag = "3")]
    pub partition_id: u64,
    #[prost(uint64, tag = "4")]
    pub extent_id: u64,
    #[prost(uint64, tag = "5")]
    pub extent_offset: u64,
    #[prost(uint32, tag = "6")]
    pub size: u32,
    #[prost(enumeration = "ProtoResultCode", tag = "7")]
    pub result_code: i32,
    #[prost(bytes = "vec", tag = "8")]
    pub data: ::prost::alloc::vec::Vec<u8>,
}
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ProtoOpcode {
    OpUnspecified = 0,
    OpStreamRead = 1,
    OpGetAllWatermarks = 2,
    OpNotifyRepair = 3,
    OpGetPartitionHosts = 4,
    OpAdminTask = 5,
}
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ProtoResultCode {
    ResultUnspecified = 0,
    ResultOk = 1,
    ResultNotExist = 2,
    ResultDiskErr = 3,
    ResultArgMismatch = 4,
    ResultTryOtherAddr = 5,
    ResultErr = 6,
}
#[doc = r" Generated client implementations."]
pub mod node_rpc_client {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = " Every node speaks one unary exchange. The opcode decides how `data` is interpreted:"]
    #[doc = " raw extent bytes for stream reads, JSON for inventories and admin tasks."]
    pub struct NodeRpcClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl NodeRpcClient<tonic::transport::Channel> {
        #[doc = r" Attempt to create a new client by connecting to a given endpoint."]
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: std::convert::TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> NodeRpcClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::ResponseBody: Body + HttpBody + Send + 'static,
        T::Error: Into<StdError>,
        <T::ResponseBody as HttpBody>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = tonic::client::Grpc::with_interceptor(inner, interceptor);
            Self { inner }
        }
        pub async fn exchange(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoPacket>,
        ) -> Result<tonic::Response<super::ProtoPacket>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/node.NodeRpc/Exchange");
            self.inner.unary(request.into_request(), path, codec).await
        }
    }
    impl<T: Clone> Clone for NodeRpcClient<T> {
        fn clone(&self) -> Self {
            Self {
                inner: self.inner.clone(),
            }
        }
    }
    impl<T> std::fmt::Debug for NodeRpcClient<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "NodeRpcClient {{ ... }}")
        }
    }
}
#[doc = r" Generated server implementations."]
pub mod node_rpc_server {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = "Generated trait containing gRPC methods that should be implemented for use with NodeRpcServer."]
    #[async_trait]
    pub trait NodeRpc: Send + Sync + 'static {
        async fn exchange(
            &self,
            request: tonic::Request<super::ProtoPacket>,
        ) -> Result<tonic::Response<super::ProtoPacket>, tonic::Status>;
    }
    #[doc = " Every node speaks one unary exchange. The opcode decides how `data` is interpreted:"]
    #[doc = " raw extent bytes for stream reads, JSON for inventories and admin tasks."]
    #[derive(Debug)]
    pub struct NodeRpcServer<T: NodeRpc> {
        inner: _Inner<T>,
    }
    struct _Inner<T>(Arc<T>, Option<tonic::Interceptor>);
    impl<T: NodeRpc> NodeRpcServer<T> {
        pub fn new(inner: T) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, None);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, Some(interceptor.into()));
            Self { inner }
        }
    }
    impl<T, B> Service<http::Request<B>> for NodeRpcServer<T>
    where
        T: NodeRpc,
        B: HttpBody + Send + Sync + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = Never;
        type Future = BoxFuture<Self::Response, Self::Error>;
        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = self.inner.clone();
            match req.uri().path() {
                "/node.NodeRpc/Exchange" => {
                    #[allow(non_camel_case_types)]
                    struct ExchangeSvc<T: NodeRpc>(pub Arc<T>);
                    impl<T: NodeRpc> tonic::server::UnaryService<super::ProtoPacket> for ExchangeSvc<T> {
                        type Response = super::ProtoPacket;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoPacket>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).exchange(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = ExchangeSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                _ => Box::pin(async move {
                    Ok(http::Response::builder()
                        .status(200)
                        .header("grpc-status", "12")
                        .header("content-type", "application/grpc")
                        .body(tonic::body::BoxBody::empty())
                        .unwrap())
                }),
            }
        }
    }
    impl<T: NodeRpc> Clone for NodeRpcServer<T> {
        fn clone(&self) -> Self {
            let inner = self.inner.clone();
            Self { inner }
        }
    }
    impl<T: NodeRpc> Clone for _Inner<T> {
        fn clone(&self) -> Self {
            Self(self.0.clone(), self.1.clone())
        }
    }
    impl<T: std::fmt::Debug> std::fmt::Debug for _Inner<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }
    impl<T: NodeRpc> tonic::transport::NamedService for NodeRpcServer<T> {
        const NAME: &'static str = "node.NodeRpc";
    }
}
