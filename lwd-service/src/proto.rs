//! Hand-rolled `CompactTxStreamer` gRPC server, mirroring the teacher's
//! hand-rolled client in `pirate-sync-lightd::proto_types` — no `build.rs`
//! / `tonic-build` / `protoc` step, just `tonic`'s runtime server plumbing
//! driven directly against the wire types in `lwd_proto::types`.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use http_body::Body;
use lwd_proto::types::{
    BlockId, BlockRange, ChainSpec, CompactBlock, CompactTx, Duration, Empty, Exclude,
    GetSubtreeRootsArg, LightdInfo, PingResponse, RawTransaction, SendResponse, SubtreeRoot,
    TransparentAddressBlockFilter, TreeState, TxFilter,
};
use tokio_stream::Stream;
use tonic::codegen::*;

pub type BlockStream = Pin<Box<dyn Stream<Item = Result<CompactBlock, tonic::Status>> + Send>>;
pub type RawTxStream = Pin<Box<dyn Stream<Item = Result<RawTransaction, tonic::Status>> + Send>>;
pub type CompactTxStream = Pin<Box<dyn Stream<Item = Result<CompactTx, tonic::Status>> + Send>>;
pub type SubtreeRootStream = Pin<Box<dyn Stream<Item = Result<SubtreeRoot, tonic::Status>> + Send>>;

const SERVICE_NAME: &str = "pirate.wallet.sdk.rpc.CompactTxStreamer";

/// The served RPC surface (spec.md §4.5 / §6).
#[async_trait]
pub trait CompactTxStreamer: Send + Sync + 'static {
    async fn get_latest_block(
        &self,
        request: tonic::Request<ChainSpec>,
    ) -> Result<tonic::Response<BlockId>, tonic::Status>;

    async fn get_block(
        &self,
        request: tonic::Request<BlockId>,
    ) -> Result<tonic::Response<CompactBlock>, tonic::Status>;

    async fn get_block_nullifiers(
        &self,
        request: tonic::Request<BlockId>,
    ) -> Result<tonic::Response<CompactBlock>, tonic::Status>;

    async fn get_block_range(
        &self,
        request: tonic::Request<BlockRange>,
    ) -> Result<tonic::Response<BlockStream>, tonic::Status>;

    async fn get_block_range_nullifiers(
        &self,
        request: tonic::Request<BlockRange>,
    ) -> Result<tonic::Response<BlockStream>, tonic::Status>;

    async fn get_transaction(
        &self,
        request: tonic::Request<TxFilter>,
    ) -> Result<tonic::Response<RawTransaction>, tonic::Status>;

    async fn send_transaction(
        &self,
        request: tonic::Request<RawTransaction>,
    ) -> Result<tonic::Response<SendResponse>, tonic::Status>;

    async fn get_taddress_transactions(
        &self,
        request: tonic::Request<TransparentAddressBlockFilter>,
    ) -> Result<tonic::Response<RawTxStream>, tonic::Status>;

    async fn get_mempool_tx(
        &self,
        request: tonic::Request<Exclude>,
    ) -> Result<tonic::Response<CompactTxStream>, tonic::Status>;

    async fn get_mempool_stream(
        &self,
        request: tonic::Request<Empty>,
    ) -> Result<tonic::Response<RawTxStream>, tonic::Status>;

    async fn get_tree_state(
        &self,
        request: tonic::Request<BlockId>,
    ) -> Result<tonic::Response<TreeState>, tonic::Status>;

    async fn get_subtree_roots(
        &self,
        request: tonic::Request<GetSubtreeRootsArg>,
    ) -> Result<tonic::Response<SubtreeRootStream>, tonic::Status>;

    async fn get_lightd_info(
        &self,
        request: tonic::Request<Empty>,
    ) -> Result<tonic::Response<LightdInfo>, tonic::Status>;

    /// Test-only (spec.md §6); off by default at the `lwd-server` wiring
    /// layer, not here.
    async fn ping(
        &self,
        request: tonic::Request<Duration>,
    ) -> Result<tonic::Response<PingResponse>, tonic::Status>;
}

#[derive(Debug)]
pub struct CompactTxStreamerServer<T: CompactTxStreamer> {
    inner: Arc<T>,
}

impl<T: CompactTxStreamer> CompactTxStreamerServer<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

impl<T: CompactTxStreamer> Clone for CompactTxStreamerServer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Defines the boilerplate `UnaryService`/`ServerStreamingService` adaptor
/// struct for one RPC and dispatches to it. Each arm names its own request
/// and response types directly, the same way `tonic-build`'s generated
/// per-method structs do — there's no way to make this generic without
/// losing the concrete `prost::Message` types the codec needs.
macro_rules! unary_svc {
    ($inner:expr, $req:expr, $ReqTy:ty, $RespTy:ty, $method:ident) => {{
        struct Svc<T: CompactTxStreamer>(Arc<T>);
        impl<T: CompactTxStreamer> tonic::server::UnaryService<$ReqTy> for Svc<T> {
            type Response = $RespTy;
            type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
            fn call(&mut self, request: tonic::Request<$ReqTy>) -> Self::Future {
                let inner = self.0.clone();
                Box::pin(async move { inner.$method(request).await })
            }
        }
        let inner = $inner;
        let codec = tonic::codec::ProstCodec::default();
        let mut grpc = tonic::server::Grpc::new(codec);
        Box::pin(async move { Ok(grpc.unary(Svc(inner), $req).await) })
    }};
}

macro_rules! streaming_svc {
    ($inner:expr, $req:expr, $ReqTy:ty, $RespTy:ty, $method:ident) => {{
        struct Svc<T: CompactTxStreamer>(Arc<T>);
        impl<T: CompactTxStreamer> tonic::server::ServerStreamingService<$ReqTy> for Svc<T> {
            type Response = $RespTy;
            type ResponseStream = Pin<Box<dyn Stream<Item = Result<$RespTy, tonic::Status>> + Send>>;
            type Future = BoxFuture<tonic::Response<Self::ResponseStream>, tonic::Status>;
            fn call(&mut self, request: tonic::Request<$ReqTy>) -> Self::Future {
                let inner = self.0.clone();
                Box::pin(async move { inner.$method(request).await })
            }
        }
        let inner = $inner;
        let codec = tonic::codec::ProstCodec::default();
        let mut grpc = tonic::server::Grpc::new(codec);
        Box::pin(async move { Ok(grpc.server_streaming(Svc(inner), $req).await) })
    }};
}

impl<T, B> tonic::codegen::Service<http::Request<B>> for CompactTxStreamerServer<T>
where
    T: CompactTxStreamer,
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let inner = self.inner.clone();
        match req.uri().path() {
            "/pirate.wallet.sdk.rpc.CompactTxStreamer/GetLatestBlock" => {
                unary_svc!(inner, req, ChainSpec, BlockId, get_latest_block)
            }
            "/pirate.wallet.sdk.rpc.CompactTxStreamer/GetBlock" => {
                unary_svc!(inner, req, BlockId, CompactBlock, get_block)
            }
            "/pirate.wallet.sdk.rpc.CompactTxStreamer/GetBlockNullifiers" => {
                unary_svc!(inner, req, BlockId, CompactBlock, get_block_nullifiers)
            }
            "/pirate.wallet.sdk.rpc.CompactTxStreamer/GetBlockRange" => {
                streaming_svc!(inner, req, BlockRange, CompactBlock, get_block_range)
            }
            "/pirate.wallet.sdk.rpc.CompactTxStreamer/GetBlockRangeNullifiers" => {
                streaming_svc!(inner, req, BlockRange, CompactBlock, get_block_range_nullifiers)
            }
            "/pirate.wallet.sdk.rpc.CompactTxStreamer/GetTransaction" => {
                unary_svc!(inner, req, TxFilter, RawTransaction, get_transaction)
            }
            "/pirate.wallet.sdk.rpc.CompactTxStreamer/SendTransaction" => {
                unary_svc!(inner, req, RawTransaction, SendResponse, send_transaction)
            }
            "/pirate.wallet.sdk.rpc.CompactTxStreamer/GetTaddressTxids" => {
                streaming_svc!(
                    inner,
                    req,
                    TransparentAddressBlockFilter,
                    RawTransaction,
                    get_taddress_transactions
                )
            }
            "/pirate.wallet.sdk.rpc.CompactTxStreamer/GetMempoolTx" => {
                streaming_svc!(inner, req, Exclude, CompactTx, get_mempool_tx)
            }
            "/pirate.wallet.sdk.rpc.CompactTxStreamer/GetMempoolStream" => {
                streaming_svc!(inner, req, Empty, RawTransaction, get_mempool_stream)
            }
            "/pirate.wallet.sdk.rpc.CompactTxStreamer/GetTreeState" => {
                unary_svc!(inner, req, BlockId, TreeState, get_tree_state)
            }
            "/pirate.wallet.sdk.rpc.CompactTxStreamer/GetSubtreeRoots" => {
                streaming_svc!(inner, req, GetSubtreeRootsArg, SubtreeRoot, get_subtree_roots)
            }
            "/pirate.wallet.sdk.rpc.CompactTxStreamer/GetLightdInfo" => {
                unary_svc!(inner, req, Empty, LightdInfo, get_lightd_info)
            }
            "/pirate.wallet.sdk.rpc.CompactTxStreamer/Ping" => {
                unary_svc!(inner, req, Duration, PingResponse, ping)
            }
            _ => Box::pin(async move {
                Ok(http::Response::builder()
                    .status(200)
                    .header("grpc-status", "12")
                    .header("content-type", "application/grpc")
                    .body(empty_body())
                    .unwrap())
            }),
        }
    }
}

impl<T: CompactTxStreamer> tonic::server::NamedService for CompactTxStreamerServer<T> {
    const NAME: &'static str = SERVICE_NAME;
}

fn empty_body() -> tonic::body::BoxBody {
    use http_body_util::BodyExt;
    http_body_util::Empty::new()
        .map_err(|err: std::convert::Infallible| match err {})
        .boxed_unsync()
}
