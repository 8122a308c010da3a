//! OrdersStreamService gRPC 实现

use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::api::proto::invest::{
    OrderStateStreamRequest, OrderStateStreamResponse,
    orders_stream_service_server::OrdersStreamService,
};
use crate::stream::StreamManager;

pub struct OrdersStreamServiceImpl {
    streams: Arc<StreamManager>,
}

impl OrdersStreamServiceImpl {
    pub fn new(streams: Arc<StreamManager>) -> Self {
        Self { streams }
    }
}

#[tonic::async_trait]
impl OrdersStreamService for OrdersStreamServiceImpl {
    type OrderStateStreamStream = ReceiverStream<Result<OrderStateStreamResponse, Status>>;

    async fn order_state_stream(
        &self,
        request: Request<OrderStateStreamRequest>,
    ) -> Result<Response<Self::OrderStateStreamStream>, Status> {
        let accounts = request.into_inner().accounts;
        let (_stream_id, rx) = self.streams.open_order_state_stream(accounts);
        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
