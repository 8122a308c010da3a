//! MarketDataStreamService gRPC 实现 (双向流)

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::proto::invest::{
    MarketDataRequest, MarketDataResponse, OrderBookInstrument, OrderBookSubscription,
    OrderBookType, SubscribeOrderBookRequest, SubscribeOrderBookResponse, SubscriptionAction,
    SubscriptionStatus, market_data_request, market_data_response,
    market_data_stream_service_server::MarketDataStreamService,
};
use crate::domain::OrderBookManager;
use crate::domain::orderbook::EVENT_SNAPSHOT_DEPTH;
use crate::stream::StreamManager;
use crate::stream::manager::MarketDataSender;

/// 被移除的流等待客户端读走终止状态的时长
const EVICTION_NOTICE_TIMEOUT: Duration = Duration::from_secs(1);

pub struct MarketDataStreamServiceImpl {
    streams: Arc<StreamManager>,
    book: Arc<OrderBookManager>,
}

impl MarketDataStreamServiceImpl {
    pub fn new(streams: Arc<StreamManager>, book: Arc<OrderBookManager>) -> Self {
        Self { streams, book }
    }
}

/// 处理一次订阅/退订请求，返回确认消息以及是否有新的成功订阅
fn handle_subscription(
    streams: &StreamManager,
    stream_id: &str,
    request: SubscribeOrderBookRequest,
) -> (SubscribeOrderBookResponse, bool) {
    let action = SubscriptionAction::try_from(request.subscription_action)
        .unwrap_or(SubscriptionAction::Unspecified);
    let mut subscribed = false;

    let subscriptions = request
        .instruments
        .into_iter()
        .map(|item| {
            let status = apply_action(streams, stream_id, action, &item);
            subscribed |= action == SubscriptionAction::Subscribe
                && status == SubscriptionStatus::Success;
            subscription_entry(streams, stream_id, action, &item, status)
        })
        .collect();

    let response = SubscribeOrderBookResponse {
        tracking_id: Uuid::new_v4().to_string(),
        order_book_subscriptions: subscriptions,
    };
    (response, subscribed)
}

fn instrument_query(item: &OrderBookInstrument) -> &str {
    if item.instrument_id.is_empty() {
        &item.figi
    } else {
        &item.instrument_id
    }
}

fn apply_action(
    streams: &StreamManager,
    stream_id: &str,
    action: SubscriptionAction,
    item: &OrderBookInstrument,
) -> SubscriptionStatus {
    let Some(instrument) = streams.catalog().resolve(instrument_query(item)) else {
        warn!(query = instrument_query(item), "Order book subscription for unknown instrument");
        return SubscriptionStatus::InstrumentNotFound;
    };
    match action {
        SubscriptionAction::Subscribe => {
            let depth = streams.normalize_depth(item.depth);
            if streams.subscribe_order_book(stream_id, &instrument.uid, depth) {
                SubscriptionStatus::Success
            } else {
                SubscriptionStatus::InternalError
            }
        }
        SubscriptionAction::Unsubscribe => {
            streams.unsubscribe_order_book(stream_id, &instrument.uid);
            SubscriptionStatus::Success
        }
        SubscriptionAction::Unspecified => SubscriptionStatus::SubscriptionActionIsInvalid,
    }
}

fn subscription_entry(
    streams: &StreamManager,
    stream_id: &str,
    action: SubscriptionAction,
    item: &OrderBookInstrument,
    status: SubscriptionStatus,
) -> OrderBookSubscription {
    let instrument = streams.catalog().resolve(instrument_query(item));
    OrderBookSubscription {
        figi: instrument.map(|i| i.figi.clone()).unwrap_or_else(|| item.figi.clone()),
        depth: streams.normalize_depth(item.depth) as i32,
        subscription_status: status as i32,
        instrument_uid: instrument
            .map(|i| i.uid.clone())
            .unwrap_or_else(|| item.instrument_id.clone()),
        stream_id: stream_id.to_string(),
        subscription_id: Uuid::new_v4().to_string(),
        order_book_type: OrderBookType::OrderbookTypeExchange as i32,
        subscription_action: action as i32,
        ticker: instrument.map(|i| i.ticker.clone()).unwrap_or_default(),
        class_code: instrument.map(|i| i.class_code.clone()).unwrap_or_default(),
    }
}

async fn handle_request(
    streams: &StreamManager,
    book: &OrderBookManager,
    stream_id: &str,
    tx: &MarketDataSender,
    request: MarketDataRequest,
) {
    let Some(market_data_request::Payload::SubscribeOrderBookRequest(sub)) = request.payload else {
        debug!(%stream_id, "Ignoring market data request without supported payload");
        return;
    };

    let (response, subscribed) = handle_subscription(streams, stream_id, sub);
    let confirmation = MarketDataResponse {
        payload: Some(market_data_response::Payload::SubscribeOrderBookResponse(
            response,
        )),
    };
    if tx.send(Ok(confirmation)).await.is_err() {
        return;
    }

    // 订阅成功后立即推送一次当前盘口
    if subscribed {
        streams.send_order_book_to(stream_id, &book.snapshot(EVENT_SNAPSHOT_DEPTH));
    }
}

/// 读取客户端请求直到流结束；流因积压被移除时先发送 RESOURCE_EXHAUSTED 再退出
async fn run_inbound<S>(
    streams: Arc<StreamManager>,
    book: Arc<OrderBookManager>,
    stream_id: String,
    tx: MarketDataSender,
    mut inbound: S,
) where
    S: Stream<Item = Result<MarketDataRequest, Status>> + Unpin,
{
    let Some(evicted) = streams.eviction_signal(&stream_id) else {
        return;
    };

    loop {
        tokio::select! {
            message = inbound.next() => match message {
                Some(Ok(req)) => handle_request(&streams, &book, &stream_id, &tx, req).await,
                Some(Err(status)) => {
                    debug!(%stream_id, error = %status, "Market data stream receive error");
                    break;
                }
                None => break,
            },
            _ = evicted.notified() => {
                warn!(%stream_id, "Market data stream evicted, closing");
                let notice = Err(Status::resource_exhausted(
                    "order book updates were not consumed in time",
                ));
                let _ = tokio::time::timeout(EVICTION_NOTICE_TIMEOUT, tx.send(notice)).await;
                break;
            }
        }
    }
    info!(%stream_id, "Market data stream client finished");
    streams.close_market_data_stream(&stream_id);
}

#[tonic::async_trait]
impl MarketDataStreamService for MarketDataStreamServiceImpl {
    type MarketDataStreamStream = ReceiverStream<Result<MarketDataResponse, Status>>;

    async fn market_data_stream(
        &self,
        request: Request<Streaming<MarketDataRequest>>,
    ) -> Result<Response<Self::MarketDataStreamStream>, Status> {
        let inbound = request.into_inner();
        let (stream_id, tx, rx) = self.streams.open_market_data_stream();
        tokio::spawn(run_inbound(
            self.streams.clone(),
            self.book.clone(),
            stream_id,
            tx,
            inbound,
        ));

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventBus, Instrument, InstrumentCatalog};
    use emu_config::{InstrumentConfig, OrderBookConfig};
    use rust_decimal::Decimal;

    fn setup() -> (Arc<StreamManager>, Arc<OrderBookManager>) {
        setup_with_capacity(16)
    }

    fn setup_with_capacity(capacity: usize) -> (Arc<StreamManager>, Arc<OrderBookManager>) {
        let instrument = Instrument::from(&InstrumentConfig::default());
        let book = Arc::new(OrderBookManager::new(&instrument.uid, EventBus::new(16)));
        book.seed(&OrderBookConfig::default());
        let catalog = Arc::new(InstrumentCatalog::single(instrument));
        let streams = Arc::new(StreamManager::new(catalog, Decimal::new(770, 2), 50, capacity));
        (streams, book)
    }

    fn subscribe(action: SubscriptionAction, query: &str, depth: i32) -> MarketDataRequest {
        MarketDataRequest {
            payload: Some(market_data_request::Payload::SubscribeOrderBookRequest(
                SubscribeOrderBookRequest {
                    subscription_action: action as i32,
                    instruments: vec![OrderBookInstrument {
                        figi: String::new(),
                        depth,
                        instrument_id: query.to_string(),
                        order_book_type: OrderBookType::OrderbookTypeExchange as i32,
                    }],
                },
            )),
        }
    }

    fn confirmation(message: MarketDataResponse) -> SubscribeOrderBookResponse {
        match message.payload {
            Some(market_data_response::Payload::SubscribeOrderBookResponse(r)) => r,
            other => panic!("expected confirmation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscribe_confirms_and_sends_book() {
        let (streams, book) = setup();
        let (stream_id, tx, mut rx) = streams.open_market_data_stream();

        handle_request(&streams, &book, &stream_id, &tx, subscribe(SubscriptionAction::Subscribe, "TBRU", 10)).await;

        let confirm = confirmation(rx.recv().await.unwrap().unwrap());
        let sub = &confirm.order_book_subscriptions[0];
        assert_eq!(sub.subscription_status, SubscriptionStatus::Success as i32);
        assert_eq!(sub.depth, 10);
        assert_eq!(sub.stream_id, stream_id);
        assert_eq!(sub.ticker, "TBRU");

        match rx.recv().await.unwrap().unwrap().payload {
            Some(market_data_response::Payload::Orderbook(ob)) => {
                assert_eq!(ob.depth, 10);
                assert_eq!(ob.bids.len(), 1);
            }
            other => panic!("expected order book, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_instrument_is_reported() {
        let (streams, book) = setup();
        let (stream_id, tx, mut rx) = streams.open_market_data_stream();

        handle_request(&streams, &book, &stream_id, &tx, subscribe(SubscriptionAction::Subscribe, "SBER", 10)).await;

        let confirm = confirmation(rx.recv().await.unwrap().unwrap());
        assert_eq!(
            confirm.order_book_subscriptions[0].subscription_status,
            SubscriptionStatus::InstrumentNotFound as i32
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_updates() {
        let (streams, book) = setup();
        let (stream_id, tx, mut rx) = streams.open_market_data_stream();

        handle_request(&streams, &book, &stream_id, &tx, subscribe(SubscriptionAction::Subscribe, "TBRU", 5)).await;
        handle_request(&streams, &book, &stream_id, &tx, subscribe(SubscriptionAction::Unsubscribe, "TBRU", 5)).await;

        // 订阅确认 + 初始盘口 + 退订确认
        for _ in 0..3 {
            rx.recv().await.unwrap().unwrap();
        }
        assert_eq!(streams.broadcast_order_book(&book.snapshot(50)), 0);
    }

    #[tokio::test]
    async fn test_resubscribe_after_eviction_reports_failure() {
        let (streams, book) = setup_with_capacity(2);
        let (stream_id, tx, mut rx) = streams.open_market_data_stream();

        // 确认 + 初始盘口占满通道，下一次广播移除该流
        handle_request(&streams, &book, &stream_id, &tx, subscribe(SubscriptionAction::Subscribe, "TBRU", 10)).await;
        assert_eq!(streams.broadcast_order_book(&book.snapshot(50)), 0);
        assert_eq!(streams.order_book_subscriber_count(), 0);
        rx.recv().await.unwrap().unwrap();
        rx.recv().await.unwrap().unwrap();

        handle_request(&streams, &book, &stream_id, &tx, subscribe(SubscriptionAction::Subscribe, "TBRU", 10)).await;
        let confirm = confirmation(rx.recv().await.unwrap().unwrap());
        assert_eq!(
            confirm.order_book_subscriptions[0].subscription_status,
            SubscriptionStatus::InternalError as i32
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_evicted_stream_ends_with_resource_exhausted() {
        let (streams, book) = setup_with_capacity(2);
        let (stream_id, tx, mut rx) = streams.open_market_data_stream();
        let (req_tx, req_rx) = tokio::sync::mpsc::channel(4);
        let task = tokio::spawn(run_inbound(
            streams.clone(),
            book.clone(),
            stream_id,
            tx,
            ReceiverStream::new(req_rx),
        ));

        req_tx
            .send(Ok(subscribe(SubscriptionAction::Subscribe, "TBRU", 10)))
            .await
            .unwrap();
        confirmation(rx.recv().await.unwrap().unwrap());
        // 初始盘口留在通道里，再推两次即溢出
        while streams.order_book_subscriber_count() > 0 {
            streams.broadcast_order_book(&book.snapshot(50));
            tokio::task::yield_now().await;
        }

        let mut terminal = None;
        while let Some(message) = rx.recv().await {
            if let Err(status) = message {
                terminal = Some(status);
            }
        }
        assert_eq!(terminal.unwrap().code(), tonic::Code::ResourceExhausted);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
