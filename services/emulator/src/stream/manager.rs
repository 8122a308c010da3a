//! 流订阅注册表
//!
//! 每个 gRPC 流对应一个有界 mpsc 通道；发送失败 (已关闭或已满) 的订阅者会被移除，
//! 被移除的行情流通过 [`StreamManager::eviction_signal`] 得到通知

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use emu_bootstrap::metrics::set_stream_subscribers;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::{Notify, mpsc};
use tonic::Status;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::grpc::mapper::{orderbook_message, stream_order_state};
use crate::api::proto::invest::{
    MarketDataResponse, OrderStateStreamResponse, market_data_response,
    order_state_stream_response,
};
use crate::domain::{Instrument, InstrumentCatalog, Order, OrderBookSnapshot};

pub type MarketDataSender = mpsc::Sender<Result<MarketDataResponse, Status>>;
pub type MarketDataReceiver = mpsc::Receiver<Result<MarketDataResponse, Status>>;
pub type OrderStateSender = mpsc::Sender<Result<OrderStateStreamResponse, Status>>;
pub type OrderStateReceiver = mpsc::Receiver<Result<OrderStateStreamResponse, Status>>;

const KIND_ORDER_BOOK: &str = "order_book";
const KIND_ORDER_STATE: &str = "order_state";

struct OrderBookSubscriber {
    sender: MarketDataSender,
    evicted: Arc<Notify>,
    /// 标的 uid -> 深度
    instruments: HashMap<String, usize>,
}

struct OrderStateSubscriber {
    sender: OrderStateSender,
    /// 为空表示接收所有账户
    accounts: HashSet<String>,
}

impl OrderStateSubscriber {
    fn wants(&self, account_id: &str) -> bool {
        self.accounts.is_empty() || self.accounts.contains(account_id)
    }
}

pub struct StreamManager {
    catalog: Arc<InstrumentCatalog>,
    reference_price: Decimal,
    max_depth: usize,
    capacity: usize,
    order_books: Mutex<HashMap<String, OrderBookSubscriber>>,
    order_states: Mutex<HashMap<String, OrderStateSubscriber>>,
}

impl StreamManager {
    pub fn new(
        catalog: Arc<InstrumentCatalog>,
        reference_price: Decimal,
        max_depth: usize,
        capacity: usize,
    ) -> Self {
        Self {
            catalog,
            reference_price,
            max_depth: max_depth.max(1),
            capacity: capacity.max(1),
            order_books: Mutex::new(HashMap::new()),
            order_states: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &InstrumentCatalog {
        &self.catalog
    }

    /// 订阅深度：非正数或超过快照深度时取快照深度
    pub fn normalize_depth(&self, depth: i32) -> usize {
        match usize::try_from(depth) {
            Ok(d) if d > 0 && d <= self.max_depth => d,
            _ => self.max_depth,
        }
    }

    /// 打开一个行情流，返回流 id、发送端 (用于订阅确认) 与接收端
    pub fn open_market_data_stream(&self) -> (String, MarketDataSender, MarketDataReceiver) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let stream_id = Uuid::new_v4().to_string();
        let count = {
            let mut subs = self.order_books.lock();
            subs.insert(
                stream_id.clone(),
                OrderBookSubscriber {
                    sender: tx.clone(),
                    evicted: Arc::new(Notify::new()),
                    instruments: HashMap::new(),
                },
            );
            subs.len()
        };
        set_stream_subscribers(KIND_ORDER_BOOK, count);
        info!(%stream_id, "Market data stream opened");
        (stream_id, tx, rx)
    }

    /// 流被移除时触发的通知；流已不在注册表中时返回 `None`
    pub fn eviction_signal(&self, stream_id: &str) -> Option<Arc<Notify>> {
        self.order_books
            .lock()
            .get(stream_id)
            .map(|sub| sub.evicted.clone())
    }

    /// 流已被移除时返回 `false`
    pub fn subscribe_order_book(&self, stream_id: &str, instrument_uid: &str, depth: usize) -> bool {
        let mut subs = self.order_books.lock();
        match subs.get_mut(stream_id) {
            Some(sub) => {
                sub.instruments.insert(instrument_uid.to_string(), depth);
                debug!(%stream_id, instrument_uid, depth, "Order book subscription added");
                true
            }
            None => {
                warn!(%stream_id, instrument_uid, "Subscription on evicted market data stream");
                false
            }
        }
    }

    pub fn unsubscribe_order_book(&self, stream_id: &str, instrument_uid: &str) -> bool {
        let mut subs = self.order_books.lock();
        let removed = subs
            .get_mut(stream_id)
            .and_then(|sub| sub.instruments.remove(instrument_uid))
            .is_some();
        if removed {
            debug!(%stream_id, instrument_uid, "Order book subscription removed");
        }
        removed
    }

    pub fn close_market_data_stream(&self, stream_id: &str) {
        let count = {
            let mut subs = self.order_books.lock();
            subs.remove(stream_id);
            subs.len()
        };
        set_stream_subscribers(KIND_ORDER_BOOK, count);
        info!(%stream_id, "Market data stream closed");
    }

    /// 注册订单状态流
    pub fn open_order_state_stream(&self, accounts: Vec<String>) -> (String, OrderStateReceiver) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let stream_id = Uuid::new_v4().to_string();
        let accounts: HashSet<String> = accounts.into_iter().filter(|a| !a.is_empty()).collect();
        info!(%stream_id, accounts = ?accounts, "Order state stream opened");
        let count = {
            let mut subs = self.order_states.lock();
            subs.insert(
                stream_id.clone(),
                OrderStateSubscriber {
                    sender: tx,
                    accounts,
                },
            );
            subs.len()
        };
        set_stream_subscribers(KIND_ORDER_STATE, count);
        (stream_id, rx)
    }

    pub fn order_book_subscriber_count(&self) -> usize {
        self.order_books.lock().len()
    }

    pub fn order_state_subscriber_count(&self) -> usize {
        self.order_states.lock().len()
    }

    /// 给单个流按其订阅深度推送快照
    pub fn send_order_book_to(&self, stream_id: &str, snapshot: &OrderBookSnapshot) -> bool {
        let Some(instrument) = self.catalog.resolve(&snapshot.instrument_id) else {
            return false;
        };
        let subs = self.order_books.lock();
        let Some(sub) = subs.get(stream_id) else {
            return false;
        };
        let Some(depth) = sub.instruments.get(&instrument.uid) else {
            return false;
        };
        let message = self.market_data_message(snapshot, instrument, *depth);
        sub.sender.try_send(Ok(message)).is_ok()
    }

    /// 推送盘口到所有订阅了该标的的流，返回送达数量
    pub fn broadcast_order_book(&self, snapshot: &OrderBookSnapshot) -> usize {
        let Some(instrument) = self.catalog.resolve(&snapshot.instrument_id) else {
            warn!(instrument = %snapshot.instrument_id, "Snapshot for unknown instrument");
            return 0;
        };

        let (delivered, count) = {
            let mut subs = self.order_books.lock();
            let mut delivered = 0;
            subs.retain(|stream_id, sub| {
                let Some(depth) = sub.instruments.get(&instrument.uid) else {
                    return true;
                };
                match sub.sender.try_send(Ok(self.market_data_message(snapshot, instrument, *depth))) {
                    Ok(()) => {
                        delivered += 1;
                        true
                    }
                    Err(e) => {
                        warn!(%stream_id, error = %e, "Dropping order book subscriber");
                        sub.evicted.notify_one();
                        false
                    }
                }
            });
            (delivered, subs.len())
        };
        set_stream_subscribers(KIND_ORDER_BOOK, count);
        delivered
    }

    /// 推送订单状态到关注该账户的流，返回送达数量
    pub fn broadcast_order_state(&self, order: &Order) -> usize {
        let Some(instrument) = self.catalog.resolve(&order.instrument_id) else {
            warn!(instrument = %order.instrument_id, "Order state for unknown instrument");
            return 0;
        };
        let message = OrderStateStreamResponse {
            payload: Some(order_state_stream_response::Payload::OrderState(
                stream_order_state(order, instrument),
            )),
        };

        let (delivered, count) = {
            let mut subs = self.order_states.lock();
            let mut delivered = 0;
            subs.retain(|stream_id, sub| {
                if !sub.wants(&order.account_id) {
                    return true;
                }
                match sub.sender.try_send(Ok(message.clone())) {
                    Ok(()) => {
                        delivered += 1;
                        true
                    }
                    Err(e) => {
                        warn!(%stream_id, error = %e, "Dropping order state subscriber");
                        false
                    }
                }
            });
            (delivered, subs.len())
        };
        set_stream_subscribers(KIND_ORDER_STATE, count);
        delivered
    }

    fn market_data_message(
        &self,
        snapshot: &OrderBookSnapshot,
        instrument: &Instrument,
        depth: usize,
    ) -> MarketDataResponse {
        MarketDataResponse {
            payload: Some(market_data_response::Payload::Orderbook(orderbook_message(
                snapshot,
                instrument,
                depth,
                self.reference_price,
            ))),
        }
    }
}
