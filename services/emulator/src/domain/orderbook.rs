//! 订单簿管理器
//!
//! 订单簿与订单索引放在同一把读写锁下；任何改动都会发布一次 `OrderBookChanged`

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use emu_config::OrderBookConfig;
use parking_lot::{RwLock, RwLockWriteGuard};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::book::{OrderBook, OrderBookSnapshot};
use super::events::{EngineEvent, EventBus};
use super::order::{Order, OrderDirection, OrderSource, OrderType};

/// 初始做市单使用的账户
pub const MARKET_MAKER_INIT_ACCOUNT: &str = "market-maker-init";

/// 事件中携带的快照深度
pub const EVENT_SNAPSHOT_DEPTH: usize = 50;

/// 锁内状态
#[derive(Debug)]
pub struct BookState {
    pub book: OrderBook,
    /// 订单 id -> (方向, 价位)
    pub index: HashMap<Uuid, (OrderDirection, Decimal)>,
}

impl BookState {
    fn new(instrument_id: &str) -> Self {
        Self {
            book: OrderBook::new(instrument_id),
            index: HashMap::new(),
        }
    }

    /// 重复 id 返回 false
    pub fn insert(&mut self, order: Order) -> bool {
        if self.index.contains_key(&order.id) {
            return false;
        }
        self.index.insert(order.id, (order.direction, order.price));
        self.book.insert(order);
        true
    }

    pub fn take(&mut self, id: &Uuid) -> Option<Order> {
        let (direction, price) = self.index.remove(id)?;
        let side = self.book.side_mut(direction);
        let level = side.get_mut(&price)?;
        let pos = level.orders.iter().position(|o| o.id == *id)?;
        let order = level.orders.remove(pos);
        if level.is_empty() {
            side.remove(&price);
        }
        Some(order)
    }

    pub fn get(&self, id: &Uuid) -> Option<&Order> {
        let (direction, price) = self.index.get(id)?;
        self.book
            .side(*direction)
            .get(price)?
            .orders
            .iter()
            .find(|o| o.id == *id)
    }

    pub fn clear(&mut self) {
        self.book.clear();
        self.index.clear();
    }
}

pub struct OrderBookManager {
    state: RwLock<BookState>,
    events: EventBus,
    seeded: AtomicBool,
}

impl OrderBookManager {
    pub fn new(instrument_id: &str, events: EventBus) -> Self {
        Self {
            state: RwLock::new(BookState::new(instrument_id)),
            events,
            seeded: AtomicBool::new(false),
        }
    }

    pub fn instrument_id(&self) -> String {
        self.state.read().book.instrument_id.clone()
    }

    /// 挂初始做市单；未配置买卖价时只标记为已初始化
    pub fn seed(&self, config: &OrderBookConfig) {
        let instrument_id = self.instrument_id();
        let seeds = [
            (OrderDirection::Buy, config.initial_bid),
            (OrderDirection::Sell, config.initial_ask),
        ];

        for (direction, price) in seeds {
            let Some(price) = price else { continue };
            let order = Order::new(
                instrument_id.as_str(),
                MARKET_MAKER_INIT_ACCOUNT,
                direction,
                OrderType::Limit,
                price,
                config.initial_volume,
                OrderSource::AdminPanel,
            );
            self.add_order(order);
        }

        self.seeded.store(true, Ordering::Release);
        info!(
            instrument = %instrument_id,
            bid = ?config.initial_bid,
            ask = ?config.initial_ask,
            volume = config.initial_volume,
            "Order book seeded"
        );
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded.load(Ordering::Acquire)
    }

    /// 把订单挂到簿上；重复 id 会被忽略
    pub fn add_order(&self, order: Order) -> bool {
        let mut state = self.state.write();
        let id = order.id;
        if !state.insert(order) {
            warn!(order_id = %id, "Duplicate order id ignored");
            return false;
        }
        debug!(order_id = %id, "Order added to book");
        self.publish_locked(&state);
        true
    }

    /// 从簿上取下订单
    pub fn take_order(&self, id: &Uuid) -> Option<Order> {
        let mut state = self.state.write();
        let order = state.take(id)?;
        debug!(order_id = %id, "Order removed from book");
        self.publish_locked(&state);
        Some(order)
    }

    pub fn remove_order(&self, id: &Uuid) -> bool {
        self.take_order(id).is_some()
    }

    /// 清空订单簿，返回被移除的订单
    pub fn clear(&self) -> Vec<Order> {
        let mut state = self.state.write();
        let removed: Vec<Order> = state.book.orders().cloned().collect();
        state.clear();
        info!(removed = removed.len(), "Order book cleared");
        self.publish_locked(&state);
        removed
    }

    pub fn get_order(&self, id: &Uuid) -> Option<Order> {
        self.state.read().get(id).cloned()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.state.read().index.contains_key(id)
    }

    pub fn all_orders(&self) -> Vec<Order> {
        self.state.read().book.orders().cloned().collect()
    }

    pub fn orders_for_account(&self, account_id: &str) -> Vec<Order> {
        self.state
            .read()
            .book
            .orders()
            .filter(|o| o.account_id == account_id)
            .cloned()
            .collect()
    }

    pub fn snapshot(&self, depth: usize) -> OrderBookSnapshot {
        self.state.read().book.snapshot(depth)
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.state.read().book.best_bid()
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.state.read().book.best_ask()
    }

    /// 撮合期间持有的写锁
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, BookState> {
        self.state.write()
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }

    /// 持锁发布快照，保证事件顺序与改动顺序一致
    pub(crate) fn publish_locked(&self, state: &BookState) {
        let snapshot = state.book.snapshot(EVENT_SNAPSHOT_DEPTH);
        self.events
            .publish(EngineEvent::OrderBookChanged(Arc::new(snapshot)));
    }

    /// 就绪检查：已初始化且锁可获取
    pub fn readiness(&self, timeout: Duration) -> Result<(), String> {
        if !self.is_seeded() {
            return Err("order book not seeded".to_string());
        }
        match self.state.try_read_for(timeout) {
            Some(_) => Ok(()),
            None => Err("order book lock unavailable".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (OrderBookManager, EventBus) {
        let bus = EventBus::new(64);
        (OrderBookManager::new("uid-1", bus.clone()), bus)
    }

    fn limit(direction: OrderDirection, price: i64, qty: i64) -> Order {
        Order::new(
            "uid-1",
            "acc",
            direction,
            OrderType::Limit,
            Decimal::new(price, 2),
            qty,
            OrderSource::Api,
        )
    }

    #[test]
    fn test_seed_places_market_maker_orders() {
        let (mgr, _bus) = manager();
        assert!(mgr.readiness(Duration::from_millis(10)).is_err());

        mgr.seed(&OrderBookConfig::default());

        assert!(mgr.is_seeded());
        assert_eq!(mgr.best_bid(), Some(Decimal::new(769, 2)));
        assert_eq!(mgr.best_ask(), Some(Decimal::new(771, 2)));
        let orders = mgr.orders_for_account(MARKET_MAKER_INIT_ACCOUNT);
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().all(|o| o.quantity == 1000));
        assert!(orders.iter().all(|o| o.source == OrderSource::AdminPanel));
        assert!(mgr.readiness(Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn test_seed_without_prices_leaves_book_empty() {
        let (mgr, _bus) = manager();
        let config = OrderBookConfig {
            initial_bid: None,
            initial_ask: None,
            ..OrderBookConfig::default()
        };
        mgr.seed(&config);
        assert!(mgr.is_seeded());
        assert!(mgr.all_orders().is_empty());
    }

    #[test]
    fn test_add_remove_and_duplicates() {
        let (mgr, _bus) = manager();
        let order = limit(OrderDirection::Buy, 765, 10);
        let id = order.id;

        assert!(mgr.add_order(order.clone()));
        assert!(!mgr.add_order(order));
        assert_eq!(mgr.all_orders().len(), 1);
        assert_eq!(mgr.get_order(&id).map(|o| o.quantity), Some(10));

        assert!(mgr.remove_order(&id));
        assert!(!mgr.remove_order(&id));
        assert_eq!(mgr.best_bid(), None);
        assert!(mgr.snapshot(10).bids.is_empty());
    }

    #[test]
    fn test_removing_one_order_keeps_level() {
        let (mgr, _bus) = manager();
        let a = limit(OrderDirection::Sell, 771, 5);
        let b = limit(OrderDirection::Sell, 771, 7);
        let a_id = a.id;
        mgr.add_order(a);
        mgr.add_order(b);

        mgr.remove_order(&a_id);
        let snap = mgr.snapshot(5);
        assert_eq!(snap.asks.len(), 1);
        assert_eq!(snap.asks[0].total_quantity(), 7);
    }

    #[test]
    fn test_changes_publish_snapshots() {
        let (mgr, bus) = manager();
        let mut rx = bus.subscribe();
        let order = limit(OrderDirection::Buy, 765, 10);
        let id = order.id;

        mgr.add_order(order);
        mgr.remove_order(&id);
        mgr.clear();

        let mut changes = 0;
        while let Ok(event) = rx.try_recv() {
            if let EngineEvent::OrderBookChanged(snapshot) = event {
                assert_eq!(snapshot.instrument_id, "uid-1");
                changes += 1;
            }
        }
        assert_eq!(changes, 3);
    }

    #[test]
    fn test_clear_returns_removed_orders() {
        let (mgr, _bus) = manager();
        mgr.seed(&OrderBookConfig::default());
        let removed = mgr.clear();
        assert_eq!(removed.len(), 2);
        assert!(mgr.all_orders().is_empty());
        assert_eq!(mgr.best_ask(), None);
    }
}
