//! 交易服务
//!
//! gRPC 与管理面板共用的下单/撤单入口

use std::sync::Arc;

use emu_bootstrap::metrics::{record_order_cancelled, record_order_submitted, record_trades};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    AccountManager, EngineEvent, EventBus, Order, OrderBookManager, OrderSource, OrderStatus,
    OrderType, ProRataMatchingEngine, Trade,
};
use crate::error::{EmulatorError, EmulatorResult};

/// 一次下单的结果
#[derive(Debug, Clone)]
pub struct Execution {
    pub order: Order,
    pub trades: Vec<Trade>,
}

impl Execution {
    pub fn executed_lots(&self) -> i64 {
        self.trades.iter().map(|t| t.quantity).sum()
    }

    /// 成交金额之和 (价格 * 手数)
    pub fn executed_value(&self) -> Decimal {
        self.trades.iter().map(Trade::value).sum()
    }
}

pub struct TradingService {
    engine: ProRataMatchingEngine,
    accounts: Arc<AccountManager>,
    events: EventBus,
}

impl TradingService {
    pub fn new(book: Arc<OrderBookManager>, accounts: Arc<AccountManager>, events: EventBus) -> Self {
        Self {
            engine: ProRataMatchingEngine::new(book),
            accounts,
            events,
        }
    }

    pub fn book(&self) -> &Arc<OrderBookManager> {
        self.engine.book()
    }

    pub fn accounts(&self) -> &Arc<AccountManager> {
        &self.accounts
    }

    /// 提交订单
    ///
    /// 成交逐笔记入账户，限价单剩余部分挂单，没有任何成交的市价单被拒绝。
    pub fn submit(&self, mut order: Order) -> EmulatorResult<Execution> {
        if order.quantity <= 0 {
            return Err(EmulatorError::InvalidQuantity(order.quantity));
        }
        if order.order_type == OrderType::Limit && order.price <= Decimal::ZERO {
            return Err(EmulatorError::InvalidPrice);
        }
        if self.book().contains(&order.id) {
            return Err(EmulatorError::DuplicateOrder(order.id.to_string()));
        }

        if order.source == OrderSource::Api {
            self.events
                .publish(EngineEvent::OrderStateChanged(order.clone()));
        }

        let (trades, rested) = self.engine.execute_and_rest(&mut order);
        for trade in &trades {
            self.accounts.apply_trade(trade);
        }

        if order.order_type == OrderType::Market && order.filled_quantity == 0 {
            order.status = OrderStatus::Rejected;
            warn!(order_id = %order.id, "Market order rejected: no liquidity");
            self.events
                .publish(EngineEvent::OrderStateChanged(order.clone()));
        }

        let execution = Execution { order, trades };
        record_order_submitted(
            execution.order.source.as_str(),
            execution.order.order_type.as_str(),
            execution.order.status.as_str(),
        );
        if !execution.trades.is_empty() {
            record_trades(execution.trades.len(), execution.executed_lots());
        }

        info!(
            order_id = %execution.order.id,
            source = execution.order.source.as_str(),
            direction = execution.order.direction.as_str(),
            order_type = execution.order.order_type.as_str(),
            price = %execution.order.price,
            quantity = execution.order.quantity,
            filled = execution.order.filled_quantity,
            status = execution.order.status.as_str(),
            trades = execution.trades.len(),
            rested,
            "Order processed"
        );

        Ok(execution)
    }

    /// 撤单；给出 `account_id` 时 (包括空串) 校验订单归属，管理面板传 `None`
    pub fn cancel(&self, order_id: &Uuid, account_id: Option<&str>) -> EmulatorResult<Order> {
        let existing = self
            .book()
            .get_order(order_id)
            .ok_or_else(|| EmulatorError::OrderNotFound(order_id.to_string()))?;

        if let Some(account_id) = account_id {
            if existing.account_id != account_id {
                return Err(EmulatorError::OrderOwnership {
                    order_id: order_id.to_string(),
                    account_id: account_id.to_string(),
                });
            }
        }

        let mut order = self
            .book()
            .take_order(order_id)
            .ok_or_else(|| EmulatorError::OrderNotFound(order_id.to_string()))?;
        order.status = OrderStatus::Cancelled;

        self.events
            .publish(EngineEvent::OrderStateChanged(order.clone()));
        record_order_cancelled(order.source.as_str());
        info!(
            order_id = %order.id,
            account_id = %order.account_id,
            remaining = order.remaining_quantity(),
            "Order cancelled"
        );

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderDirection;
    use emu_config::{AccountConfig, OrderBookConfig};

    const UID: &str = "uid-1";

    fn service() -> (TradingService, EventBus) {
        let bus = EventBus::new(256);
        let book = Arc::new(OrderBookManager::new(UID, bus.clone()));
        book.seed(&OrderBookConfig::default());
        let accounts = Arc::new(AccountManager::new(&AccountConfig::default()));
        (TradingService::new(book, accounts, bus.clone()), bus)
    }

    fn api_order(direction: OrderDirection, order_type: OrderType, price: &str, qty: i64) -> Order {
        Order::new(
            UID,
            "emulator-account",
            direction,
            order_type,
            price.parse().unwrap(),
            qty,
            OrderSource::Api,
        )
    }

    #[test]
    fn test_market_buy_updates_account_once() {
        let (svc, _bus) = service();
        let before = svc.accounts().balance();

        let execution = svc
            .submit(api_order(OrderDirection::Buy, OrderType::Market, "0", 10))
            .unwrap();

        assert_eq!(execution.order.status, OrderStatus::Filled);
        assert_eq!(execution.executed_lots(), 10);
        assert_eq!(execution.executed_value(), "77.10".parse::<Decimal>().unwrap());
        assert_eq!(svc.accounts().position_quantity(UID), 10);
        assert_eq!(svc.accounts().balance(), before - execution.executed_value());
    }

    #[test]
    fn test_limit_remainder_rests() {
        let (svc, _bus) = service();
        let execution = svc
            .submit(api_order(OrderDirection::Buy, OrderType::Limit, "7.70", 5))
            .unwrap();

        assert!(execution.trades.is_empty());
        assert_eq!(execution.order.status, OrderStatus::New);
        assert_eq!(svc.book().best_bid(), Some("7.70".parse().unwrap()));
        assert_eq!(svc.book().orders_for_account("emulator-account").len(), 1);
    }

    #[test]
    fn test_market_without_liquidity_is_rejected() {
        let (svc, bus) = service();
        svc.book().clear();
        let mut rx = bus.subscribe();

        let execution = svc
            .submit(api_order(OrderDirection::Sell, OrderType::Market, "0", 3))
            .unwrap();

        assert_eq!(execution.order.status, OrderStatus::Rejected);
        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let EngineEvent::OrderStateChanged(o) = event {
                statuses.push(o.status);
            }
        }
        assert_eq!(statuses, vec![OrderStatus::New, OrderStatus::Rejected]);
    }

    #[test]
    fn test_partial_market_fill_does_not_rest() {
        let (svc, _bus) = service();
        let execution = svc
            .submit(api_order(OrderDirection::Buy, OrderType::Market, "0", 1500))
            .unwrap();

        assert_eq!(execution.order.status, OrderStatus::PartiallyFilled);
        assert_eq!(execution.executed_lots(), 1000);
        assert_eq!(svc.book().best_ask(), None);
        assert!(svc.book().get_order(&execution.order.id).is_none());
    }

    #[test]
    fn test_validation() {
        let (svc, _bus) = service();
        assert!(matches!(
            svc.submit(api_order(OrderDirection::Buy, OrderType::Limit, "7.70", 0)),
            Err(EmulatorError::InvalidQuantity(0))
        ));
        assert!(matches!(
            svc.submit(api_order(OrderDirection::Buy, OrderType::Limit, "0", 1)),
            Err(EmulatorError::InvalidPrice)
        ));
    }

    #[test]
    fn test_duplicate_order_id() {
        let (svc, _bus) = service();
        let order = api_order(OrderDirection::Buy, OrderType::Limit, "7.60", 1);
        svc.submit(order.clone()).unwrap();
        assert!(matches!(
            svc.submit(order),
            Err(EmulatorError::DuplicateOrder(_))
        ));
    }

    #[test]
    fn test_cancel_checks_owner() {
        let (svc, bus) = service();
        let order = svc
            .submit(api_order(OrderDirection::Sell, OrderType::Limit, "7.80", 2))
            .unwrap()
            .order;

        assert!(matches!(
            svc.cancel(&order.id, Some("someone-else")),
            Err(EmulatorError::OrderOwnership { .. })
        ));
        assert!(matches!(
            svc.cancel(&order.id, Some("")),
            Err(EmulatorError::OrderOwnership { .. })
        ));
        assert!(svc.book().get_order(&order.id).is_some());

        let mut rx = bus.subscribe();
        let cancelled = svc.cancel(&order.id, Some("emulator-account")).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(svc.book().get_order(&order.id).is_none());

        let published = std::iter::from_fn(|| rx.try_recv().ok()).any(|e| {
            matches!(e, EngineEvent::OrderStateChanged(o) if o.status == OrderStatus::Cancelled)
        });
        assert!(published);

        assert!(matches!(
            svc.cancel(&order.id, None),
            Err(EmulatorError::OrderNotFound(_))
        ));
    }

    #[test]
    fn test_admin_trade_against_api_order() {
        let (svc, _bus) = service();
        svc.submit(api_order(OrderDirection::Sell, OrderType::Limit, "7.70", 10))
            .unwrap();

        let admin = Order::new(
            UID,
            "admin-market-maker",
            OrderDirection::Buy,
            OrderType::Limit,
            "7.70".parse().unwrap(),
            4,
            OrderSource::AdminPanel,
        );
        let execution = svc.submit(admin).unwrap();

        assert_eq!(execution.executed_lots(), 4);
        assert_eq!(svc.accounts().position_quantity(UID), -4);
    }
}
