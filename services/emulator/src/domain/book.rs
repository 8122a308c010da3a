//! 盘口数据结构
//!
//! 买盘按价格降序、卖盘按价格升序，同价位内按时间先后排列

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::order::{Order, OrderDirection, OrderSource};

/// 单个价位
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub orders: Vec<Order>,
}

impl PriceLevel {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: Vec::new(),
        }
    }

    /// 剩余手数之和，超出 i64 时取 `i64::MAX`
    pub fn total_quantity(&self) -> i64 {
        saturating_lots(self.exact_quantity())
    }

    /// 不会溢出的剩余手数之和，撮合按它分配
    pub fn exact_quantity(&self) -> i128 {
        self.orders
            .iter()
            .map(|o| i128::from(o.remaining_quantity()))
            .sum()
    }

    /// 机器人 (API) 订单的剩余手数
    pub fn api_quantity(&self) -> i64 {
        saturating_lots(
            self.orders
                .iter()
                .filter(|o| o.source == OrderSource::Api)
                .map(|o| i128::from(o.remaining_quantity()))
                .sum(),
        )
    }

    pub fn orders_count(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

fn saturating_lots(total: i128) -> i64 {
    i64::try_from(total).unwrap_or(i64::MAX)
}

/// 单标的订单簿
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub instrument_id: String,
    pub(crate) bids: BTreeMap<Decimal, PriceLevel>,
    pub(crate) asks: BTreeMap<Decimal, PriceLevel>,
}

impl OrderBook {
    pub fn new(instrument_id: impl Into<String>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
        }
    }

    pub fn side(&self, direction: OrderDirection) -> &BTreeMap<Decimal, PriceLevel> {
        match direction {
            OrderDirection::Buy => &self.bids,
            OrderDirection::Sell => &self.asks,
        }
    }

    pub fn side_mut(&mut self, direction: OrderDirection) -> &mut BTreeMap<Decimal, PriceLevel> {
        match direction {
            OrderDirection::Buy => &mut self.bids,
            OrderDirection::Sell => &mut self.asks,
        }
    }

    /// 把订单追加到其价位队尾
    pub fn insert(&mut self, order: Order) {
        self.side_mut(order.direction)
            .entry(order.price)
            .or_insert_with(|| PriceLevel::new(order.price))
            .orders
            .push(order);
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// 按最优价优先遍历某一侧
    pub fn levels(&self, direction: OrderDirection) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match direction {
            OrderDirection::Buy => Box::new(self.bids.values().rev()),
            OrderDirection::Sell => Box::new(self.asks.values()),
        }
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.bids
            .values()
            .chain(self.asks.values())
            .flat_map(|level| level.orders.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    /// 深拷贝前 `depth` 档
    pub fn snapshot(&self, depth: usize) -> OrderBookSnapshot {
        OrderBookSnapshot {
            instrument_id: self.instrument_id.clone(),
            bids: self.levels(OrderDirection::Buy).take(depth).cloned().collect(),
            asks: self.levels(OrderDirection::Sell).take(depth).cloned().collect(),
            timestamp: Utc::now(),
        }
    }
}

/// 订单簿快照，两侧均为最优价在前
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBookSnapshot {
    pub instrument_id: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub timestamp: DateTime<Utc>,
}

impl OrderBookSnapshot {
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// 截取前 `depth` 档
    pub fn truncated(&self, depth: usize) -> Self {
        Self {
            instrument_id: self.instrument_id.clone(),
            bids: self.bids.iter().take(depth).cloned().collect(),
            asks: self.asks.iter().take(depth).cloned().collect(),
            timestamp: self.timestamp,
        }
    }
}
