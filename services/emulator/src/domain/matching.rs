//! 按比例 (pro-rata) 撮合引擎
//!
//! 同一价位内按剩余数量比例分配，取整余下的手数按时间先后逐手补齐

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use super::events::{EngineEvent, EventBus};
use super::order::{Order, OrderDirection, OrderType, Trade};
use super::orderbook::{BookState, OrderBookManager};

/// 按比例分配 `to_execute` 手
///
/// 先对每个订单取 `floor(to_execute * remaining_i / total)`，
/// 余数再按顺序逐手分给尚未满额的订单，循环直到分完。
pub fn allocate(to_execute: i64, remaining: &[i64]) -> Vec<i64> {
    let total: i128 = remaining
        .iter()
        .filter(|r| **r > 0)
        .map(|r| i128::from(*r))
        .sum();
    let mut allocations = vec![0i64; remaining.len()];
    if to_execute <= 0 || total <= 0 {
        return allocations;
    }
    let to_execute = i128::from(to_execute).min(total);

    // 单个份额不超过该订单的剩余量，转换不会截断
    for (slot, &r) in allocations.iter_mut().zip(remaining) {
        if r > 0 {
            *slot = (to_execute * i128::from(r) / total) as i64;
        }
    }

    let mut left = to_execute - allocations.iter().map(|a| i128::from(*a)).sum::<i128>();
    while left > 0 {
        let mut progressed = false;
        for (slot, &r) in allocations.iter_mut().zip(remaining) {
            if left == 0 {
                break;
            }
            if *slot < r {
                *slot += 1;
                left -= 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    allocations
}

/// 限价单遇到比限价更差的价位时停止
fn beyond_limit(aggressor: &Order, level_price: Decimal) -> bool {
    if aggressor.order_type != OrderType::Limit {
        return false;
    }
    match aggressor.direction {
        OrderDirection::Buy => level_price > aggressor.price,
        OrderDirection::Sell => level_price < aggressor.price,
    }
}

pub struct ProRataMatchingEngine {
    book: Arc<OrderBookManager>,
}

impl ProRataMatchingEngine {
    pub fn new(book: Arc<OrderBookManager>) -> Self {
        Self { book }
    }

    pub fn book(&self) -> &Arc<OrderBookManager> {
        &self.book
    }

    /// 撮合主动单，不挂剩余部分
    pub fn execute(&self, aggressor: &mut Order) -> Vec<Trade> {
        let mut state = self.book.write();
        let (trades, changed) = match_locked(&mut state, aggressor, self.book.events());
        if changed {
            self.book.publish_locked(&state);
        }
        trades
    }

    /// 撮合主动单；限价单未成交部分在同一把锁内挂到簿上
    ///
    /// 返回成交列表以及订单是否已挂单
    pub fn execute_and_rest(&self, aggressor: &mut Order) -> (Vec<Trade>, bool) {
        let mut state = self.book.write();
        let (trades, mut changed) = match_locked(&mut state, aggressor, self.book.events());

        let mut rested = false;
        if aggressor.order_type == OrderType::Limit && aggressor.remaining_quantity() > 0 {
            rested = state.insert(aggressor.clone());
            changed |= rested;
        }

        if changed {
            self.book.publish_locked(&state);
        }
        (trades, rested)
    }
}

/// 在写锁内撮合，返回成交以及订单簿是否发生变化
fn match_locked(
    state: &mut BookState,
    aggressor: &mut Order,
    events: &EventBus,
) -> (Vec<Trade>, bool) {
    let mut trades = Vec::new();
    let mut changed = false;
    if aggressor.remaining_quantity() <= 0 {
        return (trades, changed);
    }

    let opposite = aggressor.direction.opposite();
    let BookState { book, index } = state;
    let instrument_id = book.instrument_id.clone();

    while aggressor.remaining_quantity() > 0 {
        let side = book.side_mut(opposite);
        let entry = match opposite {
            OrderDirection::Buy => side.last_entry(),
            OrderDirection::Sell => side.first_entry(),
        };
        let Some(mut entry) = entry else { break };

        let level_price = *entry.key();
        if beyond_limit(aggressor, level_price) {
            break;
        }

        let level = entry.get_mut();
        let level_total = level.exact_quantity();
        if level_total <= 0 {
            for order in level.orders.drain(..) {
                index.remove(&order.id);
            }
            entry.remove();
            changed = true;
            continue;
        }

        let to_execute = match i64::try_from(level_total) {
            Ok(total) => aggressor.remaining_quantity().min(total),
            Err(_) => aggressor.remaining_quantity(),
        };
        let remaining: Vec<i64> = level.orders.iter().map(Order::remaining_quantity).collect();
        let allocations = allocate(to_execute, &remaining);

        debug!(
            price = %level_price,
            to_execute,
            level_total = %level_total,
            orders = level.orders.len(),
            "Matching price level"
        );

        for (passive, lots) in level.orders.iter_mut().zip(allocations) {
            if lots <= 0 {
                continue;
            }
            let trade = Trade {
                id: Uuid::new_v4(),
                aggressor_order_id: aggressor.id,
                aggressor_source: aggressor.source,
                aggressor_direction: aggressor.direction,
                passive_order_id: passive.id,
                passive_account_id: passive.account_id.clone(),
                passive_source: passive.source,
                instrument_id: instrument_id.clone(),
                price: level_price,
                quantity: lots,
                timestamp: Utc::now(),
            };

            passive.fill_at(lots, level_price);
            aggressor.fill_at(lots, level_price);

            events.publish(EngineEvent::TradeExecuted(trade.clone()));
            events.publish(EngineEvent::OrderStateChanged(passive.clone()));
            events.publish(EngineEvent::OrderStateChanged(aggressor.clone()));
            trades.push(trade);
        }
        changed = true;

        level.orders.retain(|o| {
            let filled = o.is_fully_filled();
            if filled {
                index.remove(&o.id);
            }
            !filled
        });
        if level.is_empty() {
            entry.remove();
        }
    }

    (trades, changed)
}
