//! Proto 转换模块
//!
//! 领域模型与 T-Invest 合约消息之间的转换

use chrono::{DateTime, Utc};
use prost_types::Timestamp;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::api::proto::invest::{
    self as pb, MoneyValue, OrderExecutionReportStatus, OrderBookType, Quotation,
    order_state_stream_response,
};
use crate::domain::{
    Instrument, Order, OrderBookSnapshot, OrderDirection, OrderStatus, OrderType, PriceLevel,
};
use crate::error::EmulatorError;

const NANOS_PER_UNIT: i64 = 1_000_000_000;

/// 涨跌停相对中间价的比例
const LIMIT_UP_RATIO: Decimal = Decimal::from_parts(110, 0, 0, false, 2);
const LIMIT_DOWN_RATIO: Decimal = Decimal::from_parts(90, 0, 0, false, 2);

/// Decimal -> Quotation，小数部分截断到纳单位
pub fn decimal_to_quotation(value: Decimal) -> Quotation {
    let units = value.trunc();
    let nano = ((value - units) * Decimal::from(NANOS_PER_UNIT)).trunc();
    Quotation {
        units: units.to_i64().unwrap_or_default(),
        nano: nano.to_i32().unwrap_or_default(),
    }
}

pub fn quotation_to_decimal(q: &Quotation) -> Decimal {
    Decimal::from(q.units) + Decimal::new(i64::from(q.nano), 9)
}

pub fn money(value: Decimal, currency: &str) -> MoneyValue {
    let q = decimal_to_quotation(value);
    MoneyValue {
        currency: currency.to_string(),
        units: q.units,
        nano: q.nano,
    }
}

/// 将 DateTime 转换为 Timestamp
pub fn datetime_to_timestamp(dt: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

pub fn status_to_proto(status: OrderStatus) -> OrderExecutionReportStatus {
    match status {
        OrderStatus::New => OrderExecutionReportStatus::ExecutionReportStatusNew,
        OrderStatus::PartiallyFilled => OrderExecutionReportStatus::ExecutionReportStatusPartiallyfill,
        OrderStatus::Filled => OrderExecutionReportStatus::ExecutionReportStatusFill,
        OrderStatus::Cancelled => OrderExecutionReportStatus::ExecutionReportStatusCancelled,
        OrderStatus::Rejected => OrderExecutionReportStatus::ExecutionReportStatusRejected,
    }
}

pub fn direction_to_proto(direction: OrderDirection) -> pb::OrderDirection {
    match direction {
        OrderDirection::Buy => pb::OrderDirection::Buy,
        OrderDirection::Sell => pb::OrderDirection::Sell,
    }
}

pub fn direction_from_proto(value: i32) -> Result<OrderDirection, EmulatorError> {
    match pb::OrderDirection::try_from(value) {
        Ok(pb::OrderDirection::Buy) => Ok(OrderDirection::Buy),
        Ok(pb::OrderDirection::Sell) => Ok(OrderDirection::Sell),
        _ => Err(EmulatorError::validation("order direction must be BUY or SELL")),
    }
}

pub fn order_type_to_proto(order_type: OrderType) -> pb::OrderType {
    match order_type {
        OrderType::Limit => pb::OrderType::Limit,
        OrderType::Market => pb::OrderType::Market,
    }
}

/// BESTPRICE 按市价单处理
pub fn order_type_from_proto(value: i32) -> Result<OrderType, EmulatorError> {
    match pb::OrderType::try_from(value) {
        Ok(pb::OrderType::Limit) => Ok(OrderType::Limit),
        Ok(pb::OrderType::Market | pb::OrderType::Bestprice) => Ok(OrderType::Market),
        _ => Err(EmulatorError::validation("order type must be LIMIT, MARKET or BESTPRICE")),
    }
}

pub fn levels_to_proto(levels: &[PriceLevel]) -> Vec<pb::Order> {
    levels
        .iter()
        .map(|level| pb::Order {
            price: Some(decimal_to_quotation(level.price)),
            quantity: level.total_quantity(),
        })
        .collect()
}

/// 中间价 (最优买卖价均值，保留两位小数)；单边为空时使用参考价
pub fn mid_price(snapshot: &OrderBookSnapshot, reference: Decimal) -> Decimal {
    match (snapshot.best_bid(), snapshot.best_ask()) {
        (Some(bid), Some(ask)) => ((bid + ask) / Decimal::TWO)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        _ => reference,
    }
}

/// (涨停价, 跌停价)
pub fn price_limits(snapshot: &OrderBookSnapshot, reference: Decimal) -> (Decimal, Decimal) {
    let mid = mid_price(snapshot, reference);
    (mid * LIMIT_UP_RATIO, mid * LIMIT_DOWN_RATIO)
}

/// 流推送使用的盘口消息
pub fn orderbook_message(
    snapshot: &OrderBookSnapshot,
    instrument: &Instrument,
    depth: usize,
    reference: Decimal,
) -> pb::OrderBook {
    let view = snapshot.truncated(depth);
    let (limit_up, limit_down) = price_limits(snapshot, reference);
    pb::OrderBook {
        figi: instrument.figi.clone(),
        depth: depth as i32,
        is_consistent: true,
        bids: levels_to_proto(&view.bids),
        asks: levels_to_proto(&view.asks),
        time: Some(datetime_to_timestamp(snapshot.timestamp)),
        limit_up: Some(decimal_to_quotation(limit_up)),
        limit_down: Some(decimal_to_quotation(limit_down)),
        instrument_uid: instrument.uid.clone(),
        order_book_type: OrderBookType::OrderbookTypeExchange as i32,
        ticker: instrument.ticker.clone(),
        class_code: instrument.class_code.clone(),
    }
}

/// 平均成交价 (每手)
fn average_execution_price(order: &Order) -> Decimal {
    if order.filled_quantity > 0 {
        order.executed_value / Decimal::from(order.filled_quantity)
    } else {
        Decimal::ZERO
    }
}

/// GetOrders 使用的订单状态
pub fn order_state(order: &Order, instrument: &Instrument) -> pb::OrderState {
    let currency = instrument.currency.as_str();
    pb::OrderState {
        order_id: order.id.to_string(),
        execution_report_status: status_to_proto(order.status) as i32,
        lots_requested: order.quantity,
        lots_executed: order.filled_quantity,
        initial_order_price: Some(money(order.notional(), currency)),
        executed_order_price: Some(money(order.executed_value, currency)),
        total_order_amount: Some(money(order.notional(), currency)),
        average_position_price: Some(money(average_execution_price(order), currency)),
        initial_commission: Some(money(Decimal::ZERO, currency)),
        executed_commission: Some(money(Decimal::ZERO, currency)),
        figi: instrument.figi.clone(),
        direction: direction_to_proto(order.direction) as i32,
        initial_security_price: Some(money(order.price, currency)),
        service_commission: Some(money(Decimal::ZERO, currency)),
        currency: currency.to_string(),
        order_type: order_type_to_proto(order.order_type) as i32,
        order_date: Some(datetime_to_timestamp(order.created_at)),
        instrument_uid: instrument.uid.clone(),
        order_request_id: order.request_id.clone().unwrap_or_default(),
    }
}

/// OrderStateStream 推送的订单状态
pub fn stream_order_state(
    order: &Order,
    instrument: &Instrument,
) -> order_state_stream_response::OrderState {
    let currency = instrument.currency.as_str();
    let lots_cancelled = if order.status == OrderStatus::Cancelled {
        order.remaining_quantity()
    } else {
        0
    };
    order_state_stream_response::OrderState {
        order_id: order.id.to_string(),
        order_request_id: order.request_id.clone(),
        client_code: String::new(),
        created_at: Some(datetime_to_timestamp(order.created_at)),
        execution_report_status: status_to_proto(order.status) as i32,
        ticker: instrument.ticker.clone(),
        class_code: instrument.class_code.clone(),
        lot_size: instrument.lot,
        direction: direction_to_proto(order.direction) as i32,
        order_type: order_type_to_proto(order.order_type) as i32,
        account_id: order.account_id.clone(),
        initial_order_price: Some(money(order.notional(), currency)),
        order_price: Some(money(order.price, currency)),
        executed_order_price: Some(money(average_execution_price(order), currency)),
        currency: currency.to_string(),
        lots_requested: order.quantity,
        lots_executed: order.filled_quantity,
        lots_left: order.remaining_quantity() - lots_cancelled,
        lots_cancelled,
        instrument_uid: instrument.uid.clone(),
    }
}
