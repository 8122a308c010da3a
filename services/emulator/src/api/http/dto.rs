//! 管理面板 JSON 数据结构
//!
//! 字段统一 camelCase，价格以 JSON 数字输出

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Account, Order, OrderBookSnapshot, OrderDirection, OrderType, Position, PriceLevel,
};

/// 管理面板 REST 返回的盘口深度
pub const ADMIN_BOOK_DEPTH: usize = 20;

/// WebSocket 推送的盘口深度
pub const WS_BOOK_DEPTH: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLevelDto {
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: i64,
    pub orders_count: usize,
    /// 机器人订单的剩余手数
    pub api_quantity: i64,
}

impl From<&PriceLevel> for PriceLevelDto {
    fn from(level: &PriceLevel) -> Self {
        Self {
            price: level.price,
            quantity: level.total_quantity(),
            orders_count: level.orders_count(),
            api_quantity: level.api_quantity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBookDto {
    pub instrument_id: String,
    pub depth: usize,
    pub bids: Vec<PriceLevelDto>,
    pub asks: Vec<PriceLevelDto>,
    pub timestamp: DateTime<Utc>,
}

impl OrderBookDto {
    pub fn from_snapshot(snapshot: &OrderBookSnapshot, depth: usize) -> Self {
        let levels = |side: &[PriceLevel]| -> Vec<PriceLevelDto> {
            side.iter().take(depth).map(PriceLevelDto::from).collect()
        };
        Self {
            instrument_id: snapshot.instrument_id.clone(),
            depth,
            bids: levels(&snapshot.bids),
            asks: levels(&snapshot.asks),
            timestamp: snapshot.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    pub id: String,
    pub instrument_id: String,
    pub account_id: String,
    pub direction: OrderDirection,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: i64,
    pub filled_quantity: i64,
    pub status: String,
    pub source: String,
}

impl From<&Order> for OrderDto {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.to_string(),
            instrument_id: order.instrument_id.clone(),
            account_id: order.account_id.clone(),
            direction: order.direction,
            order_type: order.order_type,
            price: order.price,
            quantity: order.quantity,
            filled_quantity: order.filled_quantity,
            status: order.status.as_str().to_string(),
            source: order.source.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDto {
    pub instrument_id: String,
    pub quantity: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub average_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_price: Decimal,
}

impl From<&Position> for PositionDto {
    fn from(position: &Position) -> Self {
        Self {
            instrument_id: position.instrument_id.clone(),
            quantity: position.quantity,
            average_price: position.average_price,
            current_price: position.current_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDto {
    pub id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub positions: BTreeMap<String, PositionDto>,
}

impl From<&Account> for AccountDto {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            balance: account.balance,
            positions: account
                .positions
                .iter()
                .map(|(uid, position)| (uid.clone(), PositionDto::from(position)))
                .collect(),
        }
    }
}

/// 管理面板下单请求
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub instrument_id: Option<String>,
    pub direction: OrderDirection,
    pub order_type: OrderType,
    /// 市价单可省略
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    pub quantity: i64,
    #[serde(default)]
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearBookResponse {
    pub removed: usize,
}

/// WebSocket 消息信封
#[derive(Debug, Clone, Serialize)]
pub struct WsEnvelope<T> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: T,
}

impl WsEnvelope<OrderBookDto> {
    pub fn order_book(dto: OrderBookDto) -> Self {
        Self {
            kind: "ORDERBOOK_UPDATE",
            data: dto,
        }
    }
}
