//! 订单与成交

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderDirection {
    Buy,
    Sell,
}

impl OrderDirection {
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Limit => "LIMIT",
            Self::Market => "MARKET",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
        }
    }
}

/// 订单来源：机器人 (gRPC) 或管理面板 (做市)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSource {
    Api,
    AdminPanel,
}

impl OrderSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "API",
            Self::AdminPanel => "ADMIN_PANEL",
        }
    }
}

/// 订单，数量单位为手
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: Uuid,
    /// 客户端传入的非 UUID 订单号
    pub request_id: Option<String>,
    pub instrument_id: String,
    pub account_id: String,
    pub direction: OrderDirection,
    pub order_type: OrderType,
    pub price: Decimal,
    pub quantity: i64,
    pub filled_quantity: i64,
    /// 已成交金额 (成交价 * 手数 之和)
    pub executed_value: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub source: OrderSource,
}

impl Order {
    pub fn new(
        instrument_id: impl Into<String>,
        account_id: impl Into<String>,
        direction: OrderDirection,
        order_type: OrderType,
        price: Decimal,
        quantity: i64,
        source: OrderSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id: None,
            instrument_id: instrument_id.into(),
            account_id: account_id.into(),
            direction,
            order_type,
            price,
            quantity,
            filled_quantity: 0,
            executed_value: Decimal::ZERO,
            status: OrderStatus::New,
            created_at: Utc::now(),
            source,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn remaining_quantity(&self) -> i64 {
        self.quantity - self.filled_quantity
    }

    pub fn is_fully_filled(&self) -> bool {
        self.filled_quantity >= self.quantity
    }

    /// 成交 `amount` 手；非正数忽略，超出部分截断到订单数量
    pub fn fill(&mut self, amount: i64) {
        if amount <= 0 {
            return;
        }
        self.filled_quantity += amount;
        if self.filled_quantity >= self.quantity {
            self.filled_quantity = self.quantity;
            self.status = OrderStatus::Filled;
        } else {
            self.status = OrderStatus::PartiallyFilled;
        }
    }

    /// 按成交价成交 `amount` 手并累计成交金额
    pub fn fill_at(&mut self, amount: i64, price: Decimal) {
        let before = self.filled_quantity;
        self.fill(amount);
        self.executed_value += price * Decimal::from(self.filled_quantity - before);
    }

    /// 订单名义金额 (价格 * 手数)
    pub fn notional(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    /// 客户端可见的订单号
    pub fn client_order_id(&self) -> String {
        self.request_id
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub id: Uuid,
    pub aggressor_order_id: Uuid,
    pub aggressor_source: OrderSource,
    pub aggressor_direction: OrderDirection,
    pub passive_order_id: Uuid,
    pub passive_account_id: String,
    pub passive_source: OrderSource,
    pub instrument_id: String,
    pub price: Decimal,
    pub quantity: i64,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    pub fn value(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}
