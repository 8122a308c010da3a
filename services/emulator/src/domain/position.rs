//! 持仓与账户

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// 均价保留的小数位
const AVERAGE_PRICE_SCALE: u32 = 9;

/// 单个标的的持仓，数量为正表示多头、为负表示空头
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub instrument_id: String,
    pub quantity: i64,
    pub average_price: Decimal,
    pub current_price: Decimal,
}

impl Position {
    pub fn new(instrument_id: impl Into<String>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            quantity: 0,
            average_price: Decimal::ZERO,
            current_price: Decimal::ZERO,
        }
    }

    /// 按一笔成交更新持仓
    ///
    /// - 同方向加仓：按数量加权重新计算均价
    /// - 减仓：均价不变
    /// - 平仓到 0：均价归零
    /// - 反手穿过 0：均价为本次成交价
    pub fn update(&mut self, delta: i64, price: Decimal) {
        if delta == 0 {
            return;
        }
        let old = self.quantity;
        let new = old + delta;

        if new == 0 {
            self.average_price = Decimal::ZERO;
        } else if old == 0 || (old.signum() != new.signum()) {
            self.average_price = price;
        } else if old.signum() == delta.signum() {
            let total = self.average_price * Decimal::from(old.abs())
                + price * Decimal::from(delta.abs());
            self.average_price = (total / Decimal::from(new.abs()))
                .round_dp_with_strategy(AVERAGE_PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
        }

        self.quantity = new;
        self.current_price = price;
    }
}

/// 模拟账户
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub id: String,
    pub balance: Decimal,
    pub positions: HashMap<String, Position>,
}

impl Account {
    pub fn new(id: impl Into<String>, balance: Decimal) -> Self {
        Self {
            id: id.into(),
            balance,
            positions: HashMap::new(),
        }
    }

    /// 首次访问时创建空持仓
    pub fn position(&mut self, instrument_id: &str) -> &mut Position {
        self.positions
            .entry(instrument_id.to_string())
            .or_insert_with(|| Position::new(instrument_id))
    }

    pub fn position_quantity(&self, instrument_id: &str) -> i64 {
        self.positions
            .get(instrument_id)
            .map(|p| p.quantity)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(v: &str) -> Decimal {
        v.parse().unwrap()
    }

    #[test]
    fn test_weighted_average_when_growing() {
        let mut pos = Position::new("TBRU");
        pos.update(10, d("7.70"));
        assert_eq!(pos.average_price, d("7.70"));

        pos.update(20, d("7.73"));
        assert_eq!(pos.quantity, 30);
        assert_eq!(pos.average_price, d("7.72"));
        assert_eq!(pos.current_price, d("7.73"));
    }

    #[test]
    fn test_average_rounds_to_nine_places() {
        let mut pos = Position::new("TBRU");
        pos.update(1, d("1"));
        pos.update(2, d("2"));
        assert_eq!(pos.average_price, d("1.666666667"));
    }

    #[test]
    fn test_reduce_keeps_average_and_close_resets() {
        let mut pos = Position::new("TBRU");
        pos.update(10, d("7.70"));
        pos.update(-4, d("7.90"));
        assert_eq!(pos.quantity, 6);
        assert_eq!(pos.average_price, d("7.70"));

        pos.update(-6, d("7.80"));
        assert_eq!(pos.quantity, 0);
        assert_eq!(pos.average_price, Decimal::ZERO);
    }

    #[test]
    fn test_crossing_zero_takes_trade_price() {
        let mut pos = Position::new("TBRU");
        pos.update(5, d("7.70"));
        pos.update(-8, d("7.65"));
        assert_eq!(pos.quantity, -3);
        assert_eq!(pos.average_price, d("7.65"));

        pos.update(-2, d("7.60"));
        assert_eq!(pos.quantity, -5);
        assert_eq!(pos.average_price, d("7.63"));
    }

    #[test]
    fn test_zero_delta_is_noop() {
        let mut pos = Position::new("TBRU");
        pos.update(0, d("9"));
        assert_eq!(pos, Position::new("TBRU"));
    }

    #[test]
    fn test_account_position_created_on_access() {
        let mut account = Account::new("acc", d("100"));
        assert_eq!(account.position_quantity("TBRU"), 0);
        account.position("TBRU").update(3, d("7"));
        assert_eq!(account.position_quantity("TBRU"), 3);
    }
}
