//! 账户管理器
//!
//! 模拟器只维护一个账户，只有 API 来源的一侧会改变账户

use emu_config::AccountConfig;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, info};

use super::order::{OrderDirection, OrderSource, Trade};
use super::position::Account;

pub struct AccountManager {
    account: Mutex<Account>,
    margin_multiplier_buy: Option<Decimal>,
    margin_multiplier_sell: Option<Decimal>,
}

impl AccountManager {
    pub fn new(config: &AccountConfig) -> Self {
        info!(
            account_id = %config.id,
            balance = %config.initial_balance,
            "Account initialised"
        );
        Self {
            account: Mutex::new(Account::new(config.id.as_str(), config.initial_balance)),
            margin_multiplier_buy: config.margin_multiplier_buy,
            margin_multiplier_sell: config.margin_multiplier_sell,
        }
    }

    pub fn account_id(&self) -> String {
        self.account.lock().id.clone()
    }

    /// 账户快照
    pub fn snapshot(&self) -> Account {
        self.account.lock().clone()
    }

    pub fn balance(&self) -> Decimal {
        self.account.lock().balance
    }

    pub fn position_quantity(&self, instrument_id: &str) -> i64 {
        self.account.lock().position_quantity(instrument_id)
    }

    /// 把一笔成交记入账户
    ///
    /// 主动方为 API 时按主动方向记账；被动方为 API 时按相反方向记账。
    /// 管理面板之间的成交不影响账户。
    pub fn apply_trade(&self, trade: &Trade) {
        if trade.aggressor_source == OrderSource::Api {
            self.update_state(
                &trade.instrument_id,
                trade.quantity,
                trade.price,
                trade.aggressor_direction == OrderDirection::Buy,
            );
        }
        if trade.passive_source == OrderSource::Api {
            self.update_state(
                &trade.instrument_id,
                trade.quantity,
                trade.price,
                trade.aggressor_direction.opposite() == OrderDirection::Buy,
            );
        }
    }

    /// 买入扣减现金、增加持仓；卖出相反
    pub fn update_state(&self, instrument_id: &str, quantity: i64, price: Decimal, is_buy: bool) {
        let mut account = self.account.lock();
        let amount = price * Decimal::from(quantity);
        let delta = if is_buy {
            account.balance -= amount;
            quantity
        } else {
            account.balance += amount;
            -quantity
        };
        account.position(instrument_id).update(delta, price);
        debug!(
            instrument = instrument_id,
            delta,
            %price,
            balance = %account.balance,
            "Account updated"
        );
    }

    /// 现金加持仓市值；未给出价格时按持仓均价估值
    pub fn portfolio_value(&self, current_price: Option<Decimal>) -> Decimal {
        let account = self.account.lock();
        account.positions.values().fold(account.balance, |total, p| {
            let price = current_price.unwrap_or(p.average_price);
            total + price * Decimal::from(p.quantity)
        })
    }

    /// 在给定价格下最多可买/卖的手数
    pub fn max_lots(&self, instrument_id: &str, is_buy: bool, price: Option<Decimal>) -> i64 {
        let Some(price) = price.filter(|p| !p.is_zero()) else {
            return 0;
        };
        let multiplier = if is_buy {
            self.margin_multiplier_buy
        } else {
            self.margin_multiplier_sell
        };
        let Some(multiplier) = multiplier else {
            return 0;
        };

        let value = self.portfolio_value(Some(price));
        let lots = (value * multiplier / price).floor().to_i64().unwrap_or(0).max(0);

        if is_buy {
            lots
        } else {
            lots + self.position_quantity(instrument_id).max(0)
        }
    }
}
