//! 可交易标的

use emu_config::InstrumentConfig;
use rust_decimal::Decimal;

/// 标的元数据；订单簿与账户都以 `uid` 作为标的标识
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub uid: String,
    pub ticker: String,
    pub figi: String,
    pub class_code: String,
    pub name: String,
    pub lot: i32,
    pub min_price_increment: Decimal,
    pub currency: String,
}

impl Instrument {
    /// 按 ticker、figi 或 uid 匹配（不区分大小写）
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim();
        !query.is_empty()
            && [&self.uid, &self.ticker, &self.figi]
                .iter()
                .any(|id| id.eq_ignore_ascii_case(query))
    }
}

impl From<&InstrumentConfig> for Instrument {
    fn from(config: &InstrumentConfig) -> Self {
        Self {
            uid: config.uid.clone(),
            ticker: config.ticker.clone(),
            figi: config.figi.clone(),
            class_code: config.class_code.clone(),
            name: config.name.clone(),
            lot: config.lot,
            min_price_increment: config.min_price_increment,
            currency: config.currency.clone(),
        }
    }
}

/// 标的目录
#[derive(Debug, Clone)]
pub struct InstrumentCatalog {
    instruments: Vec<Instrument>,
}

impl InstrumentCatalog {
    pub fn single(instrument: Instrument) -> Self {
        Self {
            instruments: vec![instrument],
        }
    }

    pub fn resolve(&self, query: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.matches(query))
    }

    /// 目录中的主标的
    pub fn primary(&self) -> &Instrument {
        &self.instruments[0]
    }
}
