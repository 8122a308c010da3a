//! emu-config - 配置加载库

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_grpc_port() -> u16 {
    9090
}

fn default_http_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            grpc_port: default_grpc_port(),
            http_port: default_http_port(),
        }
    }
}

impl ServerConfig {
    pub fn grpc_addr(&self) -> String {
        format!("{}:{}", self.host, self.grpc_port)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

/// 遥测配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// 是否写入会话日志文件
    #[serde(default)]
    pub file_logging: bool,
    /// 保留的会话日志文件数量
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_max_log_files() -> usize {
    50
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            file_logging: false,
            max_log_files: default_max_log_files(),
        }
    }
}

/// 交易标的配置 (模拟器只撮合一个标的)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    #[serde(default = "default_ticker")]
    pub ticker: String,
    #[serde(default = "default_uid")]
    pub uid: String,
    #[serde(default = "default_figi")]
    pub figi: String,
    #[serde(default = "default_lot")]
    pub lot: i32,
    #[serde(default = "default_min_price_increment")]
    pub min_price_increment: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_class_code")]
    pub class_code: String,
    #[serde(default = "default_instrument_name")]
    pub name: String,
}

fn default_ticker() -> String {
    "TBRU".to_string()
}

fn default_uid() -> String {
    "e8acd2fb-6de6-4ea4-9bfb-0daad9b2ed7b".to_string()
}

fn default_figi() -> String {
    "TCS60A1039N1".to_string()
}

fn default_lot() -> i32 {
    1
}

fn default_min_price_increment() -> Decimal {
    Decimal::new(1, 2)
}

fn default_currency() -> String {
    "rub".to_string()
}

fn default_class_code() -> String {
    "TQBR".to_string()
}

fn default_instrument_name() -> String {
    "Tinkoff Broker Emulator Instrument".to_string()
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            ticker: default_ticker(),
            uid: default_uid(),
            figi: default_figi(),
            lot: default_lot(),
            min_price_increment: default_min_price_increment(),
            currency: default_currency(),
            class_code: default_class_code(),
            name: default_instrument_name(),
        }
    }
}

/// 初始盘口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookConfig {
    /// 为空时不挂初始做市单
    #[serde(default = "default_initial_bid")]
    pub initial_bid: Option<Decimal>,
    #[serde(default = "default_initial_ask")]
    pub initial_ask: Option<Decimal>,
    #[serde(default = "default_initial_volume")]
    pub initial_volume: i64,
    /// 盘口单边为空时用于计算涨跌停价
    #[serde(default = "default_reference_price")]
    pub reference_price: Decimal,
    #[serde(default = "default_snapshot_depth")]
    pub snapshot_depth: usize,
}

fn default_initial_bid() -> Option<Decimal> {
    Some(Decimal::new(769, 2))
}

fn default_initial_ask() -> Option<Decimal> {
    Some(Decimal::new(771, 2))
}

fn default_initial_volume() -> i64 {
    1000
}

fn default_reference_price() -> Decimal {
    Decimal::new(770, 2)
}

fn default_snapshot_depth() -> usize {
    50
}

impl Default for OrderBookConfig {
    fn default() -> Self {
        Self {
            initial_bid: default_initial_bid(),
            initial_ask: default_initial_ask(),
            initial_volume: default_initial_volume(),
            reference_price: default_reference_price(),
            snapshot_depth: default_snapshot_depth(),
        }
    }
}

/// 模拟账户配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default = "default_account_id")]
    pub id: String,
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,
    #[serde(default = "default_margin_multiplier")]
    pub margin_multiplier_buy: Option<Decimal>,
    #[serde(default = "default_margin_multiplier")]
    pub margin_multiplier_sell: Option<Decimal>,
}

fn default_account_id() -> String {
    "emulator-account".to_string()
}

fn default_initial_balance() -> Decimal {
    Decimal::new(200_000, 0)
}

fn default_margin_multiplier() -> Option<Decimal> {
    Some(Decimal::ONE)
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            id: default_account_id(),
            initial_balance: default_initial_balance(),
            margin_multiplier_buy: default_margin_multiplier(),
            margin_multiplier_sell: default_margin_multiplier(),
        }
    }
}

/// 流推送配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamsConfig {
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

fn default_keepalive_interval_secs() -> u64 {
    5
}

fn default_event_capacity() -> usize {
    1024
}

fn default_subscriber_capacity() -> usize {
    256
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_secs: default_keepalive_interval_secs(),
            event_capacity: default_event_capacity(),
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub orderbook: OrderBookConfig,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub streams: StreamsConfig,
}

fn default_app_name() -> String {
    "broker-emulator".to_string()
}

fn default_app_env() -> String {
    "development".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            app_env: default_app_env(),
            server: ServerConfig::default(),
            telemetry: TelemetryConfig::default(),
            instrument: InstrumentConfig::default(),
            orderbook: OrderBookConfig::default(),
            account: AccountConfig::default(),
            streams: StreamsConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 优先级: 环境变量 (EMULATOR_ 前缀, `__` 分隔层级) > `<APP_ENV>.toml` > `default.toml` > 内置默认值
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| default_app_env());

        let config: Self = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("EMULATOR_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// 校验跨字段约束
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instrument.lot <= 0 {
            return Err(ConfigError::Invalid("instrument.lot must be positive".into()));
        }
        if self.orderbook.initial_volume <= 0 {
            return Err(ConfigError::Invalid(
                "orderbook.initial_volume must be positive".into(),
            ));
        }
        if let (Some(bid), Some(ask)) = (self.orderbook.initial_bid, self.orderbook.initial_ask) {
            if bid >= ask {
                return Err(ConfigError::Invalid(format!(
                    "orderbook.initial_bid {} must be below initial_ask {}",
                    bid, ask
                )));
            }
        }
        if self.streams.event_capacity == 0 || self.streams.subscriber_capacity == 0 {
            return Err(ConfigError::Invalid("stream capacities must be positive".into()));
        }
        Ok(())
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}
