//! 组件装配
//!
//! 由配置构建订单簿、账户、撮合与推送组件，并产出 gRPC 路由、HTTP 路由和后台任务

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use emu_bootstrap::health::ReadinessProbe;
use emu_bootstrap::reflection::build_reflection;
use emu_bootstrap::{BoxError, ShutdownController, auth_interceptor};
use emu_config::AppConfig;
use tokio::task::JoinHandle;
use tonic::service::Routes;
use tracing::info;

use crate::FILE_DESCRIPTOR_SET;
use crate::api::grpc::{
    InstrumentsServiceImpl, MarketDataServiceImpl, MarketDataStreamServiceImpl,
    OperationsServiceImpl, OrdersServiceImpl, OrdersStreamServiceImpl, UsersServiceImpl,
};
use crate::api::http::{self, AdminState};
use crate::api::proto::invest::{
    instruments_service_server::InstrumentsServiceServer,
    market_data_service_server::MarketDataServiceServer,
    market_data_stream_service_server::MarketDataStreamServiceServer,
    operations_service_server::OperationsServiceServer,
    orders_service_server::OrdersServiceServer,
    orders_stream_service_server::OrdersStreamServiceServer,
    users_service_server::UsersServiceServer,
};
use crate::application::TradingService;
use crate::domain::{AccountManager, EventBus, Instrument, InstrumentCatalog, OrderBookManager};
use crate::stream::{StreamManager, run_dispatcher, run_keepalive};

/// 就绪检查等待订单簿读锁的时长
const READINESS_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// 模拟器的全部运行时组件
pub struct Emulator {
    config: AppConfig,
    events: EventBus,
    catalog: Arc<InstrumentCatalog>,
    book: Arc<OrderBookManager>,
    accounts: Arc<AccountManager>,
    trading: Arc<TradingService>,
    streams: Arc<StreamManager>,
}

impl Emulator {
    /// 构建组件并挂上初始做市单
    pub fn new(config: AppConfig) -> Self {
        let events = EventBus::new(config.streams.event_capacity);
        let instrument = Instrument::from(&config.instrument);
        let catalog = Arc::new(InstrumentCatalog::single(instrument));

        let book = Arc::new(OrderBookManager::new(&config.instrument.uid, events.clone()));
        book.seed(&config.orderbook);

        let accounts = Arc::new(AccountManager::new(&config.account));
        let trading = Arc::new(TradingService::new(
            book.clone(),
            accounts.clone(),
            events.clone(),
        ));
        let streams = Arc::new(StreamManager::new(
            catalog.clone(),
            config.orderbook.reference_price,
            config.orderbook.snapshot_depth,
            config.streams.subscriber_capacity,
        ));

        info!(
            instrument = %config.instrument.ticker,
            uid = %config.instrument.uid,
            "Emulator initialised"
        );

        Self {
            config,
            events,
            catalog,
            book,
            accounts,
            trading,
            streams,
        }
    }

    pub fn book(&self) -> &Arc<OrderBookManager> {
        &self.book
    }

    pub fn accounts(&self) -> &Arc<AccountManager> {
        &self.accounts
    }

    pub fn trading(&self) -> &Arc<TradingService> {
        &self.trading
    }

    pub fn streams(&self) -> &Arc<StreamManager> {
        &self.streams
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// 全部 gRPC 服务，统一经过认证拦截器，外加反射服务
    pub fn grpc_routes(&self) -> Result<Routes, BoxError> {
        let reflection = build_reflection(&[FILE_DESCRIPTOR_SET])?;
        let reference_price = self.config.orderbook.reference_price;

        let routes = Routes::new(reflection)
            .add_service(InstrumentsServiceServer::with_interceptor(
                InstrumentsServiceImpl::new(self.catalog.clone()),
                auth_interceptor,
            ))
            .add_service(MarketDataServiceServer::with_interceptor(
                MarketDataServiceImpl::new(self.book.clone(), self.catalog.clone(), reference_price),
                auth_interceptor,
            ))
            .add_service(MarketDataStreamServiceServer::with_interceptor(
                MarketDataStreamServiceImpl::new(self.streams.clone(), self.book.clone()),
                auth_interceptor,
            ))
            .add_service(OrdersServiceServer::with_interceptor(
                OrdersServiceImpl::new(self.trading.clone(), self.catalog.clone()),
                auth_interceptor,
            ))
            .add_service(OrdersStreamServiceServer::with_interceptor(
                OrdersStreamServiceImpl::new(self.streams.clone()),
                auth_interceptor,
            ))
            .add_service(OperationsServiceServer::with_interceptor(
                OperationsServiceImpl::new(
                    self.accounts.clone(),
                    self.book.clone(),
                    self.catalog.clone(),
                ),
                auth_interceptor,
            ))
            .add_service(UsersServiceServer::with_interceptor(
                UsersServiceImpl::new(self.accounts.clone()),
                auth_interceptor,
            ));

        Ok(routes)
    }

    /// 管理面板路由
    pub fn http_router(&self, shutdown: ShutdownController) -> Router {
        http::router(AdminState::new(
            self.trading.clone(),
            self.catalog.clone(),
            self.events.clone(),
            shutdown,
        ))
    }

    /// 启动事件分发与保活任务
    pub fn spawn_background(&self, shutdown: ShutdownController) -> Vec<JoinHandle<()>> {
        let period = Duration::from_secs(self.config.streams.keepalive_interval_secs.max(1));
        vec![
            tokio::spawn(run_dispatcher(
                self.streams.clone(),
                self.events.subscribe(),
                shutdown.clone(),
            )),
            tokio::spawn(run_keepalive(
                self.streams.clone(),
                self.book.clone(),
                period,
                shutdown,
            )),
        ]
    }

    pub fn readiness_probes(&self) -> Vec<Arc<dyn ReadinessProbe>> {
        vec![Arc::new(BookProbe {
            book: self.book.clone(),
        })]
    }
}

/// 订单簿就绪探针
struct BookProbe {
    book: Arc<OrderBookManager>,
}

impl ReadinessProbe for BookProbe {
    fn name(&self) -> &str {
        "orderbook"
    }

    fn check(&self) -> Result<(), String> {
        self.book.readiness(READINESS_LOCK_TIMEOUT)
    }
}
