//! 管理面板 HTTP / WebSocket

mod admin;
pub mod dto;
mod error;
mod ws;

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use axum::{Router, routing::get};
use emu_bootstrap::ShutdownController;

use crate::application::TradingService;
use crate::domain::{EventBus, InstrumentCatalog};

pub use admin::ADMIN_ACCOUNT;
pub use error::{ApiError, ApiResult};

/// 管理面板共享状态
#[derive(Clone)]
pub struct AdminState {
    pub trading: Arc<TradingService>,
    pub catalog: Arc<InstrumentCatalog>,
    pub events: EventBus,
    pub shutdown: ShutdownController,
    ws_sessions: Arc<AtomicUsize>,
}

impl AdminState {
    pub fn new(
        trading: Arc<TradingService>,
        catalog: Arc<InstrumentCatalog>,
        events: EventBus,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            trading,
            catalog,
            events,
            shutdown,
            ws_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// `/api/*` 与 `/ws/orderbook`
pub fn router(state: AdminState) -> Router {
    admin::admin_routes()
        .route("/ws/orderbook", get(ws::order_book_ws))
        .with_state(state)
}
