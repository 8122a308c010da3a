//! 管理面板 REST 接口
//!
//! 运营人员通过这些接口查看盘口、挂做市单、撤单和查看账户

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get},
};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use super::AdminState;
use super::dto::{
    ADMIN_BOOK_DEPTH, AccountDto, ClearBookResponse, CreateOrderRequest, OrderBookDto, OrderDto,
};
use super::error::ApiResult;
use crate::domain::{Order, OrderSource};
use crate::error::EmulatorError;

/// 管理面板订单的默认账户
pub const ADMIN_ACCOUNT: &str = "admin-market-maker";

pub fn admin_routes() -> Router<AdminState> {
    Router::new()
        .route("/api/orderbook", get(get_order_book).delete(clear_order_book))
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/{id}", delete(cancel_order))
        .route("/api/account", get(get_account))
}

async fn get_order_book(State(state): State<AdminState>) -> Json<OrderBookDto> {
    let snapshot = state.trading.book().snapshot(ADMIN_BOOK_DEPTH);
    Json(OrderBookDto::from_snapshot(&snapshot, ADMIN_BOOK_DEPTH))
}

async fn clear_order_book(State(state): State<AdminState>) -> Json<ClearBookResponse> {
    let removed = state.trading.book().clear().len();
    info!(removed, "Order book cleared from admin panel");
    Json(ClearBookResponse { removed })
}

async fn list_orders(State(state): State<AdminState>) -> Json<Vec<OrderDto>> {
    let mut orders: Vec<OrderDto> = state
        .trading
        .book()
        .all_orders()
        .iter()
        .map(OrderDto::from)
        .collect();
    orders.sort_by(|a, b| a.id.cmp(&b.id));
    Json(orders)
}

async fn create_order(
    State(state): State<AdminState>,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<Json<OrderDto>> {
    let instrument_id = match request.instrument_id.as_deref() {
        Some(query) => state
            .catalog
            .resolve(query)
            .map(|i| i.uid.clone())
            .ok_or_else(|| EmulatorError::InstrumentNotFound(query.to_string()))?,
        None => state.catalog.primary().uid.clone(),
    };
    let account_id = request
        .account_id
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| ADMIN_ACCOUNT.to_string());

    let order = Order::new(
        instrument_id,
        account_id,
        request.direction,
        request.order_type,
        request.price.unwrap_or(Decimal::ZERO),
        request.quantity,
        OrderSource::AdminPanel,
    );
    let execution = state.trading.submit(order)?;
    Ok(Json(OrderDto::from(&execution.order)))
}

async fn cancel_order(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> ApiResult<Json<OrderDto>> {
    let order_id = Uuid::parse_str(&id).map_err(|_| EmulatorError::InvalidOrderId(id.clone()))?;
    let order = state.trading.cancel(&order_id, None)?;
    Ok(Json(OrderDto::from(&order)))
}

async fn get_account(State(state): State<AdminState>) -> Json<AccountDto> {
    Json(AccountDto::from(&state.trading.accounts().snapshot()))
}
