//! 管理面板 REST 接口测试

use axum::Router;
use axum::body::{Body, to_bytes};
use broker_emulator::Emulator;
use emu_bootstrap::ShutdownController;
use emu_config::AppConfig;
use http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

fn emulator() -> (Emulator, Router) {
    let emulator = Emulator::new(AppConfig::default());
    let router = emulator.http_router(ShutdownController::new());
    (emulator, router)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_order_book_shows_seeded_levels() {
    let (_emulator, app) = emulator();

    let (status, book) = call(&app, Method::GET, "/api/orderbook", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(book["instrumentId"], "e8acd2fb-6de6-4ea4-9bfb-0daad9b2ed7b");
    assert_eq!(book["depth"], 20);
    assert_eq!(
        book["bids"][0],
        json!({"price": 7.69, "quantity": 1000, "ordersCount": 1, "apiQuantity": 0})
    );
    assert_eq!(book["asks"][0]["price"], 7.71);
    assert!(book["timestamp"].is_string());
}

#[tokio::test]
async fn test_admin_orders_trade_without_touching_account() {
    let (emulator, app) = emulator();

    let (status, order) = call(
        &app,
        Method::POST,
        "/api/orders",
        Some(json!({"direction": "SELL", "orderType": "LIMIT", "price": 7.69, "quantity": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "FILLED");
    assert_eq!(order["filledQuantity"], 10);
    assert_eq!(order["accountId"], "admin-market-maker");
    assert_eq!(order["source"], "ADMIN_PANEL");

    let (_, book) = call(&app, Method::GET, "/api/orderbook", None).await;
    assert_eq!(book["bids"][0]["quantity"], 990);

    let (_, account) = call(&app, Method::GET, "/api/account", None).await;
    assert_eq!(account["id"], "emulator-account");
    assert_eq!(account["balance"], 200000.0);
    assert_eq!(account["positions"], json!({}));
    assert_eq!(emulator.accounts().balance(), rust_decimal::Decimal::new(200_000, 0));
}

#[tokio::test]
async fn test_admin_order_hitting_bot_order_updates_account() {
    let (emulator, app) = emulator();
    let uid = emulator.book().instrument_id();

    // 机器人挂一个更高的买单
    let bot_order = broker_emulator::domain::Order::new(
        uid.as_str(),
        "emulator-account",
        broker_emulator::domain::OrderDirection::Buy,
        broker_emulator::domain::OrderType::Limit,
        rust_decimal::Decimal::new(770, 2),
        5,
        broker_emulator::domain::OrderSource::Api,
    );
    emulator.trading().submit(bot_order).unwrap();

    let (status, order) = call(
        &app,
        Method::POST,
        "/api/orders",
        Some(json!({"direction": "SELL", "orderType": "MARKET", "quantity": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "FILLED");

    let (_, account) = call(&app, Method::GET, "/api/account", None).await;
    // 200000 - 5 * 7.70
    assert_eq!(account["balance"], 199961.5);
    assert_eq!(account["positions"][uid.as_str()]["quantity"], 5);
    assert_eq!(account["positions"][uid.as_str()]["averagePrice"], 7.7);
}

#[tokio::test]
async fn test_list_and_cancel_orders() {
    let (_emulator, app) = emulator();

    let (_, created) = call(
        &app,
        Method::POST,
        "/api/orders",
        Some(json!({"direction": "BUY", "orderType": "LIMIT", "price": 7.6, "quantity": 3})),
    )
    .await;
    assert_eq!(created["status"], "NEW");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, orders) = call(&app, Method::GET, "/api/orders", None).await;
    assert_eq!(status, StatusCode::OK);
    let orders = orders.as_array().unwrap();
    assert_eq!(orders.len(), 3);
    let ids: Vec<&str> = orders.iter().map(|o| o["id"].as_str().unwrap()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);

    let uri = format!("/api/orders/{id}");
    let (status, cancelled) = call(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "CANCELLED");

    let (status, problem) = call(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(problem["status"], 404);

    let (status, _) = call(&app, Method::DELETE, "/api/orders/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_orders_are_rejected_with_problem_details() {
    let (_emulator, app) = emulator();

    let (status, problem) = call(
        &app,
        Method::POST,
        "/api/orders",
        Some(json!({"direction": "BUY", "orderType": "LIMIT", "price": 7.6, "quantity": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(problem["title"], "Validation Error");

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/orders",
        Some(json!({"direction": "BUY", "orderType": "LIMIT", "quantity": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/orders",
        Some(json!({
            "instrumentId": "UNKNOWN",
            "direction": "BUY",
            "orderType": "MARKET",
            "quantity": 1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_clear_order_book() {
    let (emulator, app) = emulator();

    let (status, body) = call(&app, Method::DELETE, "/api/orderbook", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 2);
    assert!(emulator.book().all_orders().is_empty());

    let (_, book) = call(&app, Method::GET, "/api/orderbook", None).await;
    assert_eq!(book["bids"], json!([]));
    assert_eq!(book["asks"], json!([]));
}
