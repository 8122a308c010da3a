//! 盘口 WebSocket 推送
//!
//! 连接建立后先推送当前盘口，之后每次盘口变化推送一次

use std::sync::atomic::Ordering;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use emu_bootstrap::metrics::{record_events_lagged, set_stream_subscribers};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::AdminState;
use super::dto::{OrderBookDto, WS_BOOK_DEPTH, WsEnvelope};
use crate::domain::{EngineEvent, OrderBookSnapshot};

pub async fn order_book_ws(
    ws: WebSocketUpgrade,
    State(state): State<AdminState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

fn encode(snapshot: &OrderBookSnapshot) -> Option<String> {
    let envelope = WsEnvelope::order_book(OrderBookDto::from_snapshot(snapshot, WS_BOOK_DEPTH));
    match serde_json::to_string(&envelope) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(error = %e, "Failed to encode order book for websocket");
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AdminState) {
    let (mut sender, mut receiver) = socket.split();

    // 先订阅再取快照，避免漏掉中间的变化
    let mut rx = state.events.subscribe();
    let initial = state.trading.book().snapshot(WS_BOOK_DEPTH);

    let sessions = state.ws_sessions.fetch_add(1, Ordering::SeqCst) + 1;
    set_stream_subscribers("websocket", sessions);
    info!(sessions, "WebSocket client connected");

    let mut send_task = tokio::spawn(async move {
        if let Some(text) = encode(&initial) {
            if sender.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
        loop {
            match rx.recv().await {
                Ok(EngineEvent::OrderBookChanged(snapshot)) => {
                    let Some(text) = encode(&snapshot) else {
                        continue;
                    };
                    if let Err(e) = sender.send(Message::Text(text.into())).await {
                        debug!(error = %e, "Failed to send message to websocket");
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket forwarder lagged behind event bus");
                    record_events_lagged("websocket", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // 客户端消息只关心 Close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    let stopped = state.shutdown.wait();
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
        _ = stopped => {
            send_task.abort();
            recv_task.abort();
        }
    };

    let sessions = state.ws_sessions.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
    set_stream_subscribers("websocket", sessions);
    info!(sessions, "WebSocket disconnected");
}
