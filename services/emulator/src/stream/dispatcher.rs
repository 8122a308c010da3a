//! 事件分发与保活任务

use std::sync::Arc;
use std::time::Duration;

use emu_bootstrap::ShutdownController;
use emu_bootstrap::metrics::record_events_lagged;
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tracing::{debug, info, trace, warn};

use super::manager::StreamManager;
use crate::domain::orderbook::EVENT_SNAPSHOT_DEPTH;
use crate::domain::{EngineEvent, OrderBookManager};

/// 把引擎事件转发给 gRPC 流，直到总线关闭或收到关闭信号
pub async fn run_dispatcher(
    streams: Arc<StreamManager>,
    mut events: Receiver<EngineEvent>,
    shutdown: ShutdownController,
) {
    info!("Stream dispatcher started");
    let stopped = shutdown.wait();
    tokio::pin!(stopped);

    loop {
        tokio::select! {
            _ = &mut stopped => break,
            received = events.recv() => match received {
                Ok(event) => dispatch(&streams, &event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Stream dispatcher lagged behind event bus");
                    record_events_lagged("stream_dispatcher", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    info!("Stream dispatcher stopped");
}

fn dispatch(streams: &StreamManager, event: &EngineEvent) {
    match event {
        EngineEvent::OrderBookChanged(snapshot) => {
            let delivered = streams.broadcast_order_book(snapshot);
            trace!(delivered, "Order book pushed to streams");
        }
        EngineEvent::OrderStateChanged(order) => {
            let delivered = streams.broadcast_order_state(order);
            trace!(order_id = %order.id, delivered, "Order state pushed to streams");
        }
        EngineEvent::TradeExecuted(trade) => {
            debug!(
                trade_id = %trade.id,
                price = %trade.price,
                quantity = trade.quantity,
                "Trade executed"
            );
        }
    }
}

/// 定期重推当前盘口，避免客户端因长时间无消息断开
pub async fn run_keepalive(
    streams: Arc<StreamManager>,
    book: Arc<OrderBookManager>,
    period: Duration,
    shutdown: ShutdownController,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // 第一次 tick 立即完成
    ticker.tick().await;

    let stopped = shutdown.wait();
    tokio::pin!(stopped);

    loop {
        tokio::select! {
            _ = &mut stopped => break,
            _ = ticker.tick() => {
                if streams.order_book_subscriber_count() == 0 {
                    continue;
                }
                let snapshot = book.snapshot(EVENT_SNAPSHOT_DEPTH);
                let delivered = streams.broadcast_order_book(&snapshot);
                trace!(delivered, "Keep-alive order book sent");
            }
        }
    }
    info!("Stream keep-alive stopped");
}
