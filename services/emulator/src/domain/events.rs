//! 撮合引擎事件
//!
//! 事件携带自有的快照副本，订阅方拿到后无需再访问订单簿

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use super::book::OrderBookSnapshot;
use super::order::{Order, Trade};

#[derive(Debug, Clone)]
pub enum EngineEvent {
    OrderBookChanged(Arc<OrderBookSnapshot>),
    TradeExecuted(Trade),
    OrderStateChanged(Order),
}

impl EngineEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::OrderBookChanged(_) => "OrderBookChanged",
            Self::TradeExecuted(_) => "TradeExecuted",
            Self::OrderStateChanged(_) => "OrderStateChanged",
        }
    }
}

/// 进程内事件总线
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 没有订阅者时事件直接丢弃
    pub fn publish(&self, event: EngineEvent) {
        let event_type = event.event_type();
        let receivers = self.sender.send(event).unwrap_or(0);
        trace!(event_type, receivers, "Engine event published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::book::OrderBook;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);

        let snapshot = Arc::new(OrderBook::new("TBRU").snapshot(10));
        bus.publish(EngineEvent::OrderBookChanged(snapshot));

        assert!(matches!(a.recv().await, Ok(EngineEvent::OrderBookChanged(_))));
        assert!(matches!(b.recv().await, Ok(EngineEvent::OrderBookChanged(_))));
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(1);
        let snapshot = Arc::new(OrderBook::new("TBRU").snapshot(1));
        bus.publish(EngineEvent::OrderBookChanged(snapshot));
    }
}
