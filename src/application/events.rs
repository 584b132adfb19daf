//! Event bus.
//!
//! Executor and tracker publish; the dashboard WebSocket fan-out subscribes.
//! Keeping the bus as the only link between the trading pipeline and the web
//! layer avoids callback cycles across layers. Slow subscribers lag and miss
//! events rather than backpressure the publishers.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::domain::entities::stream::PositionStateUpdate;
use crate::persistence::models::Position;

/// Payload of a `position_update` frame: either a persisted row (open/close)
/// or a live state snapshot from the exchange's account update.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PositionFrame {
    Row(Position),
    State(PositionStateUpdate),
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderNotice {
    pub exchange_order_id: i64,
    pub symbol: String,
    pub status: String,
    pub purpose: Option<String>,
    pub executed_qty: f64,
    pub avg_price: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalNotice {
    pub symbol: String,
    pub position_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalErrorNotice {
    pub symbol: String,
    pub error: String,
}

/// One dashboard frame; serializes as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    PositionUpdate(PositionFrame),
    OrderUpdate(OrderNotice),
    SignalExecuted(SignalNotice),
    SignalError(SignalErrorNotice),
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishing never fails; with no subscribers the event is dropped.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_serialize_with_type_and_data() {
        let event = Event::SignalError(SignalErrorNotice {
            symbol: "BTCUSDT".into(),
            error: "entry order failed".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "signal_error");
        assert_eq!(json["data"]["symbol"], "BTCUSDT");
    }

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(Event::SignalExecuted(SignalNotice {
            symbol: "ETHUSDT".into(),
            position_id: 7,
        }));
        match rx.recv().await.unwrap() {
            Event::SignalExecuted(notice) => assert_eq!(notice.position_id, 7),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        EventBus::new(1).publish(Event::SignalExecuted(SignalNotice {
            symbol: "BTCUSDT".into(),
            position_id: 1,
        }));
    }
}
