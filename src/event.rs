//! Typed push events and the bounded channel they are delivered over.

use once_cell::sync::Lazy;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::frame::EventName;

/// A single push event delivered to a `GatewayClient` subscriber.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub name: EventName,
    pub payload: Value,
}

/// Capacity of the event channel. Sized generously for bursts of `agentOutput` chunks without
/// requiring callers to tune it for the common case; overridable via
/// `GATEWAY_CLIENT_EVENT_CHANNEL_CAPACITY` for operators running against chattier bots.
pub static DEFAULT_EVENT_CHANNEL_CAPACITY: Lazy<usize> = Lazy::new(|| {
    std::env::var("GATEWAY_CLIENT_EVENT_CHANNEL_CAPACITY")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(256)
});

pub type EventSender = mpsc::Sender<GatewayEvent>;
pub type EventReceiver = mpsc::Receiver<GatewayEvent>;

#[must_use]
pub fn channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity)
}

/// Delivers `event` per its backpressure policy: `Keepalive` is best-effort (dropped on a full
/// channel), every other event blocks the caller until there is room.
pub async fn deliver(sender: &EventSender, event: GatewayEvent) {
    if event.name == EventName::Keepalive {
        if sender.try_send(event).is_err() {
            tracing::trace!("event: dropped keepalive, channel full");
        }
        return;
    }
    if sender.send(event).await.is_err() {
        tracing::trace!("event: receiver dropped, discarding event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn keepalive_is_dropped_when_channel_is_full() {
        let (tx, mut rx) = channel(1);
        deliver(
            &tx,
            GatewayEvent {
                name: EventName::Keepalive,
                payload: json!(1),
            },
        )
        .await;
        deliver(
            &tx,
            GatewayEvent {
                name: EventName::Keepalive,
                payload: json!(2),
            },
        )
        .await;
        let first = rx.recv().await.unwrap();
        assert_eq!(first.payload, json!(1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn agent_output_is_delivered() {
        let (tx, mut rx) = channel(4);
        deliver(
            &tx,
            GatewayEvent {
                name: EventName::AgentOutput,
                payload: json!({"chunk": "hi"}),
            },
        )
        .await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, EventName::AgentOutput);
    }
}
