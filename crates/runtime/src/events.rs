//! The event bus: one-way fan-out of state-change notifications.
//!
//! The core only publishes; the transport layer subscribes and owns the
//! room semantics. Backed by a broadcast channel, so a slow or absent
//! subscriber never blocks the runtime.

use tokio::sync::broadcast;

use orc_domain::{Audience, Event};

/// An event plus the room class it is destined for.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub audience: Audience,
    pub event: Event,
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Envelope>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Publish an event. A missing subscriber is not an error.
    pub fn publish(&self, audience: Audience, event: Event) {
        let receivers = self.tx.send(Envelope { audience, event }).unwrap_or(0);
        tracing::trace!(receivers, "event published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_domain::TimerStatus;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(
            Audience::All,
            Event::TimerUpdate {
                session_code: "DEMO001".into(),
                experiment_status: TimerStatus::Running,
                time_remaining: 30,
                round_duration_minutes: 15.0,
            },
        );
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.audience, Audience::All);
        assert_eq!(envelope.event.session_code(), "DEMO001");
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(
            Audience::Researchers,
            Event::VoteUpdate {
                session_code: "X".into(),
                participant: "A1".into(),
                candidate_name: "C".into(),
                timestamp: chrono::Utc::now(),
            },
        );
    }
}
