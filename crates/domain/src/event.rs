//! Typed events the core emits for connected clients.
//!
//! The event bus is one-way: the core publishes, the transport layer owns
//! room fan-out. Each event carries the `session_code` plus enough fields to
//! let a UI patch its state without a fresh fetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::OfferType;
use crate::timer::TimerStatus;

/// Which transport room(s) an event is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Participants,
    Researchers,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    NewTradeOffer {
        session_code: String,
        sender: String,
        target: String,
        offer_type: OfferType,
        shape: String,
        quantity: u32,
        price_per_unit: i64,
        transaction_id: Uuid,
        short_id: String,
        timestamp: DateTime<Utc>,
    },
    TradeOfferResponse {
        session_code: String,
        responder: String,
        transaction_id: Uuid,
        response: String,
        timestamp: DateTime<Utc>,
    },
    TradeCompleted {
        session_code: String,
        transaction_id: Uuid,
        accepted_by: String,
        timestamp: DateTime<Utc>,
    },
    TradeOfferCancelled {
        session_code: String,
        canceller: String,
        transaction_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    NewMessage {
        session_code: String,
        sender: String,
        recipient: String,
        content: String,
        message_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    VoteUpdate {
        session_code: String,
        participant: String,
        candidate_name: String,
        timestamp: DateTime<Utc>,
    },
    TimerUpdate {
        session_code: String,
        experiment_status: TimerStatus,
        time_remaining: u64,
        round_duration_minutes: f64,
    },
}

impl Event {
    pub fn session_code(&self) -> &str {
        match self {
            Event::NewTradeOffer { session_code, .. }
            | Event::TradeOfferResponse { session_code, .. }
            | Event::TradeCompleted { session_code, .. }
            | Event::TradeOfferCancelled { session_code, .. }
            | Event::NewMessage { session_code, .. }
            | Event::VoteUpdate { session_code, .. }
            | Event::TimerUpdate { session_code, .. } => session_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_carry_a_wire_tag() {
        let event = Event::TimerUpdate {
            session_code: "DEMO001".into(),
            experiment_status: TimerStatus::Running,
            time_remaining: 120,
            round_duration_minutes: 15.0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "timer_update");
        assert_eq!(json["session_code"], "DEMO001");
        assert_eq!(event.session_code(), "DEMO001");
    }
}
