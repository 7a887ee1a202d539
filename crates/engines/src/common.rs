//! View derivation shared by every engine: the public state block, the
//! awareness-gated participant list, the timer block, and the common
//! session/messaging plumbing.

use std::sync::Arc;

use serde::Serialize;

use orc_domain::{
    CommunicationLevel, ExperimentType, LoginStatus, Message, Participant, ParticipantType,
    Result, Session, SessionConfig, SessionStatus, TimerStatus,
};
use orc_store::{Store, TimerBoard};

/// Timer block in public state. Sourced from the timer board when a ticker
/// owns the session, else derived idle from config.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerInfo {
    pub time_remaining: u64,
    pub experiment_status: TimerStatus,
    pub round_duration_minutes: f64,
}

/// One row of the public participant list. The awareness-gated extras are
/// only present when the session enables the awareness dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct PublicParticipant {
    pub participant_code: String,
    pub kind: ParticipantType,
    pub login_status: LoginStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub money: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orders_completed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_orders: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialty_production_used: Option<u32>,
}

/// The shared public view every engine returns.
#[derive(Debug, Clone, Serialize)]
pub struct PublicState {
    pub session_status: SessionStatus,
    pub experiment_type: ExperimentType,
    pub experiment_config: SessionConfig,
    pub communication_level: CommunicationLevel,
    pub participants: Vec<PublicParticipant>,
    pub timer: TimerInfo,
    pub description: String,
}

/// Shared store/timer handles threaded into every engine.
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<Store>,
    pub timers: Arc<TimerBoard>,
}

impl EngineContext {
    pub fn new(store: Arc<Store>, timers: Arc<TimerBoard>) -> Self {
        Self { store, timers }
    }

    pub fn timer_info(&self, session: &Session) -> TimerInfo {
        match self.timers.get(&session.session_code) {
            Some(state) => TimerInfo {
                time_remaining: state.time_remaining,
                experiment_status: state.experiment_status,
                round_duration_minutes: state.round_duration_minutes,
            },
            None => TimerInfo {
                time_remaining: (session.config.round_duration * 60.0).round().max(0.0) as u64,
                experiment_status: TimerStatus::Idle,
                round_duration_minutes: session.config.round_duration,
            },
        }
    }

    /// The participant list with extras gated by `awarenessDashboard`.
    pub fn public_participants(&self, session: &Session) -> Result<Vec<PublicParticipant>> {
        let aware = session.config.awareness_dashboard;
        let list = self.store.list_participants(&session.session_code)?;
        Ok(list
            .into_iter()
            .map(|p| {
                let total_orders = p.orders_completed + p.orders.len() as u32;
                PublicParticipant {
                    participant_code: p.participant_code,
                    kind: p.kind,
                    login_status: p.login_status,
                    money: aware.then_some(p.money),
                    orders_completed: aware.then_some(p.orders_completed),
                    total_orders: aware.then_some(total_orders),
                    specialty_production_used: aware.then_some(p.specialty_production_used),
                }
            })
            .collect())
    }

    pub fn public_state(&self, session: &Session, description: &str) -> Result<PublicState> {
        Ok(PublicState {
            session_status: session.status,
            experiment_type: session.experiment_type.clone(),
            communication_level: session
                .config
                .communication_level
                .effective(&session.experiment_type),
            participants: self.public_participants(session)?,
            timer: self.timer_info(session),
            description: description.to_owned(),
            experiment_config: session.config.clone(),
        })
    }

    /// Common send-message path: resolve the recipient (`all` broadcasts)
    /// and insert the row. Communication-level policy is enforced upstream
    /// at the tool surface.
    pub fn send_message(
        &self,
        participant_code: &str,
        recipient: &str,
        content: &str,
        session_code: &str,
    ) -> Result<Message> {
        let sender = self.store.get_participant(session_code, participant_code)?;
        let recipient_id = if recipient == "all" {
            None
        } else {
            Some(self.store.resolve_recipient(session_code, recipient)?)
        };
        self.store
            .insert_message(session_code, sender.participant_id, recipient_id, content)
    }

    /// Mark the session active and arm its timer board entry.
    pub fn start_session(&self, session_code: &str) -> Result<()> {
        let session = self.store.get_session(session_code)?;
        self.store
            .set_session_status(session_code, SessionStatus::Active)?;
        self.timers
            .start(session_code, session.config.round_duration);
        tracing::info!(session_code = %session_code, "session started");
        Ok(())
    }

    /// Mark the session completed and zero out the timer.
    pub fn end_session(&self, session_code: &str) -> Result<()> {
        self.store
            .set_session_status(session_code, SessionStatus::Completed)?;
        self.timers.complete(session_code);
        tracing::info!(session_code = %session_code, "session ended");
        Ok(())
    }

    pub fn participant(&self, session_code: &str, participant_code: &str) -> Result<Participant> {
        self.store.get_participant(session_code, participant_code)
    }
}
