//! The shared engine interface and the per-kind private state union.

use serde::Serialize;

use orc_domain::{
    ActionError, ErrorKind, Essay, Investment, Message, Participant, ParticipantType, Result,
    RankingEntry, RankingSubmission, Session, Transaction,
};
use orc_store::FulfillOutcome;

use crate::common::PublicState;
use crate::custom::CustomState;
use crate::daytrader::TraderState;
use crate::essayranking::RankingState;
use crate::hiddenprofiles::ProfileState;
use crate::shapefactory::FactoryState;
use crate::wordguessing::{GuessOutcome, WordState};

/// A participant's private view, one variant per experiment kind.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PrivateState {
    ShapeFactory(FactoryState),
    DayTrader(TraderState),
    EssayRanking(RankingState),
    WordGuessing(WordState),
    HiddenProfiles(ProfileState),
    /// Declaratively-defined custom experiments.
    Custom(CustomState),
}

/// Accept/reject decision on a trade offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeDecision {
    Accept,
    Reject,
}

impl std::str::FromStr for TradeDecision {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "accept" => Ok(TradeDecision::Accept),
            // The plan mapper normalises "decline" before it gets here.
            "reject" => Ok(TradeDecision::Reject),
            other => Err(ActionError::new(
                ErrorKind::InvalidState,
                format!("invalid trade response '{other}': must be 'accept' or 'reject'"),
            )),
        }
    }
}

pub(crate) fn unsupported(operation: &str) -> ActionError {
    ActionError::new(
        ErrorKind::InvalidState,
        format!("{operation} is not available in this experiment"),
    )
}

/// The stable interface every engine exposes. Kind-specific operations
/// default to a typed "not available" failure so the tool surface can
/// forward any tool call without knowing the experiment kind.
pub trait GameEngine: Send + Sync {
    /// Experiment-kind description shown in public state.
    fn description(&self) -> &'static str;

    // ── Shared interface ───────────────────────────────────────────

    fn create_session(&self, researcher_id: &str, config: serde_json::Value) -> Result<Session>;

    fn add_participant(
        &self,
        session_code: &str,
        participant_code: &str,
        kind: ParticipantType,
    ) -> Result<Participant>;

    fn get_participant_state(
        &self,
        participant_code: &str,
        session_code: &str,
    ) -> Result<PrivateState>;

    fn get_public_state(&self, session_code: &str) -> Result<PublicState>;

    fn send_message(
        &self,
        participant_code: &str,
        recipient: &str,
        content: &str,
        session_code: &str,
    ) -> Result<Message>;

    fn start_session(&self, session_code: &str) -> Result<()>;

    fn end_session(&self, session_code: &str) -> Result<()>;

    // ── ShapeFactory ───────────────────────────────────────────────

    fn produce_shape(
        &self,
        _participant_code: &str,
        _shape: &str,
        _quantity: u32,
        _session_code: &str,
    ) -> Result<orc_domain::ProductionEntry> {
        Err(unsupported("produce_shape"))
    }

    /// Promote finished productions into inventories. A no-op (zero) for
    /// engines without production.
    fn process_completed_productions(&self) -> Result<usize> {
        Ok(0)
    }

    /// Explicitly start the next queued production.
    fn start_next_production(
        &self,
        _participant_code: &str,
        _session_code: &str,
    ) -> Result<Option<orc_domain::ProductionEntry>> {
        Err(unsupported("start_next_production"))
    }

    fn create_trade_offer(
        &self,
        _participant_code: &str,
        _recipient: &str,
        _offer_type: orc_domain::OfferType,
        _shape: &str,
        _price_per_unit: i64,
        _session_code: &str,
    ) -> Result<Transaction> {
        Err(unsupported("create_trade_offer"))
    }

    fn respond_to_trade_offer(
        &self,
        _participant_code: &str,
        _transaction_id: &str,
        _decision: TradeDecision,
        _session_code: &str,
    ) -> Result<Transaction> {
        Err(unsupported("respond_to_trade_offer"))
    }

    fn cancel_trade_offer(
        &self,
        _participant_code: &str,
        _transaction_id: &str,
        _session_code: &str,
    ) -> Result<Transaction> {
        Err(unsupported("cancel_trade_offer"))
    }

    fn fulfill_orders(
        &self,
        _participant_code: &str,
        _order_indices: &[usize],
        _session_code: &str,
    ) -> Result<FulfillOutcome> {
        Err(unsupported("fulfill_orders"))
    }

    // ── DayTrader ──────────────────────────────────────────────────

    fn make_investment(
        &self,
        _participant_code: &str,
        _invest_price: f64,
        _decision_type: orc_domain::InvestmentKind,
        _session_code: &str,
    ) -> Result<Investment> {
        Err(unsupported("make_investment"))
    }

    fn get_investment_history(
        &self,
        _participant_code: &str,
        _session_code: &str,
    ) -> Result<Vec<Investment>> {
        Err(unsupported("get_investment_history"))
    }

    // ── EssayRanking ───────────────────────────────────────────────

    fn submit_ranking(
        &self,
        _participant_code: &str,
        _rankings: Vec<RankingEntry>,
        _session_code: &str,
    ) -> Result<RankingSubmission> {
        Err(unsupported("submit_ranking"))
    }

    fn get_assigned_essays(
        &self,
        _participant_code: &str,
        _session_code: &str,
    ) -> Result<Vec<Essay>> {
        Err(unsupported("get_assigned_essays"))
    }

    fn get_essay_content(
        &self,
        _participant_code: &str,
        _essay_id: &str,
        _session_code: &str,
    ) -> Result<Essay> {
        Err(unsupported("get_essay_content"))
    }

    // ── WordGuessing ───────────────────────────────────────────────

    fn get_assigned_words(
        &self,
        _participant_code: &str,
        _session_code: &str,
    ) -> Result<Vec<String>> {
        Err(unsupported("get_assigned_words"))
    }

    fn submit_guess(
        &self,
        _participant_code: &str,
        _guess_text: &str,
        _session_code: &str,
    ) -> Result<GuessOutcome> {
        Err(unsupported("submit_guess"))
    }

    // ── HiddenProfiles ─────────────────────────────────────────────

    fn submit_vote(
        &self,
        _participant_code: &str,
        _candidate_name: &str,
        _session_code: &str,
    ) -> Result<String> {
        Err(unsupported("submit_vote"))
    }

    // ── Declarative custom experiments ─────────────────────────────

    /// Run one of the actions a custom experiment declared.
    fn perform_action(
        &self,
        _participant_code: &str,
        _action_name: &str,
        _inputs: &serde_json::Value,
        _session_code: &str,
    ) -> Result<serde_json::Value> {
        Err(unsupported("perform_action"))
    }

    /// Whether the HiddenProfiles reading phase is complete. Engines
    /// without a reading phase report `false`.
    fn reading_phase_complete(&self, _session_code: &str) -> bool {
        false
    }
}
