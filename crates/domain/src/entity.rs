//! Session-scoped entities and their status vocabularies.
//!
//! Everything here is a plain data row; lifecycle rules live in the store
//! and the game engines. All entities except [`Session`] carry the owning
//! `session_code` so cross-session access can be rejected at the store
//! boundary.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::{ActionError, ErrorKind};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Experiment kinds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The experiment kind a session runs. Researcher-defined kinds use the
/// `custom_` prefix and are served by the declarative custom engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ExperimentType {
    ShapeFactory,
    DayTrader,
    EssayRanking,
    WordGuessing,
    HiddenProfiles,
    Custom(String),
}

impl ExperimentType {
    pub fn as_str(&self) -> &str {
        match self {
            ExperimentType::ShapeFactory => "shapefactory",
            ExperimentType::DayTrader => "daytrader",
            ExperimentType::EssayRanking => "essayranking",
            ExperimentType::WordGuessing => "wordguessing",
            ExperimentType::HiddenProfiles => "hiddenprofiles",
            ExperimentType::Custom(name) => name.as_str(),
        }
    }
}

impl std::fmt::Display for ExperimentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ExperimentType> for String {
    fn from(value: ExperimentType) -> Self {
        value.as_str().to_owned()
    }
}

impl TryFrom<String> for ExperimentType {
    type Error = ActionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.as_str().parse()
    }
}

impl std::str::FromStr for ExperimentType {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shapefactory" => Ok(ExperimentType::ShapeFactory),
            "daytrader" => Ok(ExperimentType::DayTrader),
            "essayranking" => Ok(ExperimentType::EssayRanking),
            "wordguessing" => Ok(ExperimentType::WordGuessing),
            "hiddenprofiles" => Ok(ExperimentType::HiddenProfiles),
            other if other.starts_with("custom_") => Ok(ExperimentType::Custom(other.to_owned())),
            other => Err(ActionError::new(
                ErrorKind::InvalidState,
                format!("invalid experiment type '{other}'"),
            )),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Status vocabularies
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "setup_complete")]
    SetupComplete,
    #[serde(rename = "session_active")]
    Active,
    #[serde(rename = "session_paused")]
    Paused,
    #[serde(rename = "session_completed")]
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::SetupComplete => "setup_complete",
            SessionStatus::Active => "session_active",
            SessionStatus::Paused => "session_paused",
            SessionStatus::Completed => "session_completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantType {
    Human,
    AiAgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStatus {
    NotLoggedIn,
    LoggedIn,
    Active,
    Disconnected,
}

/// Scheduling class for agents: active agents tick on a jittered interval,
/// passive agents run only on external triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Initiative {
    Active,
    Passive,
}

impl Default for Initiative {
    fn default() -> Self {
        Initiative::Active
    }
}

/// Session-wide messaging policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationLevel {
    /// Direct messages only; broadcast is rejected.
    Chat,
    /// Every message is forced to `all`.
    Broadcast,
    /// Messaging is disabled.
    NoChat,
    /// HiddenProfiles alias for broadcast-style group discussion.
    GroupChat,
}

impl CommunicationLevel {
    /// Collapse aliases: `group_chat` behaves as `broadcast` for
    /// HiddenProfiles sessions.
    pub fn effective(&self, experiment_type: &ExperimentType) -> CommunicationLevel {
        match (self, experiment_type) {
            (CommunicationLevel::GroupChat, ExperimentType::HiddenProfiles) => {
                CommunicationLevel::Broadcast
            }
            (level, _) => *level,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommunicationLevel::Chat => "chat",
            CommunicationLevel::Broadcast => "broadcast",
            CommunicationLevel::NoChat => "no_chat",
            CommunicationLevel::GroupChat => "group_chat",
        }
    }
}

impl Default for CommunicationLevel {
    fn default() -> Self {
        CommunicationLevel::Chat
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordRole {
    Hinter,
    Guesser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferType {
    Buy,
    Sell,
}

impl Default for OfferType {
    fn default() -> Self {
        OfferType::Sell
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Proposed,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveredStatus {
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionStatus {
    Queued,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestmentKind {
    Individual,
    Group,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A time-bounded run of one experiment. Sessions are historical records:
/// they are created by a researcher and never destroyed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub session_code: String,
    pub experiment_type: ExperimentType,
    pub researcher_id: String,
    pub status: SessionStatus,
    pub config: SessionConfig,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

/// A human or agent identity within one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub participant_id: Uuid,
    pub participant_code: String,
    pub session_code: String,
    pub kind: ParticipantType,
    pub login_status: LoginStatus,
    pub money: i64,
    /// ShapeFactory only.
    pub specialty_shape: Option<String>,
    /// Remaining order tags; fulfilled entries are removed.
    pub orders: Vec<String>,
    pub orders_completed: u32,
    pub specialty_production_used: u32,
    /// WordGuessing hinter's private word list.
    pub assigned_words: Vec<String>,
    pub word_role: Option<WordRole>,
    pub current_round: u32,
    pub score: u32,
    /// EssayRanking: most recent merged ranking snapshot.
    pub current_rankings: Vec<RankingEntry>,
    pub submitted_rankings_count: u32,
    pub created_at: DateTime<Utc>,
}

/// A chat message; `recipient` absent means broadcast. Broadcasts track the
/// set of participants that have seen them and flip to `read` only once the
/// whole session has.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Uuid,
    pub session_code: String,
    pub sender: Uuid,
    pub recipient: Option<Uuid>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub delivered_status: DeliveredStatus,
    #[serde(default)]
    pub seen_by: BTreeSet<Uuid>,
}

impl Message {
    pub fn is_broadcast(&self) -> bool {
        self.recipient.is_none()
    }
}

/// A trade offer and its lifecycle. `proposed` is the only non-terminal
/// state; acceptance, rejection and cancellation all resolve it exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub short_id: String,
    pub session_code: String,
    pub seller: Uuid,
    pub buyer: Uuid,
    pub proposer: Uuid,
    pub recipient: Uuid,
    pub offer_type: OfferType,
    pub shape: String,
    pub quantity: u32,
    pub price_per_unit: i64,
    pub status: TransactionStatus,
    pub proposed_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn total_cost(&self) -> i64 {
        self.price_per_unit * i64::from(self.quantity)
    }
}

/// One entry in a participant's production queue. At most one entry per
/// participant is `in_progress` at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionEntry {
    pub queue_id: Uuid,
    pub participant_id: Uuid,
    pub shape: String,
    pub quantity: u32,
    pub status: ProductionStatus,
    pub queue_position: u32,
    pub started_at: DateTime<Utc>,
    pub estimated_completion: DateTime<Utc>,
}

/// A DayTrader investment record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investment {
    pub investment_id: Uuid,
    pub participant_id: Uuid,
    pub price: f64,
    pub decision_type: InvestmentKind,
    pub timestamp: DateTime<Utc>,
}

/// One essay's rank within a submission or the merged snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub essay_id: String,
    pub rank: u32,
    #[serde(default)]
    pub reasoning: String,
}

/// An append-only EssayRanking submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingSubmission {
    pub submission_id: Uuid,
    pub participant_id: Uuid,
    pub rankings: Vec<RankingEntry>,
    pub submitted_at: DateTime<Utc>,
}

/// An essay assigned to an EssayRanking session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Essay {
    pub essay_id: String,
    pub title: String,
    pub content: String,
}

/// A WordGuessing guess, kept for the session's guess history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuessRecord {
    pub participant_id: Uuid,
    pub guess: String,
    pub correct: bool,
    pub round: u32,
    pub timestamp: DateTime<Utc>,
}
