//! Shared vocabulary for the Orchestra runtime.
//!
//! Every other crate in the workspace speaks these types: the closed
//! error-kind set, session/participant/trade entities, the typed experiment
//! config bag, the LLM plan-action union, event-bus events, and the
//! provider-agnostic chat shapes.

pub mod chat;
pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod plan;
pub mod timer;

pub use chat::{ChatMessage, ChatRole, ToolCallRequest, ToolDefinition};
pub use config::{CandidateDocument, HiddenProfilesConfig, SessionConfig};
pub use entity::{
    CommunicationLevel, DeliveredStatus, Essay, ExperimentType, GuessRecord, Initiative,
    Investment, InvestmentKind, LoginStatus, Message, OfferType, Participant, ParticipantType,
    ProductionEntry, ProductionStatus, RankingEntry, RankingSubmission, Session, SessionStatus,
    Transaction, TransactionStatus, WordRole,
};
pub use error::{ActionError, ErrorKind, Result};
pub use event::{Audience, Event};
pub use plan::{Plan, PlanAction};
pub use timer::{TimerState, TimerStatus};
