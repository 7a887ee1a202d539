//! Shared error type used across all Orchestra crates.
//!
//! Every fallible engine, store, or tool operation returns an
//! [`ActionError`] carrying one of the closed [`ErrorKind`] tags. Engines
//! never panic across the tool-surface boundary; the agent controller treats
//! every error as a recorded failure rather than aborting the session.

use serde::{Deserialize, Serialize};

/// Machine-readable failure kinds. The set is closed: the transport layer
/// maps each tag to a response, and agents see the tag in their failure
/// summaries, so new variants are a wire-format change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    SessionNotFound,
    ParticipantNotFound,
    MissingSessionScope,
    InvalidState,
    NotInProposedState,
    AlreadyProcessed,
    InsufficientFunds,
    InsufficientInventory,
    ProductionLimitReached,
    InvalidPrice,
    InvalidShape,
    InvalidQuantity,
    InvalidOrderIndex,
    CommunicationLevelViolation,
    SelfAcceptForbidden,
    SelfOfferForbidden,
    #[serde(rename = "LLMError")]
    LlmError,
    StoreError,
    TransportError,
}

impl ErrorKind {
    /// The wire tag, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SessionNotFound => "SessionNotFound",
            ErrorKind::ParticipantNotFound => "ParticipantNotFound",
            ErrorKind::MissingSessionScope => "MissingSessionScope",
            ErrorKind::InvalidState => "InvalidState",
            ErrorKind::NotInProposedState => "NotInProposedState",
            ErrorKind::AlreadyProcessed => "AlreadyProcessed",
            ErrorKind::InsufficientFunds => "InsufficientFunds",
            ErrorKind::InsufficientInventory => "InsufficientInventory",
            ErrorKind::ProductionLimitReached => "ProductionLimitReached",
            ErrorKind::InvalidPrice => "InvalidPrice",
            ErrorKind::InvalidShape => "InvalidShape",
            ErrorKind::InvalidQuantity => "InvalidQuantity",
            ErrorKind::InvalidOrderIndex => "InvalidOrderIndex",
            ErrorKind::CommunicationLevelViolation => "CommunicationLevelViolation",
            ErrorKind::SelfAcceptForbidden => "SelfAcceptForbidden",
            ErrorKind::SelfOfferForbidden => "SelfOfferForbidden",
            ErrorKind::LlmError => "LLMError",
            ErrorKind::StoreError => "StoreError",
            ErrorKind::TransportError => "TransportError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, serializable failure: kind tag plus human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ActionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ActionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn session_not_found(session_code: &str) -> Self {
        Self::new(
            ErrorKind::SessionNotFound,
            format!("session {session_code} not found"),
        )
    }

    pub fn participant_not_found(participant_code: &str, session_code: &str) -> Self {
        Self::new(
            ErrorKind::ParticipantNotFound,
            format!("participant {participant_code} not found in session {session_code}"),
        )
    }

    pub fn missing_session_scope(operation: &str) -> Self {
        Self::new(
            ErrorKind::MissingSessionScope,
            format!("{operation} requires a session_code"),
        )
    }

    pub fn llm(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::LlmError, detail)
    }
}

pub type Result<T> = std::result::Result<T, ActionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_to_wire_tag() {
        let json = serde_json::to_string(&ErrorKind::InsufficientFunds).unwrap();
        assert_eq!(json, "\"InsufficientFunds\"");
        let json = serde_json::to_string(&ErrorKind::LlmError).unwrap();
        assert_eq!(json, "\"LLMError\"");
    }

    #[test]
    fn kind_round_trips() {
        for kind in [
            ErrorKind::SessionNotFound,
            ErrorKind::NotInProposedState,
            ErrorKind::LlmError,
            ErrorKind::TransportError,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            let back: ErrorKind = serde_json::from_str(&json).unwrap();
            assert_eq!(kind, back);
        }
    }

    #[test]
    fn action_error_displays_kind_and_message() {
        let err = ActionError::participant_not_found("P1", "DEMO001");
        assert_eq!(
            err.to_string(),
            "ParticipantNotFound: participant P1 not found in session DEMO001"
        );
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(ErrorKind::LlmError.to_string(), "LLMError");
        assert_eq!(
            ErrorKind::CommunicationLevelViolation.to_string(),
            "CommunicationLevelViolation"
        );
    }
}
