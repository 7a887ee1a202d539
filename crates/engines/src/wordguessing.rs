//! The WordGuessing engine: hinters hold private word lists, guessers
//! submit guesses against the current round's word.

use chrono::Utc;
use serde::Serialize;

use orc_domain::{
    ActionError, ErrorKind, ExperimentType, GuessRecord, Message, Participant, ParticipantType,
    Result, Session, WordRole,
};

use crate::common::{EngineContext, PublicState};
use crate::engine::{GameEngine, PrivateState};

const DESCRIPTION: &str = "Hinters describe a secret word without saying it; guessers try to \
                           name it.";

/// Default word list when the researcher configures none.
const DEFAULT_WORDS: [&str; 5] = ["lighthouse", "avalanche", "compass", "orchard", "lantern"];

#[derive(Debug, Clone, Serialize)]
pub struct WordState {
    pub role: WordRole,
    /// Hinters only; empty for guessers.
    pub assigned_words: Vec<String>,
    pub current_round: u32,
    pub score: u32,
    /// For guessers: who holds the words.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hinter_participant: Option<String>,
    /// For hinters: who is guessing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guesser_participant: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuessOutcome {
    pub guess: String,
    pub correct: bool,
    pub score: u32,
}

pub struct WordGuessingEngine {
    ctx: EngineContext,
}

impl WordGuessingEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    fn word_list(session: &Session) -> Vec<String> {
        session
            .config
            .extra
            .get("wordList")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|w| w.as_str().map(str::to_owned))
                    .collect::<Vec<_>>()
            })
            .filter(|words| !words.is_empty())
            .unwrap_or_else(|| DEFAULT_WORDS.iter().map(|w| w.to_string()).collect())
    }

    fn find_by_role(&self, session_code: &str, role: WordRole) -> Result<Option<Participant>> {
        Ok(self
            .ctx
            .store
            .list_participants(session_code)?
            .into_iter()
            .find(|p| p.word_role == Some(role)))
    }
}

impl GameEngine for WordGuessingEngine {
    fn description(&self) -> &'static str {
        DESCRIPTION
    }

    fn create_session(&self, researcher_id: &str, config: serde_json::Value) -> Result<Session> {
        self.ctx
            .store
            .create_session(researcher_id, ExperimentType::WordGuessing, config)
    }

    /// Adds the participant and assigns a role keeping hinter/guesser
    /// counts balanced (difference at most 1); hinters receive the session
    /// word list.
    fn add_participant(
        &self,
        session_code: &str,
        participant_code: &str,
        kind: ParticipantType,
    ) -> Result<Participant> {
        let session = self.ctx.store.get_session(session_code)?;
        let roster = self.ctx.store.list_participants(session_code)?;
        let hinters = roster
            .iter()
            .filter(|p| p.word_role == Some(WordRole::Hinter))
            .count();
        let guessers = roster
            .iter()
            .filter(|p| p.word_role == Some(WordRole::Guesser))
            .count();
        let role = if hinters <= guessers {
            WordRole::Hinter
        } else {
            WordRole::Guesser
        };

        let participant = self
            .ctx
            .store
            .add_participant(session_code, participant_code, kind)?;
        let words = Self::word_list(&session);
        self.ctx
            .store
            .update_participant(participant.participant_id, |p| {
                p.word_role = Some(role);
                if role == WordRole::Hinter {
                    p.assigned_words = words;
                }
            })
    }

    fn get_participant_state(
        &self,
        participant_code: &str,
        session_code: &str,
    ) -> Result<PrivateState> {
        let me = self.ctx.participant(session_code, participant_code)?;
        let role = me.word_role.unwrap_or(WordRole::Guesser);
        let hinter = self.find_by_role(session_code, WordRole::Hinter)?;
        let guesser = self.find_by_role(session_code, WordRole::Guesser)?;
        Ok(PrivateState::WordGuessing(WordState {
            role,
            assigned_words: if role == WordRole::Hinter {
                me.assigned_words.clone()
            } else {
                Vec::new()
            },
            current_round: me.current_round,
            score: me.score,
            hinter_participant: (role == WordRole::Guesser)
                .then(|| hinter.map(|p| p.participant_code))
                .flatten(),
            guesser_participant: (role == WordRole::Hinter)
                .then(|| guesser.map(|p| p.participant_code))
                .flatten(),
        }))
    }

    fn get_public_state(&self, session_code: &str) -> Result<PublicState> {
        let session = self.ctx.store.get_session(session_code)?;
        self.ctx.public_state(&session, DESCRIPTION)
    }

    fn send_message(
        &self,
        participant_code: &str,
        recipient: &str,
        content: &str,
        session_code: &str,
    ) -> Result<Message> {
        self.ctx
            .send_message(participant_code, recipient, content, session_code)
    }

    fn start_session(&self, session_code: &str) -> Result<()> {
        self.ctx.start_session(session_code)
    }

    fn end_session(&self, session_code: &str) -> Result<()> {
        self.ctx.end_session(session_code)
    }

    fn get_assigned_words(
        &self,
        participant_code: &str,
        session_code: &str,
    ) -> Result<Vec<String>> {
        let me = self.ctx.participant(session_code, participant_code)?;
        if me.word_role != Some(WordRole::Hinter) {
            return Err(ActionError::new(
                ErrorKind::InvalidState,
                "only hinters have assigned words",
            ));
        }
        Ok(me.assigned_words)
    }

    fn submit_guess(
        &self,
        participant_code: &str,
        guess_text: &str,
        session_code: &str,
    ) -> Result<GuessOutcome> {
        let me = self.ctx.participant(session_code, participant_code)?;
        if me.word_role != Some(WordRole::Guesser) {
            return Err(ActionError::new(
                ErrorKind::InvalidState,
                "only guessers can submit guesses",
            ));
        }
        let hinter = self
            .find_by_role(session_code, WordRole::Hinter)?
            .ok_or_else(|| {
                ActionError::new(ErrorKind::InvalidState, "no hinter in this session")
            })?;

        let round = me.current_round.max(1) as usize;
        let current_word = hinter
            .assigned_words
            .get(round - 1)
            .cloned()
            .unwrap_or_default();
        let correct = !current_word.is_empty()
            && guess_text.trim().eq_ignore_ascii_case(current_word.trim());

        self.ctx.store.record_guess(
            session_code,
            GuessRecord {
                participant_id: me.participant_id,
                guess: guess_text.to_owned(),
                correct,
                round: me.current_round,
                timestamp: Utc::now(),
            },
        );
        let updated = if correct {
            self.ctx
                .store
                .update_participant(me.participant_id, |p| p.score += 1)?
        } else {
            me
        };
        Ok(GuessOutcome {
            guess: guess_text.to_owned(),
            correct,
            score: updated.score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_store::{Store, TimerBoard};
    use std::sync::Arc;

    fn engine_with_session() -> (WordGuessingEngine, String) {
        let ctx = EngineContext::new(Arc::new(Store::new()), Arc::new(TimerBoard::new()));
        let engine = WordGuessingEngine::new(ctx);
        let session = engine
            .create_session("r1", serde_json::json!({"wordList": ["apple", "pear"]}))
            .unwrap();
        let code = session.session_code;
        (engine, code)
    }

    #[test]
    fn roles_stay_balanced() {
        let (engine, code) = engine_with_session();
        for name in ["P1", "P2", "P3", "P4", "P5"] {
            engine
                .add_participant(&code, name, ParticipantType::AiAgent)
                .unwrap();
        }
        let roster = engine.ctx.store.list_participants(&code).unwrap();
        let hinters = roster
            .iter()
            .filter(|p| p.word_role == Some(WordRole::Hinter))
            .count();
        let guessers = roster
            .iter()
            .filter(|p| p.word_role == Some(WordRole::Guesser))
            .count();
        assert!(hinters.abs_diff(guessers) <= 1);
    }

    #[test]
    fn guesses_compare_case_insensitively_and_score() {
        let (engine, code) = engine_with_session();
        engine
            .add_participant(&code, "Hinter1", ParticipantType::Human)
            .unwrap();
        engine
            .add_participant(&code, "Guesser1", ParticipantType::AiAgent)
            .unwrap();

        let wrong = engine.submit_guess("Guesser1", "banana", &code).unwrap();
        assert!(!wrong.correct);
        assert_eq!(wrong.score, 0);

        let right = engine.submit_guess("Guesser1", "  APPLE ", &code).unwrap();
        assert!(right.correct);
        assert_eq!(right.score, 1);

        assert_eq!(engine.ctx.store.guesses(&code).len(), 2);
    }

    #[test]
    fn only_guessers_guess_and_only_hinters_hold_words() {
        let (engine, code) = engine_with_session();
        engine
            .add_participant(&code, "Hinter1", ParticipantType::Human)
            .unwrap();
        engine
            .add_participant(&code, "Guesser1", ParticipantType::AiAgent)
            .unwrap();

        assert_eq!(
            engine.get_assigned_words("Hinter1", &code).unwrap(),
            vec!["apple".to_string(), "pear".into()]
        );
        assert!(engine.get_assigned_words("Guesser1", &code).is_err());
        assert!(engine.submit_guess("Hinter1", "apple", &code).is_err());
    }

    #[test]
    fn guesser_state_names_the_hinter() {
        let (engine, code) = engine_with_session();
        engine
            .add_participant(&code, "Hinter1", ParticipantType::Human)
            .unwrap();
        engine
            .add_participant(&code, "Guesser1", ParticipantType::AiAgent)
            .unwrap();
        let PrivateState::WordGuessing(state) =
            engine.get_participant_state("Guesser1", &code).unwrap()
        else {
            panic!("wrong private state kind");
        };
        assert_eq!(state.role, WordRole::Guesser);
        assert!(state.assigned_words.is_empty());
        assert_eq!(state.hinter_participant.as_deref(), Some("Hinter1"));
    }
}
