//! Core store state: sessions, participants, inventories, investments,
//! rankings, essays and guess history. Trade, production, order and message
//! operations live in sibling modules as further `impl Store` blocks.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use rand::Rng;
use uuid::Uuid;

use orc_domain::{
    ActionError, Essay, ExperimentType, GuessRecord, Investment, InvestmentKind, LoginStatus,
    Message, Participant, ParticipantType, ProductionEntry, RankingEntry, RankingSubmission,
    Result, Session, SessionConfig, SessionStatus, Transaction,
};

/// Characters used for session codes: uppercase alphanumerics with the
/// confusable `0 O 1 I L` removed.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 8;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State tables
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub(crate) struct State {
    /// session_code → session.
    pub(crate) sessions: HashMap<String, Session>,
    pub(crate) participants: HashMap<Uuid, Participant>,
    /// (session_code, participant_code) → participant_id.
    pub(crate) participant_index: HashMap<(String, String), Uuid>,
    /// Insertion order; creation timestamps can tie.
    pub(crate) participant_seq: HashMap<Uuid, u64>,
    pub(crate) next_participant_seq: u64,
    /// participant_id → shape tags (duplicates preserved).
    pub(crate) inventories: HashMap<Uuid, Vec<String>>,
    /// queue_id → entry.
    pub(crate) production: HashMap<Uuid, ProductionEntry>,
    pub(crate) transactions: HashMap<Uuid, Transaction>,
    /// (session_code, short_id) → transaction_id.
    pub(crate) short_ids: HashMap<(String, String), Uuid>,
    /// Per-session short-id sequence.
    pub(crate) trade_seq: HashMap<String, u32>,
    pub(crate) messages: HashMap<Uuid, Message>,
    pub(crate) investments: Vec<Investment>,
    pub(crate) ranking_submissions: Vec<RankingSubmission>,
    /// session_code → assigned essays.
    pub(crate) essays: HashMap<String, Vec<Essay>>,
    /// session_code → guess history.
    pub(crate) guesses: HashMap<String, Vec<GuessRecord>>,
    /// participant_id → attribute bag (custom experiments).
    pub(crate) custom_attrs: HashMap<Uuid, serde_json::Map<String, serde_json::Value>>,
    /// session_code → variable bag (custom experiments).
    pub(crate) custom_vars: HashMap<String, serde_json::Map<String, serde_json::Value>>,
}

/// The in-process store. Methods take `&self`; every call is one short
/// critical section and never suspends.
pub struct Store {
    pub(crate) state: RwLock<State>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    // ── Sessions ───────────────────────────────────────────────────

    /// Create a session with a fresh unique code. Researcher-provided
    /// config keys override the defaults.
    pub fn create_session(
        &self,
        researcher_id: &str,
        experiment_type: ExperimentType,
        config_overrides: serde_json::Value,
    ) -> Result<Session> {
        self.create_session_inner(researcher_id, experiment_type, config_overrides, None)
    }

    /// Create a session under a caller-chosen code (single-agent debugging
    /// runs address their session by a known code).
    pub fn create_session_with_code(
        &self,
        session_code: &str,
        researcher_id: &str,
        experiment_type: ExperimentType,
        config_overrides: serde_json::Value,
    ) -> Result<Session> {
        self.create_session_inner(
            researcher_id,
            experiment_type,
            config_overrides,
            Some(session_code.to_owned()),
        )
    }

    fn create_session_inner(
        &self,
        researcher_id: &str,
        experiment_type: ExperimentType,
        config_overrides: serde_json::Value,
        fixed_code: Option<String>,
    ) -> Result<Session> {
        let config = SessionConfig::merged(config_overrides);
        let mut state = self.state.write();

        let mut session_code = fixed_code.unwrap_or_else(generate_session_code);
        while state.sessions.contains_key(&session_code) {
            session_code = generate_session_code();
        }

        let session = Session {
            session_id: Uuid::new_v4(),
            session_code: session_code.clone(),
            experiment_type,
            researcher_id: researcher_id.to_owned(),
            status: SessionStatus::Idle,
            config,
            created_at: Utc::now(),
            started_at: None,
        };
        state.sessions.insert(session_code.clone(), session.clone());
        tracing::info!(session_code = %session_code, kind = %session.experiment_type, "session created");
        Ok(session)
    }

    pub fn get_session(&self, session_code: &str) -> Result<Session> {
        self.state
            .read()
            .sessions
            .get(session_code)
            .cloned()
            .ok_or_else(|| ActionError::session_not_found(session_code))
    }

    pub fn set_session_status(&self, session_code: &str, status: SessionStatus) -> Result<()> {
        let mut state = self.state.write();
        let session = state
            .sessions
            .get_mut(session_code)
            .ok_or_else(|| ActionError::session_not_found(session_code))?;
        session.status = status;
        if status == SessionStatus::Active && session.started_at.is_none() {
            session.started_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Read-modify-write on a session's config under the store lock. Used
    /// for HiddenProfiles votes, initiatives and document assignment.
    pub fn update_config(
        &self,
        session_code: &str,
        mutate: impl FnOnce(&mut SessionConfig),
    ) -> Result<SessionConfig> {
        let mut state = self.state.write();
        let session = state
            .sessions
            .get_mut(session_code)
            .ok_or_else(|| ActionError::session_not_found(session_code))?;
        mutate(&mut session.config);
        Ok(session.config.clone())
    }

    // ── Participants ───────────────────────────────────────────────

    /// Add a participant. ShapeFactory sessions assign the next specialty
    /// shape round-robin over the available shapes; orders are generated
    /// lazily on first state read so they can draw on the full roster.
    pub fn add_participant(
        &self,
        session_code: &str,
        participant_code: &str,
        kind: ParticipantType,
    ) -> Result<Participant> {
        let mut state = self.state.write();
        let session = state
            .sessions
            .get(session_code)
            .ok_or_else(|| ActionError::session_not_found(session_code))?
            .clone();

        let key = (session_code.to_owned(), participant_code.to_owned());
        if state.participant_index.contains_key(&key) {
            return Err(ActionError::new(
                orc_domain::ErrorKind::InvalidState,
                format!("participant {participant_code} already exists in {session_code}"),
            ));
        }

        let specialty = match session.experiment_type {
            ExperimentType::ShapeFactory => {
                let available = session.config.available_shapes();
                let count = state
                    .participants
                    .values()
                    .filter(|p| p.session_code == session_code)
                    .count();
                available.get(count % available.len().max(1)).cloned()
            }
            _ => None,
        };

        let participant = Participant {
            participant_id: Uuid::new_v4(),
            participant_code: participant_code.to_owned(),
            session_code: session_code.to_owned(),
            kind,
            login_status: LoginStatus::NotLoggedIn,
            money: session.config.starting_money,
            specialty_shape: specialty,
            orders: Vec::new(),
            orders_completed: 0,
            specialty_production_used: 0,
            assigned_words: Vec::new(),
            word_role: None,
            current_round: 1,
            score: 0,
            current_rankings: Vec::new(),
            submitted_rankings_count: 0,
            created_at: Utc::now(),
        };
        let id = participant.participant_id;
        let seq = state.next_participant_seq;
        state.next_participant_seq += 1;
        state.participant_seq.insert(id, seq);
        state.participant_index.insert(key, id);
        state.inventories.insert(id, Vec::new());
        state.participants.insert(id, participant.clone());
        Ok(participant)
    }

    pub fn get_participant(
        &self,
        session_code: &str,
        participant_code: &str,
    ) -> Result<Participant> {
        let state = self.state.read();
        let key = (session_code.to_owned(), participant_code.to_owned());
        state
            .participant_index
            .get(&key)
            .and_then(|id| state.participants.get(id))
            .cloned()
            .ok_or_else(|| ActionError::participant_not_found(participant_code, session_code))
    }

    pub fn participant_by_id(&self, participant_id: Uuid) -> Result<Participant> {
        self.state
            .read()
            .participants
            .get(&participant_id)
            .cloned()
            .ok_or_else(|| {
                ActionError::new(
                    orc_domain::ErrorKind::ParticipantNotFound,
                    format!("participant id {participant_id} not found"),
                )
            })
    }

    /// All participants of a session, in insertion order.
    pub fn list_participants(&self, session_code: &str) -> Result<Vec<Participant>> {
        let state = self.state.read();
        if !state.sessions.contains_key(session_code) {
            return Err(ActionError::session_not_found(session_code));
        }
        let mut list: Vec<_> = state
            .participants
            .values()
            .filter(|p| p.session_code == session_code)
            .cloned()
            .collect();
        list.sort_by_key(|p| {
            state
                .participant_seq
                .get(&p.participant_id)
                .copied()
                .unwrap_or(u64::MAX)
        });
        Ok(list)
    }

    /// Resolve a recipient name to a participant id. Falls back to
    /// `<name>_<session_code>` so agents can be addressed by display name.
    pub fn resolve_recipient(&self, session_code: &str, name: &str) -> Result<Uuid> {
        let state = self.state.read();
        let exact = (session_code.to_owned(), name.to_owned());
        if let Some(id) = state.participant_index.get(&exact) {
            return Ok(*id);
        }
        let suffixed = (session_code.to_owned(), format!("{name}_{session_code}"));
        state
            .participant_index
            .get(&suffixed)
            .copied()
            .ok_or_else(|| ActionError::participant_not_found(name, session_code))
    }

    /// Apply a mutation to one participant row.
    pub fn update_participant(
        &self,
        participant_id: Uuid,
        mutate: impl FnOnce(&mut Participant),
    ) -> Result<Participant> {
        let mut state = self.state.write();
        let participant = state.participants.get_mut(&participant_id).ok_or_else(|| {
            ActionError::new(
                orc_domain::ErrorKind::ParticipantNotFound,
                format!("participant id {participant_id} not found"),
            )
        })?;
        mutate(participant);
        Ok(participant.clone())
    }

    // ── Inventory ──────────────────────────────────────────────────

    pub fn inventory(&self, participant_id: Uuid) -> Vec<String> {
        self.state
            .read()
            .inventories
            .get(&participant_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count_in_inventory(&self, participant_id: Uuid, shape: &str) -> usize {
        self.state
            .read()
            .inventories
            .get(&participant_id)
            .map(|inv| inv.iter().filter(|tag| *tag == shape).count())
            .unwrap_or(0)
    }

    /// Append produced or purchased shapes to a participant's inventory.
    pub fn deposit_shapes(&self, participant_id: Uuid, shape: &str, quantity: u32) {
        let mut state = self.state.write();
        let inventory = state.inventories.entry(participant_id).or_default();
        for _ in 0..quantity {
            inventory.push(shape.to_owned());
        }
    }

    // ── Investments (DayTrader) ────────────────────────────────────

    /// Record an investment and debit the nominal price from the
    /// participant's money (baseline semantics: no return modelling).
    pub fn record_investment(
        &self,
        participant_id: Uuid,
        price: f64,
        decision_type: InvestmentKind,
    ) -> Result<Investment> {
        let mut state = self.state.write();
        let participant = state.participants.get_mut(&participant_id).ok_or_else(|| {
            ActionError::new(
                orc_domain::ErrorKind::ParticipantNotFound,
                format!("participant id {participant_id} not found"),
            )
        })?;
        participant.money -= price.round() as i64;
        let investment = Investment {
            investment_id: Uuid::new_v4(),
            participant_id,
            price,
            decision_type,
            timestamp: Utc::now(),
        };
        state.investments.push(investment.clone());
        Ok(investment)
    }

    pub fn investment_history(&self, participant_id: Uuid) -> Vec<Investment> {
        self.state
            .read()
            .investments
            .iter()
            .filter(|i| i.participant_id == participant_id)
            .cloned()
            .collect()
    }

    // ── Rankings (EssayRanking) ────────────────────────────────────

    /// Append a ranking submission and merge it into the participant's
    /// current snapshot: re-ranked essays are overwritten, others keep
    /// their previous rank.
    pub fn record_ranking_submission(
        &self,
        participant_id: Uuid,
        rankings: Vec<RankingEntry>,
    ) -> Result<RankingSubmission> {
        let mut state = self.state.write();
        let participant = state.participants.get_mut(&participant_id).ok_or_else(|| {
            ActionError::new(
                orc_domain::ErrorKind::ParticipantNotFound,
                format!("participant id {participant_id} not found"),
            )
        })?;

        let updated_ids: std::collections::HashSet<&str> =
            rankings.iter().map(|r| r.essay_id.as_str()).collect();
        participant
            .current_rankings
            .retain(|r| !updated_ids.contains(r.essay_id.as_str()));
        participant.current_rankings.extend(rankings.iter().cloned());
        participant.submitted_rankings_count += 1;

        let submission = RankingSubmission {
            submission_id: Uuid::new_v4(),
            participant_id,
            rankings,
            submitted_at: Utc::now(),
        };
        state.ranking_submissions.push(submission.clone());
        Ok(submission)
    }

    // ── Essays ─────────────────────────────────────────────────────

    pub fn assign_essays(&self, session_code: &str, essays: Vec<Essay>) -> Result<()> {
        let mut state = self.state.write();
        if !state.sessions.contains_key(session_code) {
            return Err(ActionError::session_not_found(session_code));
        }
        state.essays.insert(session_code.to_owned(), essays);
        Ok(())
    }

    pub fn essays(&self, session_code: &str) -> Vec<Essay> {
        self.state
            .read()
            .essays
            .get(session_code)
            .cloned()
            .unwrap_or_default()
    }

    // ── Guess history (WordGuessing) ───────────────────────────────

    pub fn record_guess(&self, session_code: &str, record: GuessRecord) {
        let mut state = self.state.write();
        state
            .guesses
            .entry(session_code.to_owned())
            .or_default()
            .push(record);
    }

    pub fn guesses(&self, session_code: &str) -> Vec<GuessRecord> {
        self.state
            .read()
            .guesses
            .get(session_code)
            .cloned()
            .unwrap_or_default()
    }

    // ── Transactions (queries; mutations in trade.rs) ──────────────

    pub fn get_transaction(&self, transaction_id: Uuid) -> Result<Transaction> {
        self.state
            .read()
            .transactions
            .get(&transaction_id)
            .cloned()
            .ok_or_else(|| {
                ActionError::new(
                    orc_domain::ErrorKind::NotInProposedState,
                    format!("transaction {transaction_id} not found"),
                )
            })
    }

    pub fn list_transactions(&self, session_code: &str) -> Vec<Transaction> {
        let mut list: Vec<_> = self
            .state
            .read()
            .transactions
            .values()
            .filter(|t| t.session_code == session_code)
            .cloned()
            .collect();
        list.sort_by_key(|t| t.proposed_at);
        list
    }
}

fn generate_session_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// A ShapeFactory session with the S1 config and the given participants.
    pub(crate) fn demo_session(store: &Store, participants: &[&str]) -> Session {
        let session = store
            .create_session(
                "researcher1",
                ExperimentType::ShapeFactory,
                serde_json::json!({
                    "startingMoney": 300,
                    "specialtyCost": 10,
                    "regularCost": 25,
                    "minTradePrice": 15,
                    "maxTradePrice": 35,
                    "shapesPerOrder": 4,
                    "incentiveMoney": 50,
                    "maxProductionNum": 6,
                    "productionTime": 5,
                }),
            )
            .unwrap();
        for code in participants {
            store
                .add_participant(&session.session_code, code, ParticipantType::AiAgent)
                .unwrap();
        }
        session
    }
}
