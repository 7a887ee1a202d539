//! The EssayRanking engine: participants rank assigned essays; submissions
//! merge into a per-participant snapshot and are individually logged.

use serde::Serialize;

use orc_domain::{
    ActionError, ErrorKind, Essay, ExperimentType, Message, Participant, ParticipantType,
    RankingEntry, RankingSubmission, Result, Session,
};

use crate::common::{EngineContext, PublicState};
use crate::engine::{GameEngine, PrivateState};

const DESCRIPTION: &str = "Read the assigned essays and submit your ranking; you can refine \
                           it with further submissions.";

/// Essay metadata without the full text (content is fetched per essay).
#[derive(Debug, Clone, Serialize)]
pub struct EssaySummary {
    pub essay_id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingState {
    pub money: i64,
    pub assigned_essays: Vec<EssaySummary>,
    pub current_rankings: Vec<RankingEntry>,
    pub submitted_rankings_count: u32,
}

pub struct EssayRankingEngine {
    ctx: EngineContext,
}

impl EssayRankingEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Researcher-side setup: attach the essay set to the session.
    pub fn assign_essays(&self, session_code: &str, essays: Vec<Essay>) -> Result<()> {
        self.ctx.store.assign_essays(session_code, essays)
    }
}

impl GameEngine for EssayRankingEngine {
    fn description(&self) -> &'static str {
        DESCRIPTION
    }

    fn create_session(&self, researcher_id: &str, config: serde_json::Value) -> Result<Session> {
        self.ctx
            .store
            .create_session(researcher_id, ExperimentType::EssayRanking, config)
    }

    fn add_participant(
        &self,
        session_code: &str,
        participant_code: &str,
        kind: ParticipantType,
    ) -> Result<Participant> {
        self.ctx
            .store
            .add_participant(session_code, participant_code, kind)
    }

    fn get_participant_state(
        &self,
        participant_code: &str,
        session_code: &str,
    ) -> Result<PrivateState> {
        let me = self.ctx.participant(session_code, participant_code)?;
        let assigned_essays = self
            .ctx
            .store
            .essays(session_code)
            .into_iter()
            .map(|e| EssaySummary {
                essay_id: e.essay_id,
                title: e.title,
            })
            .collect();
        Ok(PrivateState::EssayRanking(RankingState {
            money: me.money,
            assigned_essays,
            current_rankings: me.current_rankings.clone(),
            submitted_rankings_count: me.submitted_rankings_count,
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

    fn submit_ranking(
        &self,
        participant_code: &str,
        rankings: Vec<RankingEntry>,
        session_code: &str,
    ) -> Result<RankingSubmission> {
        if rankings.is_empty() {
            return Err(ActionError::new(
                ErrorKind::InvalidState,
                "a ranking submission needs at least one entry",
            ));
        }
        let me = self.ctx.participant(session_code, participant_code)?;
        let assigned = self.ctx.store.essays(session_code);

        // Partial rankings are fine, but every referenced essay must be in
        // the session's assignment and ranks must be unique within the
        // submission.
        let mut seen_ids = std::collections::HashSet::new();
        let mut seen_ranks = std::collections::HashSet::new();
        for entry in &rankings {
            if !assigned.iter().any(|e| e.essay_id == entry.essay_id) {
                return Err(ActionError::new(
                    ErrorKind::InvalidState,
                    format!("essay '{}' is not assigned to this session", entry.essay_id),
                ));
            }
            if !seen_ids.insert(entry.essay_id.as_str()) {
                return Err(ActionError::new(
                    ErrorKind::InvalidState,
                    format!("essay '{}' appears twice in the submission", entry.essay_id),
                ));
            }
            if !seen_ranks.insert(entry.rank) {
                return Err(ActionError::new(
                    ErrorKind::InvalidState,
                    format!("rank {} is used more than once", entry.rank),
                ));
            }
        }

        let submission = self
            .ctx
            .store
            .record_ranking_submission(me.participant_id, rankings)?;
        tracing::info!(
            participant = participant_code,
            rankings = submission.rankings.len(),
            "ranking submitted"
        );
        Ok(submission)
    }

    fn get_assigned_essays(
        &self,
        _participant_code: &str,
        session_code: &str,
    ) -> Result<Vec<Essay>> {
        Ok(self.ctx.store.essays(session_code))
    }

    fn get_essay_content(
        &self,
        _participant_code: &str,
        essay_id: &str,
        session_code: &str,
    ) -> Result<Essay> {
        self.ctx
            .store
            .essays(session_code)
            .into_iter()
            .find(|e| e.essay_id == essay_id)
            .ok_or_else(|| {
                ActionError::new(
                    ErrorKind::InvalidState,
                    format!("essay '{essay_id}' is not assigned to this session"),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_store::{Store, TimerBoard};
    use std::sync::Arc;

    fn essay(id: &str) -> Essay {
        Essay {
            essay_id: id.into(),
            title: format!("Essay {id}"),
            content: format!("Body of {id}"),
        }
    }

    fn entry(id: &str, rank: u32) -> RankingEntry {
        RankingEntry {
            essay_id: id.into(),
            rank,
            reasoning: "because".into(),
        }
    }

    fn engine_with_session() -> (EssayRankingEngine, String) {
        let ctx = EngineContext::new(Arc::new(Store::new()), Arc::new(TimerBoard::new()));
        let engine = EssayRankingEngine::new(ctx);
        let session = engine.create_session("r1", serde_json::json!({})).unwrap();
        let code = session.session_code;
        engine
            .add_participant(&code, "R1", ParticipantType::AiAgent)
            .unwrap();
        engine
            .assign_essays(&code, vec![essay("e1"), essay("e2"), essay("e3")])
            .unwrap();
        (engine, code)
    }

    #[test]
    fn resubmission_replaces_only_named_essays() {
        let (engine, code) = engine_with_session();
        engine
            .submit_ranking("R1", vec![entry("e1", 1), entry("e2", 2)], &code)
            .unwrap();
        engine
            .submit_ranking("R1", vec![entry("e2", 1)], &code)
            .unwrap();

        let PrivateState::EssayRanking(state) =
            engine.get_participant_state("R1", &code).unwrap()
        else {
            panic!("wrong private state kind");
        };
        assert_eq!(state.submitted_rankings_count, 2);
        let rank_of = |id: &str| {
            state
                .current_rankings
                .iter()
                .find(|r| r.essay_id == id)
                .map(|r| r.rank)
        };
        assert_eq!(rank_of("e1"), Some(1));
        assert_eq!(rank_of("e2"), Some(1));
        assert_eq!(rank_of("e3"), None); // partial ranking is allowed
    }

    #[test]
    fn unassigned_essays_and_duplicate_ranks_are_rejected() {
        let (engine, code) = engine_with_session();
        let err = engine
            .submit_ranking("R1", vec![entry("ghost", 1)], &code)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);

        let err = engine
            .submit_ranking("R1", vec![entry("e1", 1), entry("e2", 1)], &code)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);

        let err = engine.submit_ranking("R1", vec![], &code).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
    }

    #[test]
    fn essay_content_is_fetched_by_id() {
        let (engine, code) = engine_with_session();
        let essays = engine.get_assigned_essays("R1", &code).unwrap();
        assert_eq!(essays.len(), 3);
        let e = engine.get_essay_content("R1", "e2", &code).unwrap();
        assert_eq!(e.content, "Body of e2");
        assert!(engine.get_essay_content("R1", "nope", &code).is_err());
    }
}
