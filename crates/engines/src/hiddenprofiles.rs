//! The HiddenProfiles engine: participants each read a private candidate
//! document plus a shared public one, discuss, and vote. Votes live in the
//! session config and are overwritable.

use serde::Serialize;

use orc_domain::{
    ActionError, CandidateDocument, ErrorKind, ExperimentType, Initiative, Message, Participant,
    ParticipantType, Result, Session,
};

use crate::common::{EngineContext, PublicState};
use crate::engine::{GameEngine, PrivateState};

const DESCRIPTION: &str = "Read your private candidate profile and the shared briefing, \
                           discuss with the group, then vote for a candidate.";

#[derive(Debug, Clone, Serialize)]
pub struct ProfileState {
    pub candidate_document: Option<CandidateDocument>,
    pub public_info: Option<String>,
    pub candidate_list: Vec<String>,
    pub initiative: Initiative,
    pub has_voted: bool,
    pub my_vote: Option<String>,
}

pub struct HiddenProfilesEngine {
    ctx: EngineContext,
}

impl HiddenProfilesEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Researcher-side setup: attach a candidate document to a participant.
    pub fn assign_document(
        &self,
        session_code: &str,
        participant_code: &str,
        document: CandidateDocument,
    ) -> Result<()> {
        // Validate the participant exists before touching config.
        self.ctx.participant(session_code, participant_code)?;
        self.ctx.store.update_config(session_code, |config| {
            config
                .hidden_profiles
                .assigned_documents
                .insert(participant_code.to_owned(), document);
        })?;
        Ok(())
    }

    /// Researcher-side setup: publish the shared briefing document.
    pub fn set_public_info(&self, session_code: &str, content: &str) -> Result<()> {
        self.ctx.store.update_config(session_code, |config| {
            config.hidden_profiles.public_info = Some(content.to_owned());
        })?;
        Ok(())
    }

    /// Researcher-side setup: mark an agent active or passive.
    pub fn set_initiative(
        &self,
        session_code: &str,
        participant_code: &str,
        initiative: Initiative,
    ) -> Result<()> {
        self.ctx.store.update_config(session_code, |config| {
            config
                .hidden_profiles
                .participant_initiatives
                .insert(participant_code.to_owned(), initiative);
        })?;
        Ok(())
    }

    pub fn votes(&self, session_code: &str) -> Result<std::collections::BTreeMap<String, String>> {
        Ok(self
            .ctx
            .store
            .get_session(session_code)?
            .config
            .hidden_profiles
            .votes)
    }
}

impl GameEngine for HiddenProfilesEngine {
    fn description(&self) -> &'static str {
        DESCRIPTION
    }

    fn create_session(&self, researcher_id: &str, config: serde_json::Value) -> Result<Session> {
        self.ctx
            .store
            .create_session(researcher_id, ExperimentType::HiddenProfiles, config)
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
        let session = self.ctx.store.get_session(session_code)?;
        self.ctx.participant(session_code, participant_code)?;
        let hp = &session.config.hidden_profiles;
        Ok(PrivateState::HiddenProfiles(ProfileState {
            candidate_document: hp.assigned_documents.get(participant_code).cloned(),
            public_info: hp.public_info.clone(),
            candidate_list: hp.candidate_names.clone(),
            initiative: hp
                .participant_initiatives
                .get(participant_code)
                .copied()
                .unwrap_or_default(),
            has_voted: hp.votes.contains_key(participant_code),
            my_vote: hp.votes.get(participant_code).cloned(),
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

    /// Validate the candidate and overwrite this participant's vote in the
    /// session config (read-modify-write under the store lock).
    fn submit_vote(
        &self,
        participant_code: &str,
        candidate_name: &str,
        session_code: &str,
    ) -> Result<String> {
        let session = self.ctx.store.get_session(session_code)?;
        self.ctx.participant(session_code, participant_code)?;
        if candidate_name.is_empty()
            || !session
                .config
                .hidden_profiles
                .candidate_names
                .iter()
                .any(|c| c == candidate_name)
        {
            return Err(ActionError::new(
                ErrorKind::InvalidState,
                format!("candidate '{candidate_name}' is not in the session candidate list"),
            ));
        }
        self.ctx.store.update_config(session_code, |config| {
            config
                .hidden_profiles
                .votes
                .insert(participant_code.to_owned(), candidate_name.to_owned());
        })?;
        tracing::info!(
            participant = participant_code,
            candidate = candidate_name,
            "vote submitted"
        );
        Ok(candidate_name.to_owned())
    }

    /// Reading phase completes when the shared briefing is published and
    /// every participant has a candidate document.
    fn reading_phase_complete(&self, session_code: &str) -> bool {
        let Ok(session) = self.ctx.store.get_session(session_code) else {
            return false;
        };
        let hp = &session.config.hidden_profiles;
        let has_public = hp
            .public_info
            .as_deref()
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        if !has_public {
            return false;
        }
        let Ok(roster) = self.ctx.store.list_participants(session_code) else {
            return false;
        };
        !roster.is_empty()
            && roster
                .iter()
                .all(|p| hp.assigned_documents.contains_key(&p.participant_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_store::{Store, TimerBoard};
    use std::sync::Arc;

    fn engine_with_session() -> (HiddenProfilesEngine, String) {
        let ctx = EngineContext::new(Arc::new(Store::new()), Arc::new(TimerBoard::new()));
        let engine = HiddenProfilesEngine::new(ctx);
        let session = engine
            .create_session(
                "r1",
                serde_json::json!({
                    "hiddenProfiles": {"candidateNames": ["Candidate_X", "Candidate_Y"]},
                }),
            )
            .unwrap();
        let code = session.session_code;
        engine
            .add_participant(&code, "A1", ParticipantType::AiAgent)
            .unwrap();
        engine
            .add_participant(&code, "A2", ParticipantType::AiAgent)
            .unwrap();
        (engine, code)
    }

    fn doc(name: &str) -> CandidateDocument {
        CandidateDocument {
            candidate_name: name.into(),
            content: format!("profile of {name}"),
        }
    }

    #[test]
    fn votes_are_validated_and_overwritable() {
        let (engine, code) = engine_with_session();
        engine.submit_vote("A1", "Candidate_X", &code).unwrap();
        engine.submit_vote("A1", "Candidate_Y", &code).unwrap();
        let votes = engine.votes(&code).unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes.get("A1").map(String::as_str), Some("Candidate_Y"));

        let err = engine.submit_vote("A1", "Candidate_Z", &code).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
        let err = engine.submit_vote("A1", "", &code).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
    }

    #[test]
    fn reading_phase_needs_public_info_and_all_documents() {
        let (engine, code) = engine_with_session();
        assert!(!engine.reading_phase_complete(&code));

        engine.set_public_info(&code, "shared briefing").unwrap();
        assert!(!engine.reading_phase_complete(&code));

        engine.assign_document(&code, "A1", doc("Candidate_X")).unwrap();
        assert!(!engine.reading_phase_complete(&code));

        engine.assign_document(&code, "A2", doc("Candidate_Y")).unwrap();
        assert!(engine.reading_phase_complete(&code));
    }

    #[test]
    fn private_state_reflects_documents_and_votes() {
        let (engine, code) = engine_with_session();
        engine.assign_document(&code, "A1", doc("Candidate_X")).unwrap();
        engine.set_initiative(&code, "A2", Initiative::Passive).unwrap();
        engine.submit_vote("A1", "Candidate_X", &code).unwrap();

        let PrivateState::HiddenProfiles(state) =
            engine.get_participant_state("A1", &code).unwrap()
        else {
            panic!("wrong private state kind");
        };
        assert!(state.has_voted);
        assert_eq!(state.my_vote.as_deref(), Some("Candidate_X"));
        assert_eq!(
            state.candidate_document.unwrap().candidate_name,
            "Candidate_X"
        );
        assert_eq!(state.initiative, Initiative::Active);

        let PrivateState::HiddenProfiles(state) =
            engine.get_participant_state("A2", &code).unwrap()
        else {
            panic!("wrong private state kind");
        };
        assert!(!state.has_voted);
        assert_eq!(state.initiative, Initiative::Passive);
    }
}
