//! The DayTrader engine: one action, `make_investment`, with baseline cost
//! semantics (the nominal price is debited; returns are not modelled).

use serde::Serialize;

use orc_domain::{
    ActionError, ErrorKind, ExperimentType, Investment, InvestmentKind, Message, Participant,
    ParticipantType, Result, Session,
};

use crate::common::{EngineContext, PublicState};
use crate::engine::{GameEngine, PrivateState};

const DESCRIPTION: &str = "Decide when and at what price to invest; individual and group \
                           decisions are recorded separately.";

#[derive(Debug, Clone, Serialize)]
pub struct TraderState {
    pub money: i64,
    pub investment_history: Vec<Investment>,
    pub min_trade_price: i64,
    pub max_trade_price: i64,
    pub starting_money: i64,
}

pub struct DayTraderEngine {
    ctx: EngineContext,
}

impl DayTraderEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }
}

impl GameEngine for DayTraderEngine {
    fn description(&self) -> &'static str {
        DESCRIPTION
    }

    fn create_session(&self, researcher_id: &str, config: serde_json::Value) -> Result<Session> {
        self.ctx
            .store
            .create_session(researcher_id, ExperimentType::DayTrader, config)
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
        let me = self.ctx.participant(session_code, participant_code)?;
        Ok(PrivateState::DayTrader(TraderState {
            money: me.money,
            investment_history: self.ctx.store.investment_history(me.participant_id),
            min_trade_price: session.config.min_trade_price,
            max_trade_price: session.config.max_trade_price,
            starting_money: session.config.starting_money,
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

    fn make_investment(
        &self,
        participant_code: &str,
        invest_price: f64,
        decision_type: InvestmentKind,
        session_code: &str,
    ) -> Result<Investment> {
        let session = self.ctx.store.get_session(session_code)?;
        let me = self.ctx.participant(session_code, participant_code)?;
        let min = session.config.min_trade_price as f64;
        let max = session.config.max_trade_price as f64;
        if invest_price < min || invest_price > max {
            return Err(ActionError::new(
                ErrorKind::InvalidPrice,
                format!("investment price {invest_price} is outside the allowed range {min}-{max}"),
            ));
        }
        self.ctx
            .store
            .record_investment(me.participant_id, invest_price, decision_type)
    }

    fn get_investment_history(
        &self,
        participant_code: &str,
        session_code: &str,
    ) -> Result<Vec<Investment>> {
        let me = self.ctx.participant(session_code, participant_code)?;
        Ok(self.ctx.store.investment_history(me.participant_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_store::{Store, TimerBoard};
    use std::sync::Arc;

    fn engine_with_session() -> (DayTraderEngine, String) {
        let ctx = EngineContext::new(Arc::new(Store::new()), Arc::new(TimerBoard::new()));
        let engine = DayTraderEngine::new(ctx);
        let session = engine
            .create_session(
                "r1",
                serde_json::json!({"minTradePrice": 10, "maxTradePrice": 40}),
            )
            .unwrap();
        let code = session.session_code;
        engine
            .add_participant(&code, "T1", ParticipantType::AiAgent)
            .unwrap();
        (engine, code)
    }

    #[test]
    fn investment_is_recorded_and_debited() {
        let (engine, code) = engine_with_session();
        let inv = engine
            .make_investment("T1", 25.0, InvestmentKind::Individual, &code)
            .unwrap();
        assert_eq!(inv.price, 25.0);
        let history = engine.get_investment_history("T1", &code).unwrap();
        assert_eq!(history.len(), 1);
        let me = engine.ctx.participant(&code, "T1").unwrap();
        assert_eq!(me.money, 275);
    }

    #[test]
    fn boundary_prices_are_accepted_outside_rejected() {
        let (engine, code) = engine_with_session();
        engine
            .make_investment("T1", 10.0, InvestmentKind::Individual, &code)
            .unwrap();
        engine
            .make_investment("T1", 40.0, InvestmentKind::Group, &code)
            .unwrap();
        let err = engine
            .make_investment("T1", 9.5, InvestmentKind::Individual, &code)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidPrice);
        let err = engine
            .make_investment("T1", 40.5, InvestmentKind::Individual, &code)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidPrice);
    }

    #[test]
    fn shape_tools_are_unavailable() {
        let (engine, code) = engine_with_session();
        let err = engine.produce_shape("T1", "circle", 1, &code).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
    }
}
