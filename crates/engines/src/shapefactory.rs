//! The ShapeFactory engine: production, trade, and order fulfilment.

use chrono::Utc;
use serde::Serialize;

use orc_domain::{
    ActionError, ErrorKind, ExperimentType, Message, OfferType, Participant, ParticipantType,
    ProductionEntry, ProductionStatus, Result, Session, Transaction, TransactionStatus,
};
use orc_store::FulfillOutcome;

use crate::common::{EngineContext, PublicState};
use crate::engine::{GameEngine, PrivateState, TradeDecision};

const DESCRIPTION: &str = "Produce shapes, trade with other participants, and fulfil your \
                           orders to earn incentive money.";

/// A production queue row as shown to the owning participant.
#[derive(Debug, Clone, Serialize)]
pub struct ProductionView {
    pub production_id: uuid::Uuid,
    pub shape: String,
    pub quantity: u32,
    pub status: ProductionStatus,
    pub expected_completion: chrono::DateTime<Utc>,
    /// Seconds left, only for the in-progress entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<i64>,
}

/// A trade offer as shown to one side of it.
#[derive(Debug, Clone, Serialize)]
pub struct OfferView {
    pub transaction_id: uuid::Uuid,
    pub short_id: String,
    pub offer_type: OfferType,
    pub shape: String,
    pub quantity: u32,
    pub price_per_unit: i64,
    pub counterparty: String,
    pub status: TransactionStatus,
    /// True when this participant proposed the offer.
    pub proposed_by_me: bool,
}

/// Private view for a ShapeFactory participant.
#[derive(Debug, Clone, Serialize)]
pub struct FactoryState {
    pub money: i64,
    pub specialty_shape: String,
    pub inventory: Vec<String>,
    pub orders: Vec<String>,
    pub orders_completed: u32,
    pub total_orders: u32,
    pub completion_percentage: u32,
    pub specialty_production_used: u32,
    pub production_queue: Vec<ProductionView>,
    pub pending_offers_sent: Vec<OfferView>,
    pub pending_offers_received: Vec<OfferView>,
    pub recent_trades: Vec<OfferView>,
}

pub struct ShapeFactoryEngine {
    ctx: EngineContext,
}

impl ShapeFactoryEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    fn offer_views(&self, session: &Session, me: &Participant) -> (Vec<OfferView>, Vec<OfferView>, Vec<OfferView>) {
        let code_of = |id: uuid::Uuid| {
            self.ctx
                .store
                .participant_by_id(id)
                .map(|p| p.participant_code)
                .unwrap_or_else(|_| "unknown".to_owned())
        };
        let mut sent = Vec::new();
        let mut received = Vec::new();
        let mut recent = Vec::new();
        for tx in self.ctx.store.list_transactions(&session.session_code) {
            let mine = tx.proposer == me.participant_id;
            let involved = mine || tx.recipient == me.participant_id;
            if !involved {
                continue;
            }
            let counterparty = if mine {
                code_of(tx.recipient)
            } else {
                code_of(tx.proposer)
            };
            let view = OfferView {
                transaction_id: tx.transaction_id,
                short_id: tx.short_id.clone(),
                offer_type: tx.offer_type,
                shape: tx.shape.clone(),
                quantity: tx.quantity,
                price_per_unit: tx.price_per_unit,
                counterparty,
                status: tx.status,
                proposed_by_me: mine,
            };
            match tx.status {
                TransactionStatus::Proposed if mine => sent.push(view),
                TransactionStatus::Proposed => received.push(view),
                TransactionStatus::Completed => recent.push(view),
                TransactionStatus::Cancelled => {}
            }
        }
        (sent, received, recent)
    }
}

impl GameEngine for ShapeFactoryEngine {
    fn description(&self) -> &'static str {
        DESCRIPTION
    }

    fn create_session(&self, researcher_id: &str, config: serde_json::Value) -> Result<Session> {
        self.ctx
            .store
            .create_session(researcher_id, ExperimentType::ShapeFactory, config)
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
        let orders = self.ctx.store.ensure_orders(me.participant_id)?;
        let now = Utc::now();

        let production_queue = self
            .ctx
            .store
            .production_queue(me.participant_id)
            .into_iter()
            .map(|entry| ProductionView {
                production_id: entry.queue_id,
                shape: entry.shape,
                quantity: entry.quantity,
                status: entry.status,
                expected_completion: entry.estimated_completion,
                time_remaining: (entry.status == ProductionStatus::InProgress).then(|| {
                    (entry.estimated_completion - now).num_seconds().max(0)
                }),
            })
            .collect();

        let (pending_offers_sent, pending_offers_received, recent_trades) =
            self.offer_views(&session, &me);

        let orders_completed = me.orders_completed;
        let total_orders = orders_completed + orders.len() as u32;
        let completion_percentage = if total_orders > 0 {
            orders_completed * 100 / total_orders
        } else {
            0
        };

        Ok(PrivateState::ShapeFactory(FactoryState {
            money: me.money,
            specialty_shape: me
                .specialty_shape
                .clone()
                .unwrap_or_else(|| "circle".to_owned()),
            inventory: self.ctx.store.inventory(me.participant_id),
            orders,
            orders_completed,
            total_orders,
            completion_percentage,
            specialty_production_used: me.specialty_production_used,
            production_queue,
            pending_offers_sent,
            pending_offers_received,
            recent_trades,
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

    fn produce_shape(
        &self,
        participant_code: &str,
        shape: &str,
        quantity: u32,
        session_code: &str,
    ) -> Result<ProductionEntry> {
        let session = self.ctx.store.get_session(session_code)?;
        let me = self.ctx.participant(session_code, participant_code)?;
        if quantity == 0 {
            return Err(ActionError::new(
                ErrorKind::InvalidQuantity,
                "quantity must be at least 1",
            ));
        }
        if !session.config.available_shapes().iter().any(|s| s == shape) {
            return Err(ActionError::new(
                ErrorKind::InvalidShape,
                format!("'{shape}' is not a shape in this session"),
            ));
        }

        let cost_per_unit = if me.specialty_shape.as_deref() == Some(shape) {
            session.config.specialty_cost
        } else {
            session.config.regular_cost
        };
        self.ctx.store.enqueue_production(
            me.participant_id,
            shape,
            quantity,
            session.config.production_time,
            cost_per_unit * i64::from(quantity),
            session.config.max_production_num,
        )
    }

    fn process_completed_productions(&self) -> Result<usize> {
        Ok(self.ctx.store.promote_completed_productions(Utc::now()).len())
    }

    fn start_next_production(
        &self,
        participant_code: &str,
        session_code: &str,
    ) -> Result<Option<ProductionEntry>> {
        let me = self.ctx.participant(session_code, participant_code)?;
        self.ctx.store.start_next_production(me.participant_id)
    }

    fn create_trade_offer(
        &self,
        participant_code: &str,
        recipient: &str,
        offer_type: OfferType,
        shape: &str,
        price_per_unit: i64,
        session_code: &str,
    ) -> Result<Transaction> {
        let session = self.ctx.store.get_session(session_code)?;
        let me = self.ctx.participant(session_code, participant_code)?;
        if recipient == "all" {
            return Err(ActionError::new(
                ErrorKind::InvalidState,
                "trade offers must name a specific participant",
            ));
        }
        if price_per_unit < session.config.min_trade_price
            || price_per_unit > session.config.max_trade_price
        {
            return Err(ActionError::new(
                ErrorKind::InvalidPrice,
                format!(
                    "price {price_per_unit} is outside the allowed range {}-{}",
                    session.config.min_trade_price, session.config.max_trade_price
                ),
            ));
        }
        let recipient_id = self.ctx.store.resolve_recipient(session_code, recipient)?;
        self.ctx.store.create_transaction(
            session_code,
            me.participant_id,
            recipient_id,
            offer_type,
            shape,
            1,
            price_per_unit,
        )
    }

    fn respond_to_trade_offer(
        &self,
        participant_code: &str,
        transaction_id: &str,
        decision: TradeDecision,
        session_code: &str,
    ) -> Result<Transaction> {
        let me = self.ctx.participant(session_code, participant_code)?;
        let resolved = self
            .ctx
            .store
            .resolve_transaction(session_code, transaction_id)?;
        match decision {
            TradeDecision::Accept => self.ctx.store.accept_trade(resolved, me.participant_id),
            TradeDecision::Reject => self.ctx.store.reject_trade(resolved),
        }
    }

    fn cancel_trade_offer(
        &self,
        participant_code: &str,
        transaction_id: &str,
        session_code: &str,
    ) -> Result<Transaction> {
        let me = self.ctx.participant(session_code, participant_code)?;
        let resolved = self
            .ctx
            .store
            .resolve_transaction(session_code, transaction_id)?;
        self.ctx.store.cancel_trade(resolved, me.participant_id)
    }

    fn fulfill_orders(
        &self,
        participant_code: &str,
        order_indices: &[usize],
        session_code: &str,
    ) -> Result<FulfillOutcome> {
        let session = self.ctx.store.get_session(session_code)?;
        let me = self.ctx.participant(session_code, participant_code)?;
        self.ctx.store.ensure_orders(me.participant_id)?;
        self.ctx.store.fulfill_orders(
            me.participant_id,
            order_indices,
            session.config.incentive_money,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_store::{Store, TimerBoard};
    use std::sync::Arc;

    fn engine_with_session() -> (ShapeFactoryEngine, String) {
        let ctx = EngineContext::new(Arc::new(Store::new()), Arc::new(TimerBoard::new()));
        let engine = ShapeFactoryEngine::new(ctx);
        let session = engine
            .create_session(
                "researcher1",
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
        let code = session.session_code;
        engine
            .add_participant(&code, "Alice", ParticipantType::AiAgent)
            .unwrap();
        engine
            .add_participant(&code, "Bob", ParticipantType::AiAgent)
            .unwrap();
        (engine, code)
    }

    #[test]
    fn trade_happy_path_settles_money_and_inventory() {
        // Scenario S1: Alice produces 4 circles... her specialty is square
        // under round-robin assignment, so produce squares at specialty cost
        // and trade them the same way.
        let (engine, code) = engine_with_session();
        let entry = engine.produce_shape("Alice", "square", 4, &code).unwrap();
        assert_eq!(entry.status, ProductionStatus::InProgress);

        // 4 units x 5s: promote after the window has passed.
        engine
            .ctx
            .store
            .promote_completed_productions(Utc::now() + chrono::Duration::seconds(21));
        let alice = engine.ctx.participant(&code, "Alice").unwrap();
        assert_eq!(alice.money, 260); // 300 - 4 x 10
        assert_eq!(engine.ctx.store.count_in_inventory(alice.participant_id, "square"), 4);

        let tx = engine
            .create_trade_offer("Alice", "Bob", OfferType::Sell, "square", 20, &code)
            .unwrap();
        assert!(tx.short_id.starts_with('S'));
        let done = engine
            .respond_to_trade_offer("Bob", &tx.short_id, TradeDecision::Accept, &code)
            .unwrap();
        assert_eq!(done.status, TransactionStatus::Completed);

        let alice = engine.ctx.participant(&code, "Alice").unwrap();
        let bob = engine.ctx.participant(&code, "Bob").unwrap();
        assert_eq!(alice.money, 280); // 260 + 20
        assert_eq!(bob.money, 280); // 300 - 20
        assert_eq!(engine.ctx.store.count_in_inventory(alice.participant_id, "square"), 3);
        assert_eq!(engine.ctx.store.count_in_inventory(bob.participant_id, "square"), 1);
    }

    #[test]
    fn price_bounds_are_inclusive() {
        let (engine, code) = engine_with_session();
        let alice = engine.ctx.participant(&code, "Alice").unwrap();
        engine.ctx.store.deposit_shapes(alice.participant_id, "square", 3);

        for price in [15, 35] {
            engine
                .create_trade_offer("Alice", "Bob", OfferType::Sell, "square", price, &code)
                .unwrap();
        }
        for price in [14, 36] {
            let err = engine
                .create_trade_offer("Alice", "Bob", OfferType::Sell, "square", price, &code)
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidPrice);
        }
    }

    #[test]
    fn offers_to_all_are_rejected() {
        let (engine, code) = engine_with_session();
        let err = engine
            .create_trade_offer("Alice", "all", OfferType::Buy, "circle", 20, &code)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
    }

    #[test]
    fn unknown_shape_is_invalid() {
        let (engine, code) = engine_with_session();
        let err = engine.produce_shape("Alice", "dodecahedron", 1, &code).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidShape);
    }

    #[test]
    fn private_state_contains_orders_and_pending_offers() {
        let (engine, code) = engine_with_session();
        let alice = engine.ctx.participant(&code, "Alice").unwrap();
        engine.ctx.store.deposit_shapes(alice.participant_id, "square", 1);
        engine
            .create_trade_offer("Alice", "Bob", OfferType::Sell, "square", 20, &code)
            .unwrap();

        let PrivateState::ShapeFactory(state) =
            engine.get_participant_state("Alice", &code).unwrap()
        else {
            panic!("wrong private state kind");
        };
        assert_eq!(state.orders.len(), 4);
        assert_eq!(state.pending_offers_sent.len(), 1);
        assert!(state.pending_offers_sent[0].proposed_by_me);
        assert_eq!(state.pending_offers_sent[0].counterparty, "Bob");

        let PrivateState::ShapeFactory(bob_state) =
            engine.get_participant_state("Bob", &code).unwrap()
        else {
            panic!("wrong private state kind");
        };
        assert_eq!(bob_state.pending_offers_received.len(), 1);
        assert!(!bob_state.pending_offers_received[0].proposed_by_me);
    }

    #[test]
    fn produce_queue_ordering_matches_queue_discipline() {
        // Scenario S6: two productions; the first runs, the second queues
        // and is never auto-advanced.
        let (engine, code) = engine_with_session();
        let first = engine.produce_shape("Alice", "circle", 2, &code).unwrap();
        let second = engine.produce_shape("Alice", "square", 1, &code).unwrap();
        assert_eq!(first.status, ProductionStatus::InProgress);
        assert_eq!(second.status, ProductionStatus::Queued);
        let lag = (second.estimated_completion - first.started_at).num_seconds();
        assert_eq!(lag, 15);

        engine
            .ctx
            .store
            .promote_completed_productions(Utc::now() + chrono::Duration::seconds(11));
        let alice = engine.ctx.participant(&code, "Alice").unwrap();
        let queue = engine.ctx.store.production_queue(alice.participant_id);
        assert_eq!(queue[1].status, ProductionStatus::Queued);

        let started = engine.start_next_production("Alice", &code).unwrap().unwrap();
        assert_eq!(started.shape, "square");
    }
}
