//! The tool dispatcher.
//!
//! `execute_tool_call` stamps the caller's identity over whatever the model
//! supplied (models guess participant codes), applies the session's
//! communication-level policy, catches placeholder transaction ids, and
//! forwards to the session's engine. Results come back as the uniform
//! payloads of the tool table; failures are typed errors, never panics.

use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use orc_domain::{
    ActionError, CommunicationLevel, ErrorKind, InvestmentKind, OfferType, RankingEntry, Result,
};
use orc_engines::{EngineFactory, GameEngine, TradeDecision};

/// The identity stamped onto every dispatched call.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub participant_code: String,
    pub session_code: String,
}

pub struct ToolSurface {
    factory: Arc<EngineFactory>,
}

impl ToolSurface {
    pub fn new(factory: Arc<EngineFactory>) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &Arc<EngineFactory> {
        &self.factory
    }

    /// Execute one tool call on behalf of `caller`. Returns the tool's
    /// payload on success, a typed error otherwise.
    pub fn execute_tool_call(
        &self,
        caller: &CallerIdentity,
        name: &str,
        arguments: &Value,
    ) -> Result<Value> {
        if caller.session_code.is_empty() {
            return Err(ActionError::missing_session_scope(name));
        }
        let session = self
            .factory
            .store()
            .get_session(&caller.session_code)?;
        let engine = self.factory.engine_for(&session.experiment_type);
        let level = session
            .config
            .communication_level
            .effective(&session.experiment_type);

        if let Some(guessed) = arguments.get("participant_code").and_then(Value::as_str) {
            if guessed != caller.participant_code {
                tracing::warn!(
                    guessed,
                    actual = %caller.participant_code,
                    tool = name,
                    "tool call carried a wrong participant_code; overriding"
                );
            }
        }

        match name {
            "get_game_state" => {
                let private_state =
                    engine.get_participant_state(&caller.participant_code, &caller.session_code)?;
                let public_state = engine.get_public_state(&caller.session_code)?;
                Ok(json!({
                    "private_state": private_state,
                    "public_state": public_state,
                    "communication_level": level,
                }))
            }
            "send_message" => {
                let content = require_str(arguments, "content")?;
                let recipient = self.filtered_recipient(arguments, level)?;
                let message = engine.send_message(
                    &caller.participant_code,
                    &recipient,
                    content,
                    &caller.session_code,
                )?;
                Ok(json!({"message_id": message.message_id}))
            }
            "create_trade_offer" => {
                let recipient = require_str(arguments, "recipient")?;
                let offer_type = match require_str(arguments, "offer_type")? {
                    "buy" => OfferType::Buy,
                    "sell" => OfferType::Sell,
                    other => {
                        return Err(ActionError::new(
                            ErrorKind::InvalidState,
                            format!("invalid offer_type '{other}'"),
                        ))
                    }
                };
                let shape = require_str(arguments, "shape")?;
                let price = require_i64(arguments, "price_per_unit")?;
                let tx = engine.create_trade_offer(
                    &caller.participant_code,
                    recipient,
                    offer_type,
                    shape,
                    price,
                    &caller.session_code,
                )?;
                Ok(json!({"transaction_id": tx.transaction_id, "short_id": tx.short_id}))
            }
            "respond_to_trade_offer" => {
                let token = checked_transaction_id(arguments)?;
                let decision: TradeDecision = {
                    let raw = require_str(arguments, "response")?;
                    raw.parse()?
                };
                let tx = engine.respond_to_trade_offer(
                    &caller.participant_code,
                    token,
                    decision,
                    &caller.session_code,
                )?;
                Ok(json!({"transaction_id": tx.transaction_id, "status": tx.status}))
            }
            "cancel_trade_offer" => {
                let token = checked_transaction_id(arguments)?;
                let tx = engine.cancel_trade_offer(
                    &caller.participant_code,
                    token,
                    &caller.session_code,
                )?;
                Ok(json!({"transaction_id": tx.transaction_id}))
            }
            "produce_shape" => {
                let shape = require_str(arguments, "shape")?;
                let quantity = arguments
                    .get("quantity")
                    .and_then(coerce_u32)
                    .unwrap_or(1);
                let entry = engine.produce_shape(
                    &caller.participant_code,
                    shape,
                    quantity,
                    &caller.session_code,
                )?;
                Ok(json!({
                    "production_id": entry.queue_id,
                    "expected_completion": entry.estimated_completion,
                }))
            }
            "fulfill_orders" => {
                let indices = arguments
                    .get("order_indices")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(coerce_usize)
                            .collect::<Vec<usize>>()
                    })
                    .unwrap_or_default();
                let outcome = engine.fulfill_orders(
                    &caller.participant_code,
                    &indices,
                    &caller.session_code,
                )?;
                Ok(json!({
                    "orders_fulfilled": outcome.fulfilled_count,
                    "score_gained": outcome.score_gained,
                    "new_money": outcome.new_money,
                    "new_orders": outcome.new_orders,
                }))
            }
            "process_completed_productions" => {
                let processed = engine.process_completed_productions()?;
                Ok(json!({"processed_count": processed}))
            }
            "mark_messages_as_read" => {
                let count = self.mark_messages_as_read(caller, arguments)?;
                Ok(json!({"messages_marked": count}))
            }
            "make_investment" => {
                let price = arguments
                    .get("invest_price")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| {
                        ActionError::new(ErrorKind::InvalidPrice, "invest_price must be a number")
                    })?;
                let decision = match arguments
                    .get("invest_decision_type")
                    .and_then(Value::as_str)
                    .unwrap_or("individual")
                {
                    "group" => InvestmentKind::Group,
                    _ => InvestmentKind::Individual,
                };
                let investment = engine.make_investment(
                    &caller.participant_code,
                    price,
                    decision,
                    &caller.session_code,
                )?;
                Ok(json!({"investment_id": investment.investment_id}))
            }
            "get_investment_history" => {
                let history = engine
                    .get_investment_history(&caller.participant_code, &caller.session_code)?;
                Ok(json!({"investment_history": history}))
            }
            "submit_ranking" => {
                let rankings: Vec<RankingEntry> = arguments
                    .get("rankings")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e| {
                        ActionError::new(ErrorKind::InvalidState, format!("invalid rankings: {e}"))
                    })?
                    .unwrap_or_default();
                let submission = engine.submit_ranking(
                    &caller.participant_code,
                    rankings,
                    &caller.session_code,
                )?;
                Ok(json!({
                    "submission_id": submission.submission_id,
                    "rankings_count": submission.rankings.len(),
                }))
            }
            "get_assigned_essays" => {
                let essays = engine
                    .get_assigned_essays(&caller.participant_code, &caller.session_code)?;
                Ok(json!({"essays": essays}))
            }
            "get_essay_content" => {
                let essay_id = require_str(arguments, "essay_id")?;
                let essay = engine.get_essay_content(
                    &caller.participant_code,
                    essay_id,
                    &caller.session_code,
                )?;
                Ok(json!({"essay": essay}))
            }
            "get_assigned_words" => {
                let words =
                    engine.get_assigned_words(&caller.participant_code, &caller.session_code)?;
                Ok(json!({"assigned_words": words}))
            }
            "submit_vote" => {
                let candidate = require_str(arguments, "candidate_name")?;
                let stored = engine.submit_vote(
                    &caller.participant_code,
                    candidate,
                    &caller.session_code,
                )?;
                Ok(json!({"candidate_name": stored}))
            }
            "perform_action" => {
                let action_name = require_str(arguments, "action_name")?;
                let inputs = arguments.get("inputs").cloned().unwrap_or(json!({}));
                engine.perform_action(
                    &caller.participant_code,
                    action_name,
                    &inputs,
                    &caller.session_code,
                )
            }
            other => Err(ActionError::new(
                ErrorKind::InvalidState,
                format!("unknown tool: {other}"),
            )),
        }
    }

    /// Apply the communication-level policy to a `send_message` recipient.
    fn filtered_recipient(&self, arguments: &Value, level: CommunicationLevel) -> Result<String> {
        let recipient = arguments
            .get("recipient")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_owned();
        match level {
            CommunicationLevel::NoChat => Err(ActionError::new(
                ErrorKind::CommunicationLevelViolation,
                "messaging is disabled in this session",
            )),
            CommunicationLevel::Broadcast => Ok("all".to_owned()),
            CommunicationLevel::Chat | CommunicationLevel::GroupChat => {
                if recipient.is_empty() || recipient == "all" {
                    Err(ActionError::new(
                        ErrorKind::CommunicationLevelViolation,
                        "broadcast messaging is disabled in chat mode",
                    ))
                } else {
                    Ok(recipient)
                }
            }
        }
    }

    fn mark_messages_as_read(&self, caller: &CallerIdentity, arguments: &Value) -> Result<usize> {
        let store = self.factory.store();
        let me = store.get_participant(&caller.session_code, &caller.participant_code)?;
        let ids: Option<Vec<Uuid>> = arguments
            .get("message_ids")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|s| Uuid::parse_str(s).ok())
                    .collect()
            });

        // Direct messages flip to read; broadcasts record this reader and
        // flip to read once the whole session has seen them.
        let mut count = store.mark_messages_read(
            &caller.session_code,
            me.participant_id,
            ids.as_deref(),
        );
        let broadcasts: Vec<Uuid> = match &ids {
            Some(ids) => ids.clone(),
            None => store
                .unread_messages_for(&caller.session_code, me.participant_id)
                .into_iter()
                .filter(|m| m.is_broadcast())
                .map(|m| m.message_id)
                .collect(),
        };
        for message_id in broadcasts {
            if let Ok(message) = store.get_message(message_id) {
                if message.is_broadcast() {
                    store.mark_broadcast_seen(message_id, me.participant_id)?;
                    store.maybe_mark_broadcast_read(message_id)?;
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

fn require_str<'a>(arguments: &'a Value, field: &str) -> Result<&'a str> {
    arguments
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ActionError::new(
                ErrorKind::InvalidState,
                format!("missing required field '{field}'"),
            )
        })
}

fn require_i64(arguments: &Value, field: &str) -> Result<i64> {
    arguments
        .get(field)
        .and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_f64().map(|f| f.round() as i64))
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        })
        .ok_or_else(|| {
            ActionError::new(
                ErrorKind::InvalidState,
                format!("missing or non-numeric field '{field}'"),
            )
        })
}

fn coerce_u32(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .or_else(|| value.as_f64().map(|f| f.round() as u64))
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .map(|n| n as u32)
}

fn coerce_usize(value: &Value) -> Option<usize> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .map(|n| n as usize)
}

/// Transaction-id templates models copy verbatim out of the prompt.
fn checked_transaction_id(arguments: &Value) -> Result<&str> {
    let token = require_str(arguments, "transaction_id")?;
    if token == "transaction_id" || token.contains("transaction_id_from_pending_offers") {
        return Err(ActionError::new(
            ErrorKind::InvalidState,
            format!("'{token}' is a placeholder, not a real transaction id"),
        ));
    }
    Ok(token)
}
