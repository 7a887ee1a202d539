//! Translation of a parsed LLM plan into tool calls.
//!
//! This is where loose plan fields become the tool surface's arguments:
//! prices are clamped into the session range, indices are coerced to
//! integers, `decline` becomes `reject`, and the communication level is
//! applied. Under `chat`, a message without a specific recipient is dropped
//! and recorded as a failure: broadcast messaging is disabled in chat mode,
//! and silently re-routing to a random participant is not a substitute.

use serde_json::json;

use orc_domain::{CommunicationLevel, Plan, PlanAction, ToolCallRequest};

/// An action the mapper refused, with the reason recorded as a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedAction {
    pub action: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct MappedPlan {
    pub calls: Vec<ToolCallRequest>,
    pub dropped: Vec<DroppedAction>,
}

/// Map a plan to tool calls under the session's effective communication
/// level and trade price range.
pub fn map_plan_to_tool_calls(
    plan: &Plan,
    level: CommunicationLevel,
    price_range: (i64, i64),
) -> MappedPlan {
    let (price_min, price_max) = price_range;
    let mut mapped = MappedPlan::default();

    for action in &plan.actions {
        match action {
            PlanAction::Message { recipient, content } => {
                if content.is_empty() {
                    continue;
                }
                match level {
                    // Dropped entirely; silence is the policy, not a failure.
                    CommunicationLevel::NoChat => continue,
                    CommunicationLevel::Broadcast | CommunicationLevel::GroupChat => {
                        mapped.calls.push(ToolCallRequest::new(
                            "send_message",
                            json!({"recipient": "all", "content": content}),
                        ));
                    }
                    CommunicationLevel::Chat => match recipient.as_deref() {
                        Some(r) if !r.is_empty() && r != "all" => {
                            mapped.calls.push(ToolCallRequest::new(
                                "send_message",
                                json!({"recipient": r, "content": content}),
                            ));
                        }
                        _ => mapped.dropped.push(DroppedAction {
                            action: "message".into(),
                            reason: "broadcast messaging is disabled in chat mode".into(),
                        }),
                    },
                }
            }
            PlanAction::ProposeTradeOffer {
                target_participant,
                offer_type,
                shape,
                price_per_unit,
            } => {
                let target = target_participant.as_deref().unwrap_or("");
                if target.is_empty() || target == "all" {
                    mapped.dropped.push(DroppedAction {
                        action: "propose_trade_offer".into(),
                        reason: "trade offers need a specific recipient".into(),
                    });
                    continue;
                }
                let price = price_per_unit
                    .map(|p| p.round() as i64)
                    .unwrap_or(20)
                    .clamp(price_min, price_max);
                mapped.calls.push(ToolCallRequest::new(
                    "create_trade_offer",
                    json!({
                        "recipient": target,
                        "offer_type": offer_type,
                        "shape": shape.as_deref().unwrap_or("circle"),
                        "price_per_unit": price,
                    }),
                ));
            }
            PlanAction::TradeResponse {
                transaction_id,
                response,
            } => {
                if transaction_id.is_empty() {
                    continue;
                }
                let response = match response.as_deref().unwrap_or("decline") {
                    "accept" => "accept",
                    // "decline" and anything else normalise to reject.
                    _ => "reject",
                };
                mapped.calls.push(ToolCallRequest::new(
                    "respond_to_trade_offer",
                    json!({"transaction_id": transaction_id, "response": response}),
                ));
            }
            PlanAction::CancelTradeOffer { transaction_id } => {
                if transaction_id.is_empty() {
                    continue;
                }
                mapped.calls.push(ToolCallRequest::new(
                    "cancel_trade_offer",
                    json!({"transaction_id": transaction_id}),
                ));
            }
            PlanAction::ProduceShape { shape, quantity } => {
                let quantity = quantity
                    .map(|q| q.round().max(1.0) as u32)
                    .unwrap_or(1);
                mapped.calls.push(ToolCallRequest::new(
                    "produce_shape",
                    json!({
                        "shape": shape.as_deref().unwrap_or("circle"),
                        "quantity": quantity,
                    }),
                ));
            }
            PlanAction::FulfillOrder { order_indices } => {
                let indices: Vec<u64> = order_indices
                    .iter()
                    .filter_map(|v| {
                        v.as_u64()
                            .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
                            .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
                    })
                    .collect();
                mapped.calls.push(ToolCallRequest::new(
                    "fulfill_orders",
                    json!({"order_indices": indices}),
                ));
            }
            PlanAction::MakeInvestment {
                invest_price,
                invest_decision_type,
            } => {
                let price = invest_price
                    .unwrap_or(0.0)
                    .clamp(price_min as f64, price_max as f64);
                mapped.calls.push(ToolCallRequest::new(
                    "make_investment",
                    json!({
                        "invest_price": price,
                        "invest_decision_type": invest_decision_type
                            .unwrap_or(orc_domain::InvestmentKind::Individual),
                    }),
                ));
            }
            PlanAction::SubmitRanking { rankings } => {
                if rankings.is_empty() {
                    continue;
                }
                mapped.calls.push(ToolCallRequest::new(
                    "submit_ranking",
                    json!({"rankings": rankings}),
                ));
            }
            PlanAction::GetAssignedEssays => {
                mapped
                    .calls
                    .push(ToolCallRequest::new("get_assigned_essays", json!({})));
            }
            PlanAction::GetEssayContent { essay_id } => {
                if essay_id.is_empty() {
                    continue;
                }
                mapped.calls.push(ToolCallRequest::new(
                    "get_essay_content",
                    json!({"essay_id": essay_id}),
                ));
            }
            PlanAction::SubmitVote { candidate_name } => {
                if candidate_name.is_empty() {
                    continue;
                }
                mapped.calls.push(ToolCallRequest::new(
                    "submit_vote",
                    json!({"candidate_name": candidate_name}),
                ));
            }
            PlanAction::PerformAction { action_name, inputs } => {
                if action_name.is_empty() {
                    continue;
                }
                let inputs = if inputs.is_object() {
                    inputs.clone()
                } else {
                    json!({})
                };
                mapped.calls.push(ToolCallRequest::new(
                    "perform_action",
                    json!({"action_name": action_name, "inputs": inputs}),
                ));
            }
        }
    }
    mapped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_of(value: serde_json::Value) -> Plan {
        Plan::from_value(value)
    }

    #[test]
    fn broadcast_mode_rewrites_recipients_to_all() {
        // Scenario S5.
        let plan = plan_of(json!({
            "actions": [{"type": "message", "recipient": "Bob", "content": "hi"}]
        }));
        let mapped = map_plan_to_tool_calls(&plan, CommunicationLevel::Broadcast, (15, 35));
        assert_eq!(mapped.calls.len(), 1);
        assert_eq!(mapped.calls[0].arguments["recipient"], "all");
    }

    #[test]
    fn chat_mode_drops_broadcasts_and_records_the_failure() {
        let plan = plan_of(json!({
            "actions": [
                {"type": "message", "recipient": "all", "content": "hello everyone"},
                {"type": "message", "content": "no recipient"},
                {"type": "message", "recipient": "Bob", "content": "direct"},
            ]
        }));
        let mapped = map_plan_to_tool_calls(&plan, CommunicationLevel::Chat, (15, 35));
        assert_eq!(mapped.calls.len(), 1);
        assert_eq!(mapped.calls[0].arguments["recipient"], "Bob");
        assert_eq!(mapped.dropped.len(), 2);
        assert!(mapped.dropped[0].reason.contains("disabled in chat mode"));
    }

    #[test]
    fn no_chat_drops_messages_without_failures() {
        let plan = plan_of(json!({
            "actions": [{"type": "message", "recipient": "Bob", "content": "hi"}]
        }));
        let mapped = map_plan_to_tool_calls(&plan, CommunicationLevel::NoChat, (15, 35));
        assert!(mapped.calls.is_empty());
        assert!(mapped.dropped.is_empty());
    }

    #[test]
    fn trade_prices_clamp_to_the_session_range() {
        let plan = plan_of(json!({
            "actions": [
                {"type": "propose_trade_offer", "target_participant": "Bob",
                 "offer_type": "sell", "shape": "circle", "price_per_unit": 99},
                {"type": "propose_trade_offer", "target_participant": "Bob",
                 "offer_type": "buy", "shape": "square", "price_per_unit": 1},
            ]
        }));
        let mapped = map_plan_to_tool_calls(&plan, CommunicationLevel::Chat, (15, 35));
        assert_eq!(mapped.calls[0].arguments["price_per_unit"], 35);
        assert_eq!(mapped.calls[1].arguments["price_per_unit"], 15);
    }

    #[test]
    fn decline_normalises_to_reject() {
        let plan = plan_of(json!({
            "actions": [{"type": "trade_response", "transaction_id": "S123-001",
                         "response": "decline"}]
        }));
        let mapped = map_plan_to_tool_calls(&plan, CommunicationLevel::Chat, (15, 35));
        assert_eq!(mapped.calls[0].arguments["response"], "reject");
    }

    #[test]
    fn order_indices_coerce_to_integers() {
        let plan = plan_of(json!({
            "actions": [{"type": "fulfill_order", "order_indices": [0, "1", 2.0, "junk"]}]
        }));
        let mapped = map_plan_to_tool_calls(&plan, CommunicationLevel::Chat, (15, 35));
        assert_eq!(mapped.calls[0].arguments["order_indices"], json!([0, 1, 2]));
    }

    #[test]
    fn investment_price_clamps_and_defaults() {
        let plan = plan_of(json!({
            "actions": [{"type": "make_investment"}]
        }));
        let mapped = map_plan_to_tool_calls(&plan, CommunicationLevel::Chat, (10, 40));
        assert_eq!(mapped.calls[0].arguments["invest_price"], 10.0);
        assert_eq!(mapped.calls[0].arguments["invest_decision_type"], "individual");
    }

    #[test]
    fn perform_action_passes_inputs_through() {
        let plan = plan_of(json!({
            "actions": [
                {"type": "perform_action", "action_name": "contribute",
                 "inputs": {"amount": 20}},
                {"type": "perform_action", "action_name": "wave"},
            ]
        }));
        let mapped = map_plan_to_tool_calls(&plan, CommunicationLevel::Chat, (15, 35));
        assert_eq!(mapped.calls.len(), 2);
        assert_eq!(mapped.calls[0].arguments["inputs"]["amount"], 20);
        assert_eq!(mapped.calls[1].arguments["inputs"], json!({}));
    }

    #[test]
    fn empty_plan_maps_to_no_calls() {
        let mapped = map_plan_to_tool_calls(&Plan::default(), CommunicationLevel::Chat, (15, 35));
        assert!(mapped.calls.is_empty());
        assert!(mapped.dropped.is_empty());
    }
}
