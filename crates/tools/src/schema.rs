//! Tool schemas per experiment kind, emitted in both provider dialects.

use serde_json::{json, Value};

use orc_domain::{ExperimentType, ToolDefinition};

/// Which provider wire format to emit tool specs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolDialect {
    OpenAi,
    Anthropic,
}

fn tool(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_owned(),
        description: description.to_owned(),
        parameters,
    }
}

fn common_tools() -> Vec<ToolDefinition> {
    vec![
        tool(
            "get_game_state",
            "Get your private state, the shared public state, and the communication level.",
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            "send_message",
            "Send a chat message to another participant, or to 'all' when broadcasting is enabled.",
            json!({
                "type": "object",
                "properties": {
                    "recipient": {"type": "string", "description": "Participant code, or 'all'"},
                    "content": {"type": "string", "description": "Message text"}
                },
                "required": ["recipient", "content"]
            }),
        ),
        tool(
            "mark_messages_as_read",
            "Mark messages as read. With no ids, everything unread is marked.",
            json!({
                "type": "object",
                "properties": {
                    "message_ids": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Message ids to mark; omit for all"
                    }
                }
            }),
        ),
    ]
}

fn shapefactory_tools() -> Vec<ToolDefinition> {
    vec![
        tool(
            "create_trade_offer",
            "Offer to buy or sell one shape to a specific participant.",
            json!({
                "type": "object",
                "properties": {
                    "recipient": {"type": "string", "description": "Participant code to trade with"},
                    "offer_type": {"type": "string", "enum": ["buy", "sell"]},
                    "shape": {"type": "string", "description": "Shape to trade"},
                    "price_per_unit": {"type": "integer", "description": "Price within the session's range"}
                },
                "required": ["recipient", "offer_type", "shape", "price_per_unit"]
            }),
        ),
        tool(
            "respond_to_trade_offer",
            "Accept or reject a trade offer you received.",
            json!({
                "type": "object",
                "properties": {
                    "transaction_id": {"type": "string", "description": "Transaction UUID or short id from your pending offers"},
                    "response": {"type": "string", "enum": ["accept", "reject"]}
                },
                "required": ["transaction_id", "response"]
            }),
        ),
        tool(
            "cancel_trade_offer",
            "Cancel a trade offer you proposed.",
            json!({
                "type": "object",
                "properties": {
                    "transaction_id": {"type": "string", "description": "Transaction UUID or short id"}
                },
                "required": ["transaction_id"]
            }),
        ),
        tool(
            "produce_shape",
            "Queue production of shapes. Specialty shapes are cheaper.",
            json!({
                "type": "object",
                "properties": {
                    "shape": {"type": "string"},
                    "quantity": {"type": "integer", "minimum": 1}
                },
                "required": ["shape", "quantity"]
            }),
        ),
        tool(
            "fulfill_orders",
            "Fulfil orders by index, consuming one matching shape from inventory per order.",
            json!({
                "type": "object",
                "properties": {
                    "order_indices": {"type": "array", "items": {"type": "integer"}}
                },
                "required": ["order_indices"]
            }),
        ),
        tool(
            "process_completed_productions",
            "Move finished productions into inventory.",
            json!({"type": "object", "properties": {}}),
        ),
    ]
}

fn daytrader_tools() -> Vec<ToolDefinition> {
    vec![
        tool(
            "make_investment",
            "Record an investment at a price within the session's range.",
            json!({
                "type": "object",
                "properties": {
                    "invest_price": {"type": "number"},
                    "invest_decision_type": {"type": "string", "enum": ["individual", "group"]}
                },
                "required": ["invest_price", "invest_decision_type"]
            }),
        ),
        tool(
            "get_investment_history",
            "List your past investments.",
            json!({"type": "object", "properties": {}}),
        ),
    ]
}

fn essayranking_tools() -> Vec<ToolDefinition> {
    vec![
        tool(
            "submit_ranking",
            "Submit or revise your essay ranking. Ranks must be unique.",
            json!({
                "type": "object",
                "properties": {
                    "rankings": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "essay_id": {"type": "string"},
                                "rank": {"type": "integer", "minimum": 1},
                                "reasoning": {"type": "string"}
                            },
                            "required": ["essay_id", "rank"]
                        }
                    }
                },
                "required": ["rankings"]
            }),
        ),
        tool(
            "get_assigned_essays",
            "List the essays assigned to this session.",
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            "get_essay_content",
            "Fetch one essay's full text.",
            json!({
                "type": "object",
                "properties": {"essay_id": {"type": "string"}},
                "required": ["essay_id"]
            }),
        ),
    ]
}

fn wordguessing_tools() -> Vec<ToolDefinition> {
    vec![tool(
        "get_assigned_words",
        "List your secret words (hinters only).",
        json!({"type": "object", "properties": {}}),
    )]
}

fn hiddenprofiles_tools() -> Vec<ToolDefinition> {
    vec![tool(
        "submit_vote",
        "Vote for a candidate by name. Re-voting overwrites your previous vote.",
        json!({
            "type": "object",
            "properties": {"candidate_name": {"type": "string"}},
            "required": ["candidate_name"]
        }),
    )]
}

fn custom_tools() -> Vec<ToolDefinition> {
    vec![tool(
        "perform_action",
        "Perform one of this experiment's declared actions. Your game state lists the \
         actions and the inputs each one takes.",
        json!({
            "type": "object",
            "properties": {
                "action_name": {"type": "string", "description": "A declared action name"},
                "inputs": {"type": "object", "description": "Input values by name"}
            },
            "required": ["action_name"]
        }),
    )]
}

/// The tool set an agent sees in a session of the given kind.
pub fn tool_definitions(kind: &ExperimentType) -> Vec<ToolDefinition> {
    let mut defs = common_tools();
    match kind {
        ExperimentType::ShapeFactory => defs.extend(shapefactory_tools()),
        ExperimentType::DayTrader => defs.extend(daytrader_tools()),
        ExperimentType::EssayRanking => defs.extend(essayranking_tools()),
        ExperimentType::WordGuessing => defs.extend(wordguessing_tools()),
        ExperimentType::HiddenProfiles => defs.extend(hiddenprofiles_tools()),
        ExperimentType::Custom(_) => defs.extend(custom_tools()),
    }
    defs
}

/// Wire-format tool specs for one provider dialect.
pub fn tool_specs(kind: &ExperimentType, dialect: ToolDialect) -> Vec<Value> {
    tool_definitions(kind)
        .into_iter()
        .map(|def| match dialect {
            ToolDialect::OpenAi => json!({
                "type": "function",
                "function": {
                    "name": def.name,
                    "description": def.description,
                    "parameters": def.parameters,
                }
            }),
            ToolDialect::Anthropic => json!({
                "name": def.name,
                "description": def.description,
                "input_schema": def.parameters,
            }),
        })
        .collect()
}
