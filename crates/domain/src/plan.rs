//! The LLM plan format: a JSON object with a top-level `actions` list.
//!
//! Plan actions are a closed tagged union. Unknown action types (or actions
//! missing required fields) are skipped with a warning rather than failing
//! the whole plan; a partially usable plan still drives the agent.

use serde::{Deserialize, Serialize};

use crate::entity::{InvestmentKind, OfferType, RankingEntry};

/// One action from an LLM plan. Field shapes are forgiving: the mapper in
/// the runtime coerces numerics, clamps prices and fills defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanAction {
    Message {
        #[serde(default)]
        recipient: Option<String>,
        #[serde(default)]
        content: String,
    },
    ProposeTradeOffer {
        #[serde(default)]
        target_participant: Option<String>,
        #[serde(default)]
        offer_type: OfferType,
        #[serde(default)]
        shape: Option<String>,
        #[serde(default)]
        price_per_unit: Option<f64>,
    },
    TradeResponse {
        #[serde(alias = "offer_id")]
        transaction_id: String,
        #[serde(default, alias = "response_type")]
        response: Option<String>,
    },
    CancelTradeOffer {
        #[serde(alias = "offer_id")]
        transaction_id: String,
    },
    ProduceShape {
        #[serde(default)]
        shape: Option<String>,
        #[serde(default)]
        quantity: Option<f64>,
    },
    FulfillOrder {
        #[serde(default)]
        order_indices: Vec<serde_json::Value>,
    },
    MakeInvestment {
        #[serde(default)]
        invest_price: Option<f64>,
        #[serde(default)]
        invest_decision_type: Option<InvestmentKind>,
    },
    SubmitRanking {
        #[serde(default)]
        rankings: Vec<RankingEntry>,
    },
    GetAssignedEssays,
    GetEssayContent {
        essay_id: String,
    },
    SubmitVote {
        candidate_name: String,
    },
    /// Declarative custom experiments: invoke one of the actions the
    /// researcher declared for this session.
    PerformAction {
        action_name: String,
        #[serde(default)]
        inputs: serde_json::Value,
    },
}

/// A parsed plan: the actions the agent wants to take this tick. An empty
/// list is a valid choice (silence) and must be preserved as such.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    pub actions: Vec<PlanAction>,
}

impl Plan {
    /// Parse a plan from a JSON value. Non-object input, a missing or
    /// non-array `actions` key, and unrecognised entries all degrade to the
    /// empty plan rather than an error.
    pub fn from_value(value: serde_json::Value) -> Plan {
        let actions = match value.get("actions") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|item| match serde_json::from_value(item.clone()) {
                    Ok(action) => Some(action),
                    Err(err) => {
                        tracing::warn!(
                            action = %item,
                            error = %err,
                            "skipping unrecognised plan action"
                        );
                        None
                    }
                })
                .collect(),
            _ => Vec::new(),
        };
        Plan { actions }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
