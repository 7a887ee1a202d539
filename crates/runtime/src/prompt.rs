//! System prompt construction.
//!
//! The system prompt is built once per agent from a kind-specific template:
//! identity, personality, the rules of the experiment, the communication
//! policy, and the JSON plan format the reply must carry.

use rand::seq::SliceRandom;
use serde_json::Value;

use orc_domain::{CommunicationLevel, ExperimentType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Personality {
    pub name: &'static str,
    pub description: &'static str,
}

const PERSONALITIES: [Personality; 4] = [
    Personality {
        name: "analytical_planner",
        description: "You think several steps ahead, compare options numerically, and \
                      prefer plans with predictable payoffs.",
    },
    Personality {
        name: "social_negotiator",
        description: "You build rapport first, communicate often, and look for deals \
                      that leave both sides better off.",
    },
    Personality {
        name: "cautious_observer",
        description: "You act only when the evidence is clear, avoid risky trades, and \
                      keep a reserve for emergencies.",
    },
    Personality {
        name: "decisive_opportunist",
        description: "You move fast on good opportunities and would rather correct \
                      course later than miss a window.",
    },
];

/// Pick a random personality profile for a new agent.
pub fn assign_personality() -> Personality {
    *PERSONALITIES
        .choose(&mut rand::thread_rng())
        .expect("profile list is non-empty")
}

fn communication_rules(level: CommunicationLevel) -> &'static str {
    match level {
        CommunicationLevel::Chat => {
            "Messaging: direct messages only. Address each message to one specific \
             participant; broadcast messaging is disabled."
        }
        CommunicationLevel::Broadcast | CommunicationLevel::GroupChat => {
            "Messaging: broadcast only. Every message you send goes to all participants."
        }
        CommunicationLevel::NoChat => {
            "Messaging: disabled. Do not emit message actions; they will be dropped."
        }
    }
}

const PLAN_FORMAT: &str = r#"Reply with a single JSON object of the form:
{"actions": [{"type": "<action type>", ...fields...}, ...]}
An empty actions list is a valid choice when there is nothing worth doing."#;

fn participants_list(public: &Value) -> String {
    public["participants"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|p| p["participant_code"].as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

fn config_i64(public: &Value, key: &str) -> i64 {
    public["experiment_config"][key].as_i64().unwrap_or(0)
}

/// Build the kind-specific system prompt for one agent.
pub fn build_system_prompt(
    experiment_type: &ExperimentType,
    participant_code: &str,
    personality: Personality,
    level: CommunicationLevel,
    private: &Value,
    public: &Value,
) -> String {
    let mut sections = vec![
        format!(
            "You are {participant_code}, an autonomous participant in a research \
             experiment. Personality: {} ({})",
            personality.name, personality.description
        ),
        format!("Other participants: {}.", participants_list(public)),
        communication_rules(level).to_owned(),
    ];

    match experiment_type {
        ExperimentType::ShapeFactory => {
            sections.push(format!(
                "You run a shape factory. Your specialty shape is {} (cost {} each); \
                 other shapes cost {} each to produce. Production takes {} seconds per \
                 unit and you may produce at most {} units in total. Fulfil your orders \
                 to earn {} per order; your orders need shapes you cannot produce as a \
                 specialty, so trade with the others. Trade prices must stay between {} \
                 and {}. Action types: message, propose_trade_offer, trade_response, \
                 cancel_trade_offer, produce_shape, fulfill_order.",
                private["specialty_shape"].as_str().unwrap_or("circle"),
                config_i64(public, "specialtyCost"),
                config_i64(public, "regularCost"),
                config_i64(public, "productionTime"),
                config_i64(public, "maxProductionNum"),
                config_i64(public, "incentiveMoney"),
                config_i64(public, "minTradePrice"),
                config_i64(public, "maxTradePrice"),
            ));
        }
        ExperimentType::DayTrader => {
            sections.push(format!(
                "You are a trader deciding when to invest. Starting money: {}. \
                 Investment prices must stay between {} and {}. Use action type \
                 make_investment with invest_price and invest_decision_type \
                 ('individual' or 'group'); discuss with the group before group \
                 decisions.",
                config_i64(public, "startingMoney"),
                config_i64(public, "minTradePrice"),
                config_i64(public, "maxTradePrice"),
            ));
        }
        ExperimentType::EssayRanking => {
            sections.push(
                "You are ranking essays. Read them with get_assigned_essays and \
                 get_essay_content, then submit_ranking with unique ranks and a short \
                 reasoning per essay. You may refine your ranking with further \
                 submissions."
                    .to_owned(),
            );
        }
        ExperimentType::WordGuessing => {
            let words: Vec<&str> = private["assigned_words"]
                .as_array()
                .map(|list| list.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            if !words.is_empty() {
                sections.push(format!(
                    "You are the hinter. Your secret words, one per round: {}. \
                     Describe the current round's word without ever saying it (or any \
                     part of it); the guesser earns a point for each correct guess.",
                    words.join(", ")
                ));
            } else {
                sections.push(
                    "You are the guesser. Read the hinter's clues and send your best \
                     guess for the secret word as a message."
                        .to_owned(),
                );
            }
        }
        ExperimentType::HiddenProfiles => {
            let candidates = private["candidate_list"]
                .as_array()
                .map(|list| {
                    list.iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            sections.push(format!(
                "You are choosing the best candidate with the group. Candidates: \
                 {candidates}. You hold a private profile; the others hold different \
                 information, so share what you know and listen. Vote with submit_vote; \
                 you can change your vote until the session ends.",
            ));
            if let Some(doc) = private["candidate_document"]["content"].as_str() {
                if !doc.is_empty() {
                    let name = private["candidate_document"]["candidateName"]
                        .as_str()
                        .unwrap_or("a candidate");
                    sections.push(format!("YOUR PRIVATE PROFILE ({name}):\n{doc}"));
                }
            }
            if let Some(info) = private["public_info"].as_str() {
                if !info.is_empty() {
                    sections.push(format!("SHARED BRIEFING (everyone sees this):\n{info}"));
                }
            }
        }
        ExperimentType::Custom(_) => {
            let name = private["experiment_name"].as_str().unwrap_or("");
            let brief = private["experiment_description"].as_str().unwrap_or("");
            let actions: Vec<String> = private["actions"]
                .as_array()
                .map(|list| {
                    list.iter()
                        .filter_map(|a| {
                            let action = a["name"].as_str()?;
                            let inputs: Vec<&str> = a["inputs"]
                                .as_array()
                                .map(|names| {
                                    names.iter().filter_map(Value::as_str).collect()
                                })
                                .unwrap_or_default();
                            Some(format!("{action}({})", inputs.join(", ")))
                        })
                        .collect()
                })
                .unwrap_or_default();
            if actions.is_empty() {
                sections.push(
                    "Follow the researcher's instructions for this session.".to_owned(),
                );
            } else {
                sections.push(format!(
                    "You are in the researcher-defined experiment '{name}'. {brief} \
                     Act with the perform_action action type, naming one of: {}. Your \
                     status updates show your attributes and the shared variables.",
                    actions.join(", ")
                ));
            }
        }
    }

    sections.push(PLAN_FORMAT.to_owned());
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn demo_public() -> Value {
        json!({
            "participants": [
                {"participant_code": "Alice"},
                {"participant_code": "Bob"},
            ],
            "experiment_config": {
                "specialtyCost": 10, "regularCost": 25, "productionTime": 5,
                "maxProductionNum": 6, "incentiveMoney": 50,
                "minTradePrice": 15, "maxTradePrice": 35, "startingMoney": 300,
            }
        })
    }

    #[test]
    fn shapefactory_prompt_names_the_specialty_and_limits() {
        let prompt = build_system_prompt(
            &ExperimentType::ShapeFactory,
            "Alice",
            PERSONALITIES[0],
            CommunicationLevel::Chat,
            &json!({"specialty_shape": "circle"}),
            &demo_public(),
        );
        assert!(prompt.contains("You are Alice"));
        assert!(prompt.contains("specialty shape is circle"));
        assert!(prompt.contains("between 15 and 35"));
        assert!(prompt.contains("broadcast messaging is disabled"));
        assert!(prompt.contains("\"actions\""));
    }

    #[test]
    fn hidden_profiles_prompt_lists_candidates() {
        let prompt = build_system_prompt(
            &ExperimentType::HiddenProfiles,
            "A1",
            PERSONALITIES[1],
            CommunicationLevel::Broadcast,
            &json!({"candidate_list": ["Candidate_X", "Candidate_Y"]}),
            &demo_public(),
        );
        assert!(prompt.contains("Candidate_X, Candidate_Y"));
        assert!(prompt.contains("goes to all participants"));
    }

    #[test]
    fn custom_prompt_names_the_declared_actions() {
        let prompt = build_system_prompt(
            &ExperimentType::Custom("custom_pg".into()),
            "P1",
            PERSONALITIES[3],
            CommunicationLevel::Chat,
            &json!({
                "experiment_name": "public_goods",
                "experiment_description": "Contribute to a shared pot.",
                "actions": [{"name": "contribute", "inputs": ["amount"]}],
            }),
            &demo_public(),
        );
        assert!(prompt.contains("'public_goods'"));
        assert!(prompt.contains("contribute(amount)"));
        assert!(prompt.contains("perform_action"));
    }

    #[test]
    fn word_roles_get_different_briefs() {
        let hinter = build_system_prompt(
            &ExperimentType::WordGuessing,
            "H1",
            PERSONALITIES[2],
            CommunicationLevel::Chat,
            &json!({"assigned_words": ["apple"]}),
            &demo_public(),
        );
        let guesser = build_system_prompt(
            &ExperimentType::WordGuessing,
            "G1",
            PERSONALITIES[2],
            CommunicationLevel::Chat,
            &json!({"assigned_words": []}),
            &demo_public(),
        );
        assert!(hinter.contains("You are the hinter"));
        assert!(guesser.contains("You are the guesser"));
    }
}
