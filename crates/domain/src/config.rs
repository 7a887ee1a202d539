//! The per-session experiment configuration bag.
//!
//! Researchers supply a partial JSON object; unknown keys are preserved in
//! `extra` so kind-specific sub-configs survive a round trip. Defaults match
//! the values sessions are seeded with when the researcher provides nothing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{CommunicationLevel, Initiative};

/// A candidate document assigned to a HiddenProfiles participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDocument {
    pub candidate_name: String,
    #[serde(default)]
    pub content: String,
}

/// HiddenProfiles sub-config: the candidate roster, the overwritable vote
/// map, per-participant scheduling class, the shared public document, and
/// each participant's private candidate document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HiddenProfilesConfig {
    pub candidate_names: Vec<String>,
    pub votes: BTreeMap<String, String>,
    pub participant_initiatives: BTreeMap<String, Initiative>,
    pub public_info: Option<String>,
    pub assigned_documents: BTreeMap<String, CandidateDocument>,
}

/// The session config bag. Field names follow the persisted camelCase keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub total_rounds: u32,
    /// Round length in minutes.
    pub round_duration: f64,
    pub max_participants: u32,
    pub shapes: Vec<String>,
    pub num_shape_types: usize,
    /// Number of order entries generated per participant.
    pub shapes_per_order: usize,
    pub min_trade_price: i64,
    pub max_trade_price: i64,
    pub incentive_money: i64,
    pub max_production_num: u32,
    pub specialty_cost: i64,
    pub regular_cost: i64,
    /// Seconds per produced unit.
    pub production_time: i64,
    pub starting_money: i64,
    /// Active-agent tick interval in seconds (before jitter).
    pub agent_perception_time_window: u64,
    pub communication_level: CommunicationLevel,
    pub awareness_dashboard: bool,
    pub hidden_profiles: HiddenProfilesConfig,
    /// Kind-specific keys we do not model explicitly.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            total_rounds: 5,
            round_duration: 15.0,
            max_participants: 20,
            shapes: vec![
                "square".into(),
                "circle".into(),
                "triangle".into(),
                "diamond".into(),
                "hexagon".into(),
            ],
            num_shape_types: 5,
            shapes_per_order: 3,
            min_trade_price: 15,
            max_trade_price: 100,
            incentive_money: 60,
            max_production_num: 3,
            specialty_cost: 8,
            regular_cost: 25,
            production_time: 5,
            starting_money: 300,
            agent_perception_time_window: 15,
            communication_level: CommunicationLevel::Chat,
            awareness_dashboard: false,
            hidden_profiles: HiddenProfilesConfig::default(),
            extra: serde_json::Map::new(),
        }
    }
}

impl SessionConfig {
    /// Merge researcher-provided overrides over the defaults. Unknown keys
    /// land in `extra`; a malformed known key is dropped (with a warning)
    /// while the remaining overrides still apply.
    pub fn merged(overrides: serde_json::Value) -> Self {
        let serde_json::Value::Object(map) = overrides else {
            return Self::default();
        };
        let mut base = match serde_json::to_value(Self::default()) {
            Ok(serde_json::Value::Object(base)) => base,
            _ => return Self::default(),
        };
        for (key, value) in map {
            let previous = base.insert(key.clone(), value);
            if serde_json::from_value::<Self>(serde_json::Value::Object(base.clone())).is_err() {
                tracing::warn!(key = %key, "ignoring malformed config override");
                match previous {
                    Some(old) => base.insert(key, old),
                    None => base.remove(&key),
                };
            }
        }
        serde_json::from_value(serde_json::Value::Object(base)).unwrap_or_default()
    }

    /// Shapes available to this session, truncated to `numShapeTypes`.
    pub fn available_shapes(&self) -> &[String] {
        let n = self.num_shape_types.min(self.shapes.len());
        &self.shapes[..n]
    }
}
