//! The declarative definition of a custom experiment.
//!
//! Researchers describe a `custom_*` experiment as data under the session
//! config's `customExperiment` key: value types, per-participant objects
//! with attributes, session variables, and actions built from preconditions
//! and effects. The grammar is a closed serde model; expressions are
//! structured operands and comparators, never evaluated strings.
//!
//! ```json
//! {
//!   "name": "public_goods",
//!   "types": {"money": {"kind": "scalar", "min": 0}},
//!   "objects": {"wallet": {"attrs": {"balance": {"type": "money", "default": 100}}}},
//!   "variables": {"pot": 0},
//!   "actions": {
//!     "contribute": {
//!       "inputs": {"amount": "money"},
//!       "preconditions": [
//!         {"left": {"attr": {"object": "wallet", "field": "balance"}},
//!          "op": "ge", "right": {"input": "amount"}}
//!       ],
//!       "effects": [
//!         {"dec": {"target": {"attr": {"object": "wallet", "field": "balance"}},
//!                  "by": {"input": "amount"}}},
//!         {"inc": {"target": {"var": "pot"}, "by": {"input": "amount"}}}
//!       ]
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use orc_domain::{ActionError, ErrorKind, Result, SessionConfig};

/// Config key the definition lives under.
pub const CUSTOM_EXPERIMENT_KEY: &str = "customExperiment";

/// A value type: bounded scalar or a closed string set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeDef {
    Scalar {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Enum { values: Vec<String> },
}

/// One attribute of a per-participant object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrDef {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub default: Value,
}

/// A per-participant object: a named bag of typed attributes. Every
/// participant gets one instance at join.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectDef {
    pub attrs: BTreeMap<String, AttrDef>,
}

/// A value source inside preconditions and effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// An attribute of the acting participant's object instance.
    Attr { object: String, field: String },
    /// A session-level variable.
    Var(String),
    /// A value the caller supplied with the action.
    Input(String),
    /// A literal.
    Const(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A guard that must hold before an action's effects run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub left: Operand,
    pub op: Comparator,
    pub right: Operand,
}

/// Where an effect writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Attr { object: String, field: String },
    Var(String),
}

/// One state change. `inc`/`dec` are numeric; `set` takes any value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Set { target: Target, to: Operand },
    Inc { target: Target, by: Operand },
    Dec { target: Target, by: Operand },
}

/// A researcher-declared action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionDef {
    pub description: String,
    /// Input name → type name.
    pub inputs: BTreeMap<String, String>,
    pub preconditions: Vec<Condition>,
    pub effects: Vec<Effect>,
}

/// The complete definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomSpec {
    pub name: String,
    pub description: String,
    pub types: BTreeMap<String, TypeDef>,
    pub objects: BTreeMap<String, ObjectDef>,
    /// Variable name → initial value.
    pub variables: BTreeMap<String, Value>,
    pub actions: BTreeMap<String, ActionDef>,
}

impl CustomSpec {
    /// Read the definition out of a session config. `Ok(None)` when the
    /// session declares none (plain shared-interface behaviour).
    pub fn from_config(config: &SessionConfig) -> Result<Option<CustomSpec>> {
        let Some(raw) = config.extra.get(CUSTOM_EXPERIMENT_KEY) else {
            return Ok(None);
        };
        serde_json::from_value(raw.clone())
            .map(Some)
            .map_err(|e| {
                ActionError::new(
                    ErrorKind::InvalidState,
                    format!("invalid {CUSTOM_EXPERIMENT_KEY} definition: {e}"),
                )
            })
    }

    /// Default value for an attribute: its declared default, else the
    /// type's natural zero (0 for scalars, the first value for enums).
    pub fn attr_default(&self, attr: &AttrDef) -> Value {
        if !attr.default.is_null() {
            return attr.default.clone();
        }
        match self.types.get(&attr.type_name) {
            Some(TypeDef::Enum { values }) => values
                .first()
                .map(|v| Value::String(v.clone()))
                .unwrap_or(Value::Null),
            _ => serde_json::json!(0.0),
        }
    }

    /// The flattened `object.field` key an attribute is stored under.
    pub fn attr_key(object: &str, field: &str) -> String {
        format!("{object}.{field}")
    }

    /// The seed attribute bag for a joining participant.
    pub fn initial_attrs(&self) -> serde_json::Map<String, Value> {
        let mut attrs = serde_json::Map::new();
        for (object_name, object) in &self.objects {
            for (field, attr) in &object.attrs {
                attrs.insert(Self::attr_key(object_name, field), self.attr_default(attr));
            }
        }
        attrs
    }

    /// The seed variable bag for the session.
    pub fn initial_vars(&self) -> serde_json::Map<String, Value> {
        self.variables
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}
