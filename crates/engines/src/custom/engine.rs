//! The engine serving `custom_*` experiment kinds.
//!
//! Shared interface (views, messaging, lifecycle) plus an interpreter for
//! the session's declarative definition: `perform_action` checks the
//! action's preconditions against the actor's attributes, the session
//! variables and the supplied inputs, then applies its effects atomically.
//! Sessions without a definition still get the shared interface; their
//! kind-specific tools fail typed.

use serde::Serialize;
use serde_json::{Map, Value};

use orc_domain::{
    ActionError, ErrorKind, ExperimentType, Message, Participant, ParticipantType, Result,
    Session, SessionConfig,
};

use crate::common::{EngineContext, PublicState};
use crate::custom::spec::{
    ActionDef, Comparator, CustomSpec, Effect, Operand, Target, TypeDef,
};
use crate::custom::validate::{validate, IssueSeverity};
use crate::engine::{GameEngine, PrivateState};

const DESCRIPTION: &str = "A researcher-defined experiment; its actions are declared in the \
                           session configuration.";

/// One declared action, as shown to the participant.
#[derive(Debug, Clone, Serialize)]
pub struct CustomActionView {
    pub name: String,
    pub description: String,
    pub inputs: Vec<String>,
}

/// Private view for a custom-experiment participant.
#[derive(Debug, Clone, Serialize)]
pub struct CustomState {
    pub money: i64,
    pub experiment_name: String,
    pub experiment_description: String,
    pub attributes: Map<String, Value>,
    pub variables: Map<String, Value>,
    pub actions: Vec<CustomActionView>,
}

pub struct CustomEngine {
    ctx: EngineContext,
    kind: ExperimentType,
}

impl CustomEngine {
    pub fn new(ctx: EngineContext, kind: ExperimentType) -> Self {
        Self { ctx, kind }
    }

    fn spec_for(&self, config: &SessionConfig) -> Result<Option<CustomSpec>> {
        CustomSpec::from_config(config)
    }
}

// ── Evaluation ─────────────────────────────────────────────────────

struct Env<'a> {
    spec: &'a CustomSpec,
    attrs: Map<String, Value>,
    vars: Map<String, Value>,
    inputs: &'a Map<String, Value>,
}

impl Env<'_> {
    fn resolve(&self, operand: &Operand) -> Result<Value> {
        match operand {
            Operand::Attr { object, field } => Ok(self
                .attrs
                .get(&CustomSpec::attr_key(object, field))
                .cloned()
                .unwrap_or(Value::Null)),
            Operand::Var(name) => Ok(self.vars.get(name).cloned().unwrap_or(Value::Null)),
            Operand::Input(name) => self.inputs.get(name).cloned().ok_or_else(|| {
                ActionError::new(ErrorKind::InvalidState, format!("missing input '{name}'"))
            }),
            Operand::Const(value) => Ok(value.clone()),
        }
    }

    fn write(&mut self, target: &Target, value: Value) -> Result<()> {
        match target {
            Target::Attr { object, field } => {
                // Scalar bounds declared on the attribute's type gate the
                // write, not just the action's preconditions.
                if let Some(attr) = self
                    .spec
                    .objects
                    .get(object)
                    .and_then(|o| o.attrs.get(field))
                {
                    if let (Some(TypeDef::Scalar { min, max }), Some(number)) =
                        (self.spec.types.get(&attr.type_name), value.as_f64())
                    {
                        if min.map(|m| number < m).unwrap_or(false)
                            || max.map(|m| number > m).unwrap_or(false)
                        {
                            return Err(ActionError::new(
                                ErrorKind::InvalidState,
                                format!("{object}.{field} would leave its declared range"),
                            ));
                        }
                    }
                }
                self.attrs.insert(CustomSpec::attr_key(object, field), value);
            }
            Target::Var(name) => {
                self.vars.insert(name.clone(), value);
            }
        }
        Ok(())
    }

    fn current(&self, target: &Target) -> Value {
        match target {
            Target::Attr { object, field } => self
                .attrs
                .get(&CustomSpec::attr_key(object, field))
                .cloned()
                .unwrap_or(Value::Null),
            Target::Var(name) => self.vars.get(name).cloned().unwrap_or(Value::Null),
        }
    }
}

fn numeric(value: &Value, site: &str) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        ActionError::new(
            ErrorKind::InvalidState,
            format!("{site} is not numeric: {value}"),
        )
    })
}

fn compare(op: Comparator, left: &Value, right: &Value) -> Result<bool> {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return Ok(match op {
            Comparator::Eq => l == r,
            Comparator::Ne => l != r,
            Comparator::Lt => l < r,
            Comparator::Le => l <= r,
            Comparator::Gt => l > r,
            Comparator::Ge => l >= r,
        });
    }
    match op {
        Comparator::Eq => Ok(left == right),
        Comparator::Ne => Ok(left != right),
        _ => Err(ActionError::new(
            ErrorKind::InvalidState,
            format!("cannot order non-numeric values {left} and {right}"),
        )),
    }
}

fn describe_operand(operand: &Operand) -> String {
    match operand {
        Operand::Attr { object, field } => format!("{object}.{field}"),
        Operand::Var(name) => format!("variables.{name}"),
        Operand::Input(name) => format!("input.{name}"),
        Operand::Const(value) => value.to_string(),
    }
}

fn check_input(type_def: &TypeDef, name: &str, value: &Value) -> Result<()> {
    match type_def {
        TypeDef::Scalar { min, max } => {
            let number = numeric(value, &format!("input '{name}'"))?;
            if min.map(|m| number < m).unwrap_or(false)
                || max.map(|m| number > m).unwrap_or(false)
            {
                return Err(ActionError::new(
                    ErrorKind::InvalidState,
                    format!("input '{name}' ({number}) is outside its declared range"),
                ));
            }
        }
        TypeDef::Enum { values } => {
            let text = value.as_str().ok_or_else(|| {
                ActionError::new(
                    ErrorKind::InvalidState,
                    format!("input '{name}' must be one of {values:?}"),
                )
            })?;
            if !values.iter().any(|v| v == text) {
                return Err(ActionError::new(
                    ErrorKind::InvalidState,
                    format!("input '{name}': '{text}' is not one of {values:?}"),
                ));
            }
        }
    }
    Ok(())
}

impl GameEngine for CustomEngine {
    fn description(&self) -> &'static str {
        DESCRIPTION
    }

    /// Create the session, validating any declared definition first. A
    /// definition with errors rejects the session; warnings are logged.
    fn create_session(&self, researcher_id: &str, config: serde_json::Value) -> Result<Session> {
        let merged = SessionConfig::merged(config.clone());
        if let Some(spec) = self.spec_for(&merged)? {
            let issues = validate(&spec);
            for issue in issues
                .iter()
                .filter(|i| i.severity == IssueSeverity::Warning)
            {
                tracing::warn!(experiment = %spec.name, "definition: {issue}");
            }
            let errors: Vec<String> = issues
                .into_iter()
                .filter(|i| i.severity == IssueSeverity::Error)
                .map(|i| i.message)
                .collect();
            if !errors.is_empty() {
                return Err(ActionError::new(
                    ErrorKind::InvalidState,
                    format!("invalid experiment definition: {}", errors.join("; ")),
                ));
            }
            let session = self
                .ctx
                .store
                .create_session(researcher_id, self.kind.clone(), config)?;
            self.ctx
                .store
                .init_custom_vars(&session.session_code, spec.initial_vars());
            return Ok(session);
        }
        self.ctx
            .store
            .create_session(researcher_id, self.kind.clone(), config)
    }

    fn add_participant(
        &self,
        session_code: &str,
        participant_code: &str,
        kind: ParticipantType,
    ) -> Result<Participant> {
        let session = self.ctx.store.get_session(session_code)?;
        let participant = self
            .ctx
            .store
            .add_participant(session_code, participant_code, kind)?;
        if let Some(spec) = self.spec_for(&session.config)? {
            self.ctx
                .store
                .init_custom_attrs(participant.participant_id, spec.initial_attrs());
        }
        Ok(participant)
    }

    fn get_participant_state(
        &self,
        participant_code: &str,
        session_code: &str,
    ) -> Result<PrivateState> {
        let session = self.ctx.store.get_session(session_code)?;
        let me = self.ctx.participant(session_code, participant_code)?;
        let spec = self.spec_for(&session.config)?.unwrap_or_default();
        let actions = spec
            .actions
            .iter()
            .map(|(name, action)| CustomActionView {
                name: name.clone(),
                description: action.description.clone(),
                inputs: action.inputs.keys().cloned().collect(),
            })
            .collect();
        Ok(PrivateState::Custom(CustomState {
            money: me.money,
            experiment_name: spec.name.clone(),
            experiment_description: spec.description.clone(),
            attributes: self.ctx.store.custom_attrs(me.participant_id),
            variables: self.ctx.store.custom_vars(session_code),
            actions,
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

    /// Run one declared action: validate inputs, check every precondition,
    /// then apply the effects in order against a working copy and commit
    /// them in one store operation.
    fn perform_action(
        &self,
        participant_code: &str,
        action_name: &str,
        inputs: &Value,
        session_code: &str,
    ) -> Result<Value> {
        let session = self.ctx.store.get_session(session_code)?;
        let me = self.ctx.participant(session_code, participant_code)?;
        let Some(spec) = self.spec_for(&session.config)? else {
            return Err(ActionError::new(
                ErrorKind::InvalidState,
                "this session declares no custom actions",
            ));
        };
        let Some(action) = spec.actions.get(action_name) else {
            return Err(ActionError::new(
                ErrorKind::InvalidState,
                format!("unknown action '{action_name}'"),
            ));
        };

        let inputs = validated_inputs(&spec, action, action_name, inputs)?;
        let mut env = Env {
            spec: &spec,
            attrs: self.ctx.store.custom_attrs(me.participant_id),
            vars: self.ctx.store.custom_vars(session_code),
            inputs: &inputs,
        };

        for condition in &action.preconditions {
            let left = env.resolve(&condition.left)?;
            let right = env.resolve(&condition.right)?;
            if !compare(condition.op, &left, &right)? {
                return Err(ActionError::new(
                    ErrorKind::InvalidState,
                    format!(
                        "precondition not met: {} ({left}) {:?} {} ({right})",
                        describe_operand(&condition.left),
                        condition.op,
                        describe_operand(&condition.right),
                    ),
                ));
            }
        }

        // Effects run in order against the working copy so later effects
        // see earlier writes; nothing is committed until all succeed.
        let mut effects_applied = Vec::with_capacity(action.effects.len());
        for effect in &action.effects {
            match effect {
                Effect::Set { target, to } => {
                    let value = env.resolve(to)?;
                    env.write(target, value.clone())?;
                    effects_applied.push(serde_json::json!({"set": value}));
                }
                Effect::Inc { target, by } | Effect::Dec { target, by } => {
                    let delta = numeric(&env.resolve(by)?, &describe_operand(by))?;
                    let current = env.current(target);
                    let current = if current.is_null() {
                        0.0
                    } else {
                        numeric(&current, "effect target")?
                    };
                    let next = if matches!(effect, Effect::Inc { .. }) {
                        current + delta
                    } else {
                        current - delta
                    };
                    env.write(target, serde_json::json!(next))?;
                    effects_applied.push(serde_json::json!({"changed_to": next}));
                }
            }
        }

        let (attributes, variables) = self.ctx.store.apply_custom_effects(
            session_code,
            me.participant_id,
            env.attrs,
            env.vars,
        )?;
        tracing::info!(
            participant = participant_code,
            action = action_name,
            "custom action performed"
        );
        Ok(serde_json::json!({
            "action": action_name,
            "effects_applied": effects_applied,
            "attributes": attributes,
            "variables": variables,
        }))
    }
}

fn validated_inputs(
    spec: &CustomSpec,
    action: &ActionDef,
    action_name: &str,
    inputs: &Value,
) -> Result<Map<String, Value>> {
    let supplied = inputs.as_object().cloned().unwrap_or_default();
    let mut checked = Map::new();
    for (name, type_name) in &action.inputs {
        let value = supplied.get(name).ok_or_else(|| {
            ActionError::new(
                ErrorKind::InvalidState,
                format!("action '{action_name}' needs input '{name}'"),
            )
        })?;
        if let Some(type_def) = spec.types.get(type_name) {
            check_input(type_def, name, value)?;
        }
        checked.insert(name.clone(), value.clone());
    }
    Ok(checked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom::spec::testspec;
    use orc_store::{Store, TimerBoard};
    use serde_json::json;
    use std::sync::Arc;

    fn engine() -> CustomEngine {
        let ctx = EngineContext::new(Arc::new(Store::new()), Arc::new(TimerBoard::new()));
        CustomEngine::new(ctx, ExperimentType::Custom("custom_public_goods".into()))
    }

    fn session_with(engine: &CustomEngine, definition: serde_json::Value) -> String {
        let session = engine
            .create_session("r1", json!({"customExperiment": definition}))
            .unwrap();
        let code = session.session_code;
        for name in ["P1", "P2"] {
            engine
                .add_participant(&code, name, ParticipantType::AiAgent)
                .unwrap();
        }
        code
    }

    #[test]
    fn declared_actions_move_state_through_effects() {
        let engine = engine();
        let code = session_with(&engine, testspec::public_goods());

        let outcome = engine
            .perform_action("P1", "contribute", &json!({"amount": 30}), &code)
            .unwrap();
        assert_eq!(outcome["variables"]["pot"], json!(30.0));
        assert_eq!(outcome["attributes"]["wallet.balance"], json!(70.0));
        assert_eq!(outcome["attributes"]["wallet.mood"], json!("happy"));

        // Session variables accumulate across participants.
        let outcome = engine
            .perform_action("P2", "contribute", &json!({"amount": 20}), &code)
            .unwrap();
        assert_eq!(outcome["variables"]["pot"], json!(50.0));
        assert_eq!(outcome["attributes"]["wallet.balance"], json!(80.0));
    }

    #[test]
    fn failed_preconditions_leave_state_untouched() {
        let engine = engine();
        let code = session_with(&engine, testspec::public_goods());
        let err = engine
            .perform_action("P1", "contribute", &json!({"amount": 1000}), &code)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
        assert!(err.message.contains("precondition not met"));

        let PrivateState::Custom(state) = engine.get_participant_state("P1", &code).unwrap()
        else {
            panic!("wrong private state kind");
        };
        assert_eq!(state.attributes["wallet.balance"], json!(100));
        assert_eq!(state.variables["pot"], json!(0));
    }

    #[test]
    fn inputs_are_checked_against_their_declared_types() {
        let engine = engine();
        let code = session_with(&engine, testspec::public_goods());
        for bad in [json!({"amount": "lots"}), json!({"amount": -5}), json!({})] {
            let err = engine
                .perform_action("P1", "contribute", &bad, &code)
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidState);
        }
        let err = engine
            .perform_action("P1", "meditate", &json!({}), &code)
            .unwrap_err();
        assert!(err.message.contains("unknown action"));
    }

    #[test]
    fn invalid_definitions_are_rejected_at_creation() {
        let engine = engine();
        let err = engine
            .create_session(
                "r1",
                json!({"customExperiment": {
                    "name": "broken",
                    "objects": {"o": {"attrs": {"x": {"type": "ghost"}}}},
                }}),
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
        assert!(err.message.contains("unknown type 'ghost'"));
    }

    #[test]
    fn scalar_bounds_gate_effect_writes() {
        let engine = engine();
        // A "fine" action with no precondition: only the money type's
        // min bound stops the balance going negative.
        let code = session_with(
            &engine,
            json!({
                "name": "fines",
                "types": {"money": {"kind": "scalar", "min": 0}},
                "objects": {"wallet": {"attrs": {"balance": {"type": "money", "default": 10}}}},
                "variables": {},
                "actions": {
                    "fine": {
                        "inputs": {"amount": "money"},
                        "effects": [
                            {"dec": {"target": {"attr": {"object": "wallet", "field": "balance"}},
                                     "by": {"input": "amount"}}},
                        ],
                    },
                },
            }),
        );
        engine
            .perform_action("P1", "fine", &json!({"amount": 10}), &code)
            .unwrap();
        let err = engine
            .perform_action("P1", "fine", &json!({"amount": 1}), &code)
            .unwrap_err();
        assert!(err.message.contains("declared range"));
    }

    #[test]
    fn sessions_without_a_definition_keep_the_shared_interface() {
        let engine = engine();
        let session = engine.create_session("r1", json!({})).unwrap();
        let code = session.session_code;
        engine
            .add_participant(&code, "P1", ParticipantType::Human)
            .unwrap();
        engine
            .add_participant(&code, "P2", ParticipantType::AiAgent)
            .unwrap();
        engine.send_message("P1", "P2", "hi", &code).unwrap();

        let PrivateState::Custom(state) = engine.get_participant_state("P1", &code).unwrap()
        else {
            panic!("wrong private state kind");
        };
        assert_eq!(state.money, 300);
        assert!(state.actions.is_empty());

        let err = engine
            .perform_action("P1", "anything", &json!({}), &code)
            .unwrap_err();
        assert!(err.message.contains("declares no custom actions"));
        let err = engine.produce_shape("P1", "circle", 1, &code).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
    }
}
