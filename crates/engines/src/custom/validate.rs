//! Validation of a declarative experiment definition.
//!
//! Runs once at session creation, before anything is persisted. Errors
//! reject the session; warnings are logged and tolerated.

use std::fmt;

use crate::custom::spec::{ActionDef, Condition, CustomSpec, Effect, Operand, Target, TypeDef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Warning,
    Error,
}

/// One finding from validating a definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

fn error(issues: &mut Vec<ValidationIssue>, message: String) {
    issues.push(ValidationIssue {
        severity: IssueSeverity::Error,
        message,
    });
}

fn warning(issues: &mut Vec<ValidationIssue>, message: String) {
    issues.push(ValidationIssue {
        severity: IssueSeverity::Warning,
        message,
    });
}

/// Validate a definition. The result lists every finding; callers reject
/// the definition when any has `IssueSeverity::Error`.
pub fn validate(spec: &CustomSpec) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if spec.name.is_empty() {
        warning(&mut issues, "experiment has no name".into());
    }
    if spec.actions.is_empty() {
        warning(&mut issues, "experiment declares no actions".into());
    }

    for (type_name, type_def) in &spec.types {
        match type_def {
            TypeDef::Scalar {
                min: Some(min),
                max: Some(max),
            } if min > max => {
                error(
                    &mut issues,
                    format!("type '{type_name}': min {min} exceeds max {max}"),
                );
            }
            TypeDef::Enum { values } if values.is_empty() => {
                error(&mut issues, format!("type '{type_name}': enum has no values"));
            }
            _ => {}
        }
    }

    for (object_name, object) in &spec.objects {
        if object.attrs.is_empty() {
            warning(&mut issues, format!("object '{object_name}' has no attributes"));
        }
        for (field, attr) in &object.attrs {
            let Some(type_def) = spec.types.get(&attr.type_name) else {
                error(
                    &mut issues,
                    format!(
                        "object '{object_name}.{field}': unknown type '{}'",
                        attr.type_name
                    ),
                );
                continue;
            };
            if let (TypeDef::Enum { values }, Some(default)) =
                (type_def, attr.default.as_str())
            {
                if !values.iter().any(|v| v == default) {
                    error(
                        &mut issues,
                        format!(
                            "object '{object_name}.{field}': default '{default}' is not one of the enum values"
                        ),
                    );
                }
            }
        }
    }

    for (action_name, action) in &spec.actions {
        validate_action(spec, action_name, action, &mut issues);
    }

    issues
}

fn validate_action(
    spec: &CustomSpec,
    action_name: &str,
    action: &ActionDef,
    issues: &mut Vec<ValidationIssue>,
) {
    for (input_name, type_name) in &action.inputs {
        if !spec.types.contains_key(type_name) {
            error(
                issues,
                format!("action '{action_name}': input '{input_name}' has unknown type '{type_name}'"),
            );
        }
    }
    if action.effects.is_empty() {
        warning(issues, format!("action '{action_name}' has no effects"));
    }
    for (index, condition) in action.preconditions.iter().enumerate() {
        let Condition { left, right, .. } = condition;
        for operand in [left, right] {
            validate_operand(spec, action, operand, issues, || {
                format!("action '{action_name}' precondition {index}")
            });
        }
    }
    for (index, effect) in action.effects.iter().enumerate() {
        let site = || format!("action '{action_name}' effect {index}");
        let (target, operand) = match effect {
            Effect::Set { target, to } => (target, to),
            Effect::Inc { target, by } | Effect::Dec { target, by } => (target, by),
        };
        validate_target(spec, target, issues, &site);
        validate_operand(spec, action, operand, issues, &site);
    }
}

fn validate_target(
    spec: &CustomSpec,
    target: &Target,
    issues: &mut Vec<ValidationIssue>,
    site: impl Fn() -> String,
) {
    match target {
        Target::Attr { object, field } => validate_attr_ref(spec, object, field, issues, site),
        Target::Var(name) => {
            if !spec.variables.contains_key(name) {
                error(issues, format!("{}: unknown variable '{name}'", site()));
            }
        }
    }
}

fn validate_operand(
    spec: &CustomSpec,
    action: &ActionDef,
    operand: &Operand,
    issues: &mut Vec<ValidationIssue>,
    site: impl Fn() -> String,
) {
    match operand {
        Operand::Attr { object, field } => validate_attr_ref(spec, object, field, issues, site),
        Operand::Var(name) => {
            if !spec.variables.contains_key(name) {
                error(issues, format!("{}: unknown variable '{name}'", site()));
            }
        }
        Operand::Input(name) => {
            if !action.inputs.contains_key(name) {
                error(issues, format!("{}: undeclared input '{name}'", site()));
            }
        }
        Operand::Const(_) => {}
    }
}

fn validate_attr_ref(
    spec: &CustomSpec,
    object: &str,
    field: &str,
    issues: &mut Vec<ValidationIssue>,
    site: impl Fn() -> String,
) {
    match spec.objects.get(object) {
        None => error(issues, format!("{}: unknown object '{object}'", site())),
        Some(def) if !def.attrs.contains_key(field) => {
            error(
                issues,
                format!("{}: object '{object}' has no attribute '{field}'", site()),
            );
        }
        Some(_) => {}
    }
}
