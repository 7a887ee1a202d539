//! Declaratively-defined (`custom_*`) experiments: the definition grammar,
//! its validator, and the interpreting engine.

mod engine;
pub mod spec;
pub mod validate;

pub use engine::{CustomActionView, CustomEngine, CustomState};
pub use spec::{CustomSpec, CUSTOM_EXPERIMENT_KEY};
pub use validate::{IssueSeverity, ValidationIssue};
