//! The orchestration runtime: per-agent perceive→decide→act loops, the
//! agent manager, per-session timers, the event bus, and the per-agent log
//! sinks.
//!
//! One task per active agent, one per active session timer, short-lived
//! tasks for passive triggers. Coordination happens through the store and
//! short-lived mutexes; stop is cooperative with a 3-second grace.

pub mod cancel;
pub mod controller;
pub mod events;
pub mod logs;
pub mod manager;
pub mod memory;
pub mod plan_map;
pub mod prompt;
pub mod status;
pub mod timer;

pub use cancel::CancelToken;
pub use controller::{AgentController, AgentSettings, CycleOutcome};
pub use events::{EventBus, Envelope};
pub use logs::AgentLogSinks;
pub use manager::{AgentManager, StartAgent};
pub use memory::{AgentMemory, FailureLog, FailureRecord};
pub use plan_map::{map_plan_to_tool_calls, MappedPlan};
pub use prompt::{assign_personality, Personality};
pub use timer::spawn_session_timer;
