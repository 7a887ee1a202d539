//! Game engines: experiment-specific action semantics behind one stable
//! interface.
//!
//! A factory dispatches on `experiment_type`. All engines share the session
//! lifecycle, state views and messaging; each adds its own actions and
//! invariants on top of the store's atomic primitives. Every operation
//! returns a typed error; nothing here panics across the tool-surface
//! boundary.

mod common;
mod custom;
mod daytrader;
mod engine;
mod essayranking;
mod factory;
mod hiddenprofiles;
mod shapefactory;
mod wordguessing;

pub use common::{EngineContext, PublicParticipant, PublicState, TimerInfo};
pub use custom::{
    CustomActionView, CustomEngine, CustomSpec, CustomState, IssueSeverity, ValidationIssue,
    CUSTOM_EXPERIMENT_KEY,
};
pub use daytrader::{DayTraderEngine, TraderState};
pub use engine::{GameEngine, PrivateState, TradeDecision};
pub use essayranking::{EssayRankingEngine, EssaySummary, RankingState};
pub use factory::EngineFactory;
pub use hiddenprofiles::{HiddenProfilesEngine, ProfileState};
pub use shapefactory::{FactoryState, OfferView, ProductionView, ShapeFactoryEngine};
pub use wordguessing::{GuessOutcome, WordGuessingEngine, WordState};
