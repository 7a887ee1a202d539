//! The Store Port: typed, session-scoped access to experiment state.
//!
//! All other components mutate shared state through this crate. The bundled
//! implementation keeps its tables in process memory behind short
//! `parking_lot` critical sections; the atomic contracts (single-winner
//! trade acceptance, all-or-nothing order fulfilment, no production
//! auto-advance, idempotent broadcast seen/read) are enforced here so they
//! hold no matter which engine or agent drives a call.
//!
//! Store methods are synchronous and never suspend; async callers treat
//! each call as one atomic step.

mod custom_state;
mod messages;
mod orders;
mod production;
mod store;
mod timers;
mod trade;

pub use orders::FulfillOutcome;
pub use store::Store;
pub use timers::TimerBoard;
