//! The session-code → timer-state board.
//!
//! Sessions never share timer state. Each active session's ticker task is
//! the only writer of its entry; everyone else (engines building public
//! state, agents overriding perceived status) takes snapshot reads. All
//! access is a short critical section.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;

use orc_domain::{TimerState, TimerStatus};

#[derive(Default)]
pub struct TimerBoard {
    states: Mutex<HashMap<String, TimerState>>,
}

impl TimerBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one session's timer, if any ticker has initialised it.
    pub fn get(&self, session_code: &str) -> Option<TimerState> {
        self.states.lock().get(session_code).cloned()
    }

    /// Initialise an idle timer for a session (no-op if present).
    pub fn init(&self, session_code: &str, round_duration_minutes: f64) {
        self.states
            .lock()
            .entry(session_code.to_owned())
            .or_insert_with(|| TimerState::idle(round_duration_minutes));
    }

    /// Replace a session's timer state. Used by the ticker on start.
    pub fn set(&self, session_code: &str, state: TimerState) {
        self.states.lock().insert(session_code.to_owned(), state);
    }

    /// Read-modify-write one entry; returns the updated snapshot.
    pub fn update(
        &self,
        session_code: &str,
        mutate: impl FnOnce(&mut TimerState),
    ) -> Option<TimerState> {
        let mut states = self.states.lock();
        let state = states.get_mut(session_code)?;
        mutate(state);
        Some(state.clone())
    }

    /// Start a session's round now.
    pub fn start(&self, session_code: &str, round_duration_minutes: f64) -> TimerState {
        let state = TimerState::started(round_duration_minutes, Utc::now());
        self.set(session_code, state.clone());
        state
    }

    /// Mark a session's timer completed and inactive.
    pub fn complete(&self, session_code: &str) -> Option<TimerState> {
        self.update(session_code, |state| {
            state.experiment_status = TimerStatus::Completed;
            state.time_remaining = 0;
            state.active = false;
        })
    }

    /// Stop ticking without completing (pause / shutdown).
    pub fn deactivate(&self, session_code: &str) -> Option<TimerState> {
        self.update(session_code, |state| {
            state.active = false;
        })
    }
}
