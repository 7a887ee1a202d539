//! Per-session timer state.
//!
//! Each active session has exactly one ticker task owning one of these; the
//! shared board (session_code → state) lives next to the store and is read
//! by engines for the public-state timer block.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Idle,
    Running,
    Paused,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerState {
    pub experiment_status: TimerStatus,
    /// Seconds left in the round.
    pub time_remaining: u64,
    pub round_duration_minutes: f64,
    pub round_start_time: Option<DateTime<Utc>>,
    /// Whether the ticker task is live for this session.
    pub active: bool,
}

impl TimerState {
    /// A fresh, not-yet-started timer for a round of the given length.
    pub fn idle(round_duration_minutes: f64) -> Self {
        Self {
            experiment_status: TimerStatus::Idle,
            time_remaining: (round_duration_minutes * 60.0).round().max(0.0) as u64,
            round_duration_minutes,
            round_start_time: None,
            active: false,
        }
    }

    /// Start the round now.
    pub fn started(round_duration_minutes: f64, now: DateTime<Utc>) -> Self {
        Self {
            experiment_status: TimerStatus::Running,
            time_remaining: (round_duration_minutes * 60.0).round().max(0.0) as u64,
            round_duration_minutes,
            round_start_time: Some(now),
            active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_timer_holds_full_round() {
        let t = TimerState::idle(15.0);
        assert_eq!(t.time_remaining, 900);
        assert_eq!(t.experiment_status, TimerStatus::Idle);
        assert!(!t.active);
    }

    #[test]
    fn started_timer_is_running() {
        let t = TimerState::started(0.5, Utc::now());
        assert_eq!(t.time_remaining, 30);
        assert_eq!(t.experiment_status, TimerStatus::Running);
        assert!(t.active);
    }
}
