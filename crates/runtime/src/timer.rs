//! The per-session countdown ticker.
//!
//! One task per active session, ticking at 1 Hz. Every tick broadcasts the
//! timer state so clients can resynchronise; while the session runs the
//! remaining time decrements by exactly one per tick. At zero the session
//! flips to completed, the completion hook runs (agent deactivation and the
//! final-vote pass), and the task exits.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use orc_domain::{Audience, Event, SessionStatus, TimerStatus};
use orc_store::{Store, TimerBoard};

use crate::events::EventBus;

/// Spawn the ticker for one session. The board entry must already exist
/// (armed by `start_session`); the ticker is its only writer from here on.
pub fn spawn_session_timer<F, Fut>(
    session_code: String,
    store: Arc<Store>,
    timers: Arc<TimerBoard>,
    events: EventBus,
    on_complete: F,
) -> JoinHandle<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        tracing::info!(session_code = %session_code, "session timer started");
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(state) = timers.get(&session_code) else {
                tracing::warn!(session_code = %session_code, "timer state vanished; stopping");
                return;
            };
            if !state.active {
                tracing::info!(session_code = %session_code, "session timer deactivated");
                return;
            }

            // Broadcast every tick, decrement or not, so clients resync.
            events.publish(
                Audience::All,
                Event::TimerUpdate {
                    session_code: session_code.clone(),
                    experiment_status: state.experiment_status,
                    time_remaining: state.time_remaining,
                    round_duration_minutes: state.round_duration_minutes,
                },
            );

            if state.experiment_status != TimerStatus::Running || state.time_remaining == 0 {
                continue;
            }
            let updated = timers.update(&session_code, |s| {
                s.time_remaining = s.time_remaining.saturating_sub(1);
            });
            let Some(updated) = updated else { return };
            if updated.time_remaining > 0 {
                continue;
            }

            // Round over: complete the session, tell everyone, then run the
            // one-shot hook (deactivation fires after this tick's update).
            timers.complete(&session_code);
            if let Err(err) = store.set_session_status(&session_code, SessionStatus::Completed) {
                tracing::warn!(session_code = %session_code, error = %err, "failed to mark session completed");
            }
            events.publish(
                Audience::All,
                Event::TimerUpdate {
                    session_code: session_code.clone(),
                    experiment_status: TimerStatus::Completed,
                    time_remaining: 0,
                    round_duration_minutes: updated.round_duration_minutes,
                },
            );
            tracing::info!(session_code = %session_code, "session timer completed");
            on_complete().await;
            return;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_domain::ExperimentType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Step the paused clock one second at a time so every interval tick
    /// gets processed (a single large advance only releases one delayed
    /// tick).
    async fn step_seconds(n: u64) {
        for _ in 0..n {
            tokio::time::advance(Duration::from_secs(1)).await;
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_decrements_by_at_most_one_per_tick_and_completes_once() {
        let store = Arc::new(Store::new());
        let timers = Arc::new(TimerBoard::new());
        let events = EventBus::new();
        let session = store
            .create_session("r1", ExperimentType::DayTrader, serde_json::json!({}))
            .unwrap();
        let code = session.session_code.clone();
        store
            .set_session_status(&code, SessionStatus::Active)
            .unwrap();
        // A 3-second round.
        timers.start(&code, 3.0 / 60.0);

        let completions = Arc::new(AtomicUsize::new(0));
        let counter = completions.clone();
        let handle = spawn_session_timer(
            code.clone(),
            store.clone(),
            timers.clone(),
            events.clone(),
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        let mut previous = timers.get(&code).unwrap().time_remaining;
        assert_eq!(previous, 3);
        for _ in 0..6 {
            step_seconds(1).await;
            let remaining = timers.get(&code).unwrap().time_remaining;
            assert!(remaining <= previous, "time must never increase");
            assert!(previous - remaining <= 1, "at most one decrement per tick");
            previous = remaining;
        }

        let state = timers.get(&code).unwrap();
        assert_eq!(state.experiment_status, TimerStatus::Completed);
        assert_eq!(state.time_remaining, 0);
        assert!(!state.active);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.get_session(&code).unwrap().status,
            SessionStatus::Completed
        );
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_timer_stops_without_completing() {
        let store = Arc::new(Store::new());
        let timers = Arc::new(TimerBoard::new());
        let session = store
            .create_session("r1", ExperimentType::DayTrader, serde_json::json!({}))
            .unwrap();
        let code = session.session_code.clone();
        timers.start(&code, 15.0);

        let handle = spawn_session_timer(
            code.clone(),
            store.clone(),
            timers.clone(),
            EventBus::new(),
            || async {},
        );
        step_seconds(2).await;
        timers.deactivate(&code);
        step_seconds(2).await;

        assert!(handle.is_finished());
        let state = timers.get(&code).unwrap();
        assert_ne!(state.experiment_status, TimerStatus::Completed);
        assert!(state.time_remaining > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn every_tick_broadcasts_timer_updates() {
        let store = Arc::new(Store::new());
        let timers = Arc::new(TimerBoard::new());
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let session = store
            .create_session("r1", ExperimentType::DayTrader, serde_json::json!({}))
            .unwrap();
        let code = session.session_code.clone();
        store
            .set_session_status(&code, SessionStatus::Active)
            .unwrap();
        timers.start(&code, 15.0);

        let _handle = spawn_session_timer(
            code.clone(),
            store.clone(),
            timers.clone(),
            events.clone(),
            || async {},
        );
        step_seconds(3).await;
        timers.deactivate(&code);

        let mut updates = 0;
        while let Ok(envelope) = rx.try_recv() {
            assert!(matches!(envelope.event, Event::TimerUpdate { .. }));
            updates += 1;
        }
        assert!(updates >= 2, "expected at least two tick broadcasts, saw {updates}");
    }
}
