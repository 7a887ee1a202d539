//! The agent manager: start/stop agent tasks per session, passive-agent
//! trigger edges, the reading-phase one-shot, and session finalisation.
//!
//! State is one map `session_code ":" participant_code → handle`, mutated
//! only under a short mutex. Stop is cooperative: signal, grant three
//! seconds, then abandon the task.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use orc_domain::{Event, Initiative, ParticipantType, Result};
use orc_providers::{ChatCompletion, PortMode};
use orc_tools::ToolSurface;

use crate::cancel::CancelToken;
use crate::controller::{AgentController, AgentSettings};
use crate::events::EventBus;
use crate::prompt::assign_personality;

/// Grace period between signalling stop and abandoning the task.
const STOP_GRACE: Duration = Duration::from_secs(3);

/// Per-agent start options; session-level settings come from the session
/// config.
#[derive(Clone)]
pub struct StartAgent {
    pub participant_code: String,
    pub chat: Arc<dyn ChatCompletion>,
    pub mode: PortMode,
    pub duration: Duration,
    pub max_memory_length: usize,
}

struct AgentHandle {
    session_code: String,
    participant_code: String,
    initiative: Initiative,
    stop: CancelToken,
    trigger: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

pub struct AgentManager {
    surface: Arc<ToolSurface>,
    events: EventBus,
    logs_root: PathBuf,
    agents: Mutex<HashMap<String, AgentHandle>>,
    /// Sessions whose reading-phase trigger has already fired.
    reading_phase_fired: Mutex<HashSet<String>>,
}

fn agent_key(session_code: &str, participant_code: &str) -> String {
    format!("{session_code}:{participant_code}")
}

/// The active-agent tick interval: the configured perception window with a
/// small offset so agents in one session do not fire in lockstep.
fn jittered_interval(base_secs: u64) -> Duration {
    let offset = *[-2i64, -1, 1, 2]
        .choose(&mut rand::thread_rng())
        .expect("offset list is non-empty");
    Duration::from_secs((base_secs as i64 + offset).max(1) as u64)
}

impl AgentManager {
    pub fn new(surface: Arc<ToolSurface>, events: EventBus, logs_root: PathBuf) -> Self {
        Self {
            surface,
            events,
            logs_root,
            agents: Mutex::new(HashMap::new()),
            reading_phase_fired: Mutex::new(HashSet::new()),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn surface(&self) -> &Arc<ToolSurface> {
        &self.surface
    }

    /// Start one agent task. Returns false when the agent is already
    /// running.
    pub fn start_agent(&self, session_code: &str, spec: StartAgent) -> Result<bool> {
        let key = agent_key(session_code, &spec.participant_code);
        {
            let agents = self.agents.lock();
            if let Some(existing) = agents.get(&key) {
                if !existing.join.is_finished() {
                    return Ok(false);
                }
            }
        }

        let session = self.surface.factory().store().get_session(session_code)?;
        let initiative = session
            .config
            .hidden_profiles
            .participant_initiatives
            .get(&spec.participant_code)
            .copied()
            .unwrap_or_default();
        let interval = jittered_interval(session.config.agent_perception_time_window);

        let stop = CancelToken::new();
        // Capacity-1 mailbox: a pending trigger already guarantees a wake-up,
        // so senders treat Full as success (latest wins).
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let controller = AgentController::new(
            AgentSettings {
                participant_code: spec.participant_code.clone(),
                session_code: session_code.to_owned(),
                experiment_type: session.experiment_type.clone(),
                interval,
                duration: spec.duration,
                max_memory_length: spec.max_memory_length,
                personality: assign_personality(),
                initiative,
                mode: spec.mode,
                logs_root: self.logs_root.clone(),
            },
            self.surface.clone(),
            spec.chat,
            self.events.clone(),
            stop.clone(),
            trigger_rx,
        )
        .map_err(|e| {
            orc_domain::ActionError::new(
                orc_domain::ErrorKind::StoreError,
                format!("failed to open agent log sinks: {e}"),
            )
        })?;

        tracing::info!(
            session_code,
            participant = %spec.participant_code,
            ?initiative,
            interval_secs = interval.as_secs(),
            "starting agent"
        );
        let join = tokio::spawn(controller.run());
        self.agents.lock().insert(
            key,
            AgentHandle {
                session_code: session_code.to_owned(),
                participant_code: spec.participant_code,
                initiative,
                stop,
                trigger: trigger_tx,
                join,
            },
        );
        Ok(true)
    }

    /// Start an agent task for every AI participant of a session. Returns
    /// the number started.
    pub fn activate_session(
        &self,
        session_code: &str,
        chat: Arc<dyn ChatCompletion>,
        mode: PortMode,
        duration: Duration,
        max_memory_length: usize,
    ) -> Result<usize> {
        let roster = self
            .surface
            .factory()
            .store()
            .list_participants(session_code)?;
        let mut started = 0;
        for participant in roster
            .into_iter()
            .filter(|p| p.kind == ParticipantType::AiAgent)
        {
            if self.start_agent(
                session_code,
                StartAgent {
                    participant_code: participant.participant_code,
                    chat: chat.clone(),
                    mode,
                    duration,
                    max_memory_length,
                },
            )? {
                started += 1;
            }
        }
        Ok(started)
    }

    /// Stop one agent: signal, wait up to the grace period, then abandon.
    pub async fn stop_agent(&self, session_code: &str, participant_code: &str) -> bool {
        let key = agent_key(session_code, participant_code);
        let Some(handle) = self.agents.lock().remove(&key) else {
            return false;
        };
        self.shutdown_handle(handle).await;
        self.cleanup_initiative(session_code, participant_code);
        true
    }

    async fn shutdown_handle(&self, handle: AgentHandle) {
        handle.stop.cancel();
        let AgentHandle {
            session_code,
            participant_code,
            join,
            ..
        } = handle;
        match tokio::time::timeout(STOP_GRACE, join).await {
            Ok(_) => {
                tracing::info!(session_code = %session_code, participant = %participant_code, "agent stopped");
            }
            Err(_) => {
                tracing::warn!(
                    session_code = %session_code,
                    participant = %participant_code,
                    "agent did not stop within grace period; abandoning"
                );
            }
        }
    }

    fn cleanup_initiative(&self, session_code: &str, participant_code: &str) {
        let _ = self
            .surface
            .factory()
            .store()
            .update_config(session_code, |config| {
                config
                    .hidden_profiles
                    .participant_initiatives
                    .remove(participant_code);
            });
    }

    /// Queue one decide cycle on an agent's mailbox. A full mailbox means a
    /// wake-up is already pending.
    pub fn trigger_agent(&self, session_code: &str, participant_code: &str) -> bool {
        let key = agent_key(session_code, participant_code);
        let agents = self.agents.lock();
        match agents.get(&key) {
            Some(handle) => {
                let _ = handle.trigger.try_send(());
                true
            }
            None => false,
        }
    }

    /// Trigger every agent in a session once.
    pub fn trigger_session(&self, session_code: &str) -> usize {
        let agents = self.agents.lock();
        let mut triggered = 0;
        for handle in agents.values().filter(|h| h.session_code == session_code) {
            let _ = handle.trigger.try_send(());
            triggered += 1;
        }
        triggered
    }

    /// Incoming-message edge: wake the passive recipient, or all passive
    /// agents for a broadcast.
    pub fn notify_message(&self, session_code: &str, recipient: Option<&str>) {
        let agents = self.agents.lock();
        for handle in agents.values().filter(|h| {
            h.session_code == session_code && h.initiative == Initiative::Passive
        }) {
            let matches = match recipient {
                Some(code) => handle.participant_code == code,
                None => true,
            };
            if matches {
                let _ = handle.trigger.try_send(());
            }
        }
    }

    /// Fire the one-shot reading-phase trigger when the session's engine
    /// reports the phase complete. Idempotent per session.
    pub fn check_reading_phase(&self, session_code: &str) -> bool {
        let Ok(session) = self.surface.factory().store().get_session(session_code) else {
            return false;
        };
        let engine = self.surface.factory().engine_for(&session.experiment_type);
        if !engine.reading_phase_complete(session_code) {
            return false;
        }
        if !self
            .reading_phase_fired
            .lock()
            .insert(session_code.to_owned())
        {
            return false;
        }
        let triggered = self.trigger_session(session_code);
        tracing::info!(session_code, triggered, "reading phase complete; agents triggered");
        true
    }

    /// Experiment-completion hook: give every agent one cycle to see the
    /// completed status (HiddenProfiles agents emit their final vote there),
    /// then stop them all.
    ///
    /// The trigger is given a grace period to run before the stop signal, so
    /// the final-vote cycle is not cut short by its own deactivation.
    pub async fn finalize_session(&self, session_code: &str) {
        self.trigger_session(session_code);

        let handles: Vec<AgentHandle> = {
            let mut agents = self.agents.lock();
            let keys: Vec<String> = agents
                .iter()
                .filter(|(_, h)| h.session_code == session_code)
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| agents.remove(&key))
                .collect()
        };
        for mut handle in handles {
            let participant_code = handle.participant_code.clone();
            // Completed-status cycles end the loop on their own; only
            // stragglers get the stop signal.
            if tokio::time::timeout(STOP_GRACE, &mut handle.join).await.is_err() {
                handle.stop.cancel();
                if tokio::time::timeout(STOP_GRACE, &mut handle.join).await.is_err() {
                    tracing::warn!(
                        session_code,
                        participant = %participant_code,
                        "agent did not stop after final-vote grace; abandoning"
                    );
                }
            }
            self.cleanup_initiative(session_code, &participant_code);
        }
        tracing::info!(session_code, "session finalized; all agents deactivated");
    }

    /// Codes of the agents currently tracked for a session.
    pub fn active_agents(&self, session_code: &str) -> Vec<String> {
        self.agents
            .lock()
            .values()
            .filter(|h| h.session_code == session_code)
            .map(|h| h.participant_code.clone())
            .collect()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.lock().len()
    }

    /// Listen on the event bus and convert message events into passive
    /// trigger edges. Runs until the bus is dropped.
    pub fn spawn_event_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let mut rx = manager.events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if let Event::NewMessage {
                            session_code,
                            recipient,
                            ..
                        } = envelope.event
                        {
                            let target = if recipient == "all" {
                                None
                            } else {
                                Some(recipient.as_str())
                            };
                            manager.notify_message(&session_code, target);
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event listener lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
        })
    }
}
