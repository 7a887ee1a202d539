//! The per-agent controller: perceive → status update → decide → act.
//!
//! Active agents run this loop on a jittered interval; passive agents run
//! it only when their mailbox fires. All state mutations go through the
//! tool surface; every failure becomes a recorded failure, never an abort.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

use orc_domain::{
    Audience, ChatMessage, CommunicationLevel, Event, ExperimentType, Initiative, OfferType,
    Result, TimerStatus, ToolCallRequest,
};
use orc_providers::{parse_plan, ChatCompletion, PortMode};
use orc_tools::{tool_definitions, CallerIdentity, ToolSurface};

use crate::cancel::CancelToken;
use crate::events::EventBus;
use crate::logs::AgentLogSinks;
use crate::memory::{AgentMemory, FailureLog};
use crate::plan_map::map_plan_to_tool_calls;
use crate::prompt::{build_system_prompt, Personality};
use crate::status::{build_status_update, StatusInput, UnreadView};

/// Static configuration for one agent.
#[derive(Clone)]
pub struct AgentSettings {
    pub participant_code: String,
    pub session_code: String,
    pub experiment_type: ExperimentType,
    /// Tick interval (jitter already applied by the manager).
    pub interval: Duration,
    /// Maximum run length for the loop.
    pub duration: Duration,
    pub max_memory_length: usize,
    pub personality: Personality,
    pub initiative: Initiative,
    pub mode: PortMode,
    pub logs_root: PathBuf,
}

/// What a cycle tells the surrounding loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Continue,
    SessionCompleted,
}

enum WaitOutcome {
    Tick,
    Triggered,
    Stopped,
}

struct Perception {
    state: Value,
    experiment_status: TimerStatus,
    time_remaining: u64,
}

pub struct AgentController {
    settings: AgentSettings,
    surface: Arc<ToolSurface>,
    chat: Arc<dyn ChatCompletion>,
    events: EventBus,
    memory: AgentMemory,
    failures: FailureLog,
    logs: AgentLogSinks,
    stop: CancelToken,
    triggers: mpsc::Receiver<()>,
    cycle: u64,
}

impl AgentController {
    pub fn new(
        settings: AgentSettings,
        surface: Arc<ToolSurface>,
        chat: Arc<dyn ChatCompletion>,
        events: EventBus,
        stop: CancelToken,
        triggers: mpsc::Receiver<()>,
    ) -> std::io::Result<Self> {
        let logs = AgentLogSinks::new(
            &settings.logs_root,
            &settings.session_code,
            &settings.participant_code,
        )?;
        Ok(Self {
            memory: AgentMemory::new(settings.max_memory_length),
            failures: FailureLog::default(),
            settings,
            surface,
            chat,
            events,
            logs,
            stop,
            triggers,
            cycle: 0,
        })
    }

    fn caller(&self) -> CallerIdentity {
        CallerIdentity {
            participant_code: self.settings.participant_code.clone(),
            session_code: self.settings.session_code.clone(),
        }
    }

    fn is_hidden_profiles(&self) -> bool {
        self.settings.experiment_type == ExperimentType::HiddenProfiles
    }

    // ── Perceive ───────────────────────────────────────────────────

    fn perceive(&mut self) -> Result<Perception> {
        // Promote finished productions first (a no-op outside ShapeFactory).
        if let Err(err) =
            self.surface
                .execute_tool_call(&self.caller(), "process_completed_productions", &json!({}))
        {
            self.logs
                .agent(&format!("warning: production promotion failed: {err}"));
        }

        let state = self
            .surface
            .execute_tool_call(&self.caller(), "get_game_state", &json!({}))?;

        // The timer board is authoritative over the engine-reported block;
        // it may already have flipped while this state was being assembled.
        let board = self
            .surface
            .factory()
            .timers()
            .get(&self.settings.session_code);
        let (experiment_status, time_remaining) = match board {
            Some(timer) => (timer.experiment_status, timer.time_remaining),
            None => {
                let timer = &state["public_state"]["timer"];
                (
                    serde_json::from_value(timer["experiment_status"].clone())
                        .unwrap_or(TimerStatus::Idle),
                    timer["time_remaining"].as_u64().unwrap_or(0),
                )
            }
        };
        Ok(Perception {
            state,
            experiment_status,
            time_remaining,
        })
    }

    // ── Status update ──────────────────────────────────────────────

    fn unread_views(&self) -> Vec<UnreadView> {
        let store = self.surface.factory().store();
        let Ok(me) = store.get_participant(
            &self.settings.session_code,
            &self.settings.participant_code,
        ) else {
            return Vec::new();
        };
        store
            .unread_messages_for(&self.settings.session_code, me.participant_id)
            .into_iter()
            .map(|m| UnreadView {
                sender: store
                    .participant_by_id(m.sender)
                    .map(|p| p.participant_code)
                    .unwrap_or_else(|_| "unknown".to_owned()),
                content: m.content,
                timestamp: m.timestamp,
                broadcast: m.recipient.is_none(),
            })
            .collect()
    }

    /// Mark the unread set consumed: direct messages flip to read, and this
    /// agent is recorded in each broadcast's seen set (flipping it to read
    /// once everyone has seen it).
    fn mark_unread_consumed(&self) {
        let store = self.surface.factory().store();
        let Ok(me) = store.get_participant(
            &self.settings.session_code,
            &self.settings.participant_code,
        ) else {
            return;
        };
        for message in store.unread_messages_for(&self.settings.session_code, me.participant_id) {
            if message.is_broadcast() {
                let _ = store.mark_broadcast_seen(message.message_id, me.participant_id);
                let _ = store.maybe_mark_broadcast_read(message.message_id);
            }
        }
        store.mark_messages_read(&self.settings.session_code, me.participant_id, None);
    }

    fn append_status_update(&mut self, perception: &Perception, final_vote_due: bool) {
        if !self.memory.is_initialized() {
            let system_prompt = build_system_prompt(
                &self.settings.experiment_type,
                &self.settings.participant_code,
                self.settings.personality,
                self.communication_level(&perception.state),
                &perception.state["private_state"],
                &perception.state["public_state"],
            );
            self.memory.initialize(&system_prompt);
            self.logs.memory(
                "INITIALIZATION",
                &format!("system prompt set ({} chars)", system_prompt.len()),
            );
        }

        let unread = self.unread_views();
        let has_voted = perception.state["private_state"]["has_voted"]
            .as_bool()
            .unwrap_or(false);
        let update = build_status_update(&StatusInput {
            experiment_type: &self.settings.experiment_type,
            private: &perception.state["private_state"],
            public: &perception.state["public_state"],
            time_remaining: perception.time_remaining,
            experiment_status: perception.experiment_status,
            unread: &unread,
            failures: self.failures.summary(),
            final_vote_due,
            has_voted,
        });
        self.memory.add_status_update(&update);
        self.logs.memory("STATUS_UPDATE", &update);

        // The agent has now "seen" everything the update contained.
        self.mark_unread_consumed();
    }

    fn communication_level(&self, state: &Value) -> CommunicationLevel {
        serde_json::from_value(state["communication_level"].clone())
            .unwrap_or(CommunicationLevel::Chat)
    }

    fn price_range(&self, state: &Value) -> (i64, i64) {
        let config = &state["public_state"]["experiment_config"];
        (
            config["minTradePrice"].as_i64().unwrap_or(15),
            config["maxTradePrice"].as_i64().unwrap_or(100),
        )
    }

    // ── Decide ─────────────────────────────────────────────────────

    async fn decide(
        &mut self,
        perception: &Perception,
        final_vote_due: bool,
    ) -> Vec<ToolCallRequest> {
        self.append_status_update(perception, final_vote_due);
        let level = self.communication_level(&perception.state);
        let price_range = self.price_range(&perception.state);
        let history: Vec<ChatMessage> = self.memory.history();
        let system = self.memory.system_prompt().to_owned();
        let chat = self.chat.clone();

        match self.settings.mode {
            PortMode::Json => {
                self.logs.llm(
                    "REQUEST",
                    &format!(
                        "model={} history_len={}",
                        chat.model_name(),
                        history.len()
                    ),
                );
                let reply = match chat.decide_plain(&system, &history).await {
                    Ok(reply) => reply,
                    Err(err) => {
                        self.logs.llm("ERROR", &err.to_string());
                        self.record_failure("llm_decide", json!({}), &err.to_string());
                        return Vec::new();
                    }
                };
                self.logs.llm("RESPONSE", &reply);
                self.memory.add_agent_response(reply.as_str());

                let plan = parse_plan(&reply);
                let mapped = map_plan_to_tool_calls(&plan, level, price_range);
                for dropped in &mapped.dropped {
                    self.record_failure(&dropped.action, json!({}), &dropped.reason);
                }
                mapped.calls
            }
            PortMode::Function => {
                let tools = tool_definitions(&self.settings.experiment_type);
                self.logs.llm(
                    "REQUEST",
                    &format!(
                        "model={} tools={} history_len={}",
                        chat.model_name(),
                        tools.len(),
                        history.len()
                    ),
                );
                let calls = match chat.decide_with_tools(&system, &history, &tools).await {
                    Ok(calls) => calls,
                    Err(err) => {
                        self.logs.llm("ERROR", &err.to_string());
                        self.record_failure("llm_decide", json!({}), &err.to_string());
                        return Vec::new();
                    }
                };
                let summary =
                    serde_json::to_string(&calls).unwrap_or_else(|_| "[unserializable]".into());
                self.logs.llm("RESPONSE", &summary);
                self.memory.add_agent_response(summary.as_str());
                self.filter_function_calls(calls, level)
            }
        }
    }

    /// Function-mode counterpart of the plan mapper's messaging policy.
    fn filter_function_calls(
        &mut self,
        calls: Vec<ToolCallRequest>,
        level: CommunicationLevel,
    ) -> Vec<ToolCallRequest> {
        let mut kept = Vec::with_capacity(calls.len());
        for mut call in calls {
            if call.name == "send_message" {
                let recipient = call.arguments["recipient"].as_str().unwrap_or("").to_owned();
                match level {
                    CommunicationLevel::NoChat => continue,
                    CommunicationLevel::Broadcast | CommunicationLevel::GroupChat => {
                        call.arguments["recipient"] = json!("all");
                    }
                    CommunicationLevel::Chat => {
                        if recipient.is_empty() || recipient == "all" {
                            self.record_failure(
                                "send_message",
                                call.arguments.clone(),
                                "broadcast messaging is disabled in chat mode",
                            );
                            continue;
                        }
                    }
                }
            }
            kept.push(call);
        }
        kept
    }

    fn record_failure(&mut self, action: &str, arguments: Value, error: &str) {
        self.failures.record(action, arguments, error, self.cycle);
        self.memory
            .add_agent_response(format!("FAILED ACTION: {action} - {error}"));
        self.logs.memory("FAILED_ACTION", &format!("{action}: {error}"));
    }

    // ── Act ────────────────────────────────────────────────────────

    async fn act(&mut self, calls: &[ToolCallRequest]) {
        for call in calls {
            if self.stop.is_cancelled() {
                return;
            }
            if call.name.is_empty() {
                continue;
            }
            let result = self
                .surface
                .execute_tool_call(&self.caller(), &call.name, &call.arguments);
            match result {
                Ok(payload) => {
                    self.logs.agent(&format!("{} -> ok", call.name));
                    self.memory
                        .add_agent_response(format!("SUCCESSFUL ACTION: {}", call.name));
                    self.logs
                        .memory("SUCCESSFUL_ACTION", &format!("{}: ok", call.name));
                    self.emit_events(call, &payload);
                }
                Err(err) => {
                    self.logs
                        .agent(&format!("{} -> fail | {}", call.name, err));
                    self.record_failure(&call.name, call.arguments.clone(), &err.to_string());
                }
            }
        }
    }

    fn emit_events(&self, call: &ToolCallRequest, payload: &Value) {
        let now = chrono::Utc::now();
        let session_code = self.settings.session_code.clone();
        let me = self.settings.participant_code.clone();
        let uuid_of = |value: &Value| {
            value
                .as_str()
                .and_then(|s| uuid::Uuid::parse_str(s).ok())
                .unwrap_or_default()
        };
        match call.name.as_str() {
            "send_message" => {
                self.events.publish(
                    Audience::All,
                    Event::NewMessage {
                        session_code,
                        sender: me,
                        recipient: call.arguments["recipient"]
                            .as_str()
                            .unwrap_or("all")
                            .to_owned(),
                        content: call.arguments["content"].as_str().unwrap_or("").to_owned(),
                        message_id: uuid_of(&payload["message_id"]),
                        timestamp: now,
                    },
                );
            }
            "create_trade_offer" => {
                let offer_type = match call.arguments["offer_type"].as_str() {
                    Some("buy") => OfferType::Buy,
                    _ => OfferType::Sell,
                };
                self.events.publish(
                    Audience::Researchers,
                    Event::NewTradeOffer {
                        session_code,
                        sender: me,
                        target: call.arguments["recipient"].as_str().unwrap_or("").to_owned(),
                        offer_type,
                        shape: call.arguments["shape"].as_str().unwrap_or("").to_owned(),
                        quantity: 1,
                        price_per_unit: call.arguments["price_per_unit"].as_i64().unwrap_or(0),
                        transaction_id: uuid_of(&payload["transaction_id"]),
                        short_id: payload["short_id"].as_str().unwrap_or("").to_owned(),
                        timestamp: now,
                    },
                );
            }
            "respond_to_trade_offer" => {
                let response = call.arguments["response"].as_str().unwrap_or("").to_owned();
                let transaction_id = uuid_of(&payload["transaction_id"]);
                self.events.publish(
                    Audience::Researchers,
                    Event::TradeOfferResponse {
                        session_code: session_code.clone(),
                        responder: me.clone(),
                        transaction_id,
                        response: response.clone(),
                        timestamp: now,
                    },
                );
                if response == "accept" {
                    self.events.publish(
                        Audience::Researchers,
                        Event::TradeCompleted {
                            session_code,
                            transaction_id,
                            accepted_by: me,
                            timestamp: now,
                        },
                    );
                }
            }
            "cancel_trade_offer" => {
                self.events.publish(
                    Audience::Researchers,
                    Event::TradeOfferCancelled {
                        session_code,
                        canceller: me,
                        transaction_id: uuid_of(&payload["transaction_id"]),
                        timestamp: now,
                    },
                );
            }
            "submit_vote" => {
                self.events.publish(
                    Audience::Researchers,
                    Event::VoteUpdate {
                        session_code,
                        participant: me,
                        candidate_name: payload["candidate_name"]
                            .as_str()
                            .unwrap_or("")
                            .to_owned(),
                        timestamp: now,
                    },
                );
            }
            _ => {}
        }
    }

    // ── Cycles ─────────────────────────────────────────────────────

    /// One perceive→decide→act cycle. Public so passive triggers and tests
    /// can drive single steps.
    pub async fn run_single_cycle(&mut self) -> CycleOutcome {
        self.cycle += 1;
        let cycle = self.cycle;
        self.logs.agent(&format!("cycle #{cycle}"));

        let perception = match self.perceive() {
            Ok(perception) => perception,
            Err(err) => {
                self.logs.agent(&format!("perceive failed: {err}"));
                self.record_failure("perceive", json!({}), &err.to_string());
                return CycleOutcome::Continue;
            }
        };

        match perception.experiment_status {
            TimerStatus::Completed => {
                if self.is_hidden_profiles() {
                    self.final_vote_cycle(&perception).await;
                }
                self.logs
                    .agent("experiment completed - stopping after this cycle");
                CycleOutcome::SessionCompleted
            }
            TimerStatus::Running => {
                let calls = self.decide(&perception, false).await;
                self.logs.agent(&format!("planned {} action(s)", calls.len()));
                // An empty plan is a valid choice: the agent stays silent.
                self.act(&calls).await;
                CycleOutcome::Continue
            }
            _ => {
                // Not running yet. Passive agents still get the status
                // update so they see new messages when triggered early.
                if self.settings.initiative == Initiative::Passive {
                    self.append_status_update(&perception, false);
                }
                self.logs.agent(&format!(
                    "experiment status is '{:?}', waiting for running",
                    perception.experiment_status
                ));
                CycleOutcome::Continue
            }
        }
    }

    /// Demand one last decision with the final-vote prompt. The absence of
    /// a vote is a logged warning, never a synthesised vote.
    async fn final_vote_cycle(&mut self, perception: &Perception) {
        self.logs
            .agent("experiment completed - requesting final vote");
        let calls = self.decide(perception, true).await;
        let voted = calls.iter().any(|c| c.name == "submit_vote");
        self.act(&calls).await;
        if voted {
            self.logs.memory("FINAL_VOTE", "final vote action submitted");
        } else {
            self.logs
                .agent("warning: agent did not submit a final vote");
        }
    }

    async fn wait(&mut self, interval: Duration) -> WaitOutcome {
        let deadline = Instant::now() + interval;
        loop {
            if self.stop.is_cancelled() {
                return WaitOutcome::Stopped;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return WaitOutcome::Tick;
            }
            // Sleep in short slices so stop stays responsive without
            // missing mailbox triggers.
            let slice = remaining.min(Duration::from_secs(1));
            match tokio::time::timeout(slice, self.triggers.recv()).await {
                Ok(Some(())) => return WaitOutcome::Triggered,
                Ok(None) => return WaitOutcome::Stopped,
                Err(_) => {}
            }
        }
    }

    /// The main loop. Active agents tick; passive agents idle on their
    /// mailbox with a periodic completion check.
    pub async fn run(mut self) {
        match self.settings.initiative {
            Initiative::Passive => self.run_passive().await,
            Initiative::Active => self.run_active().await,
        }
    }

    async fn run_active(&mut self) {
        self.logs.agent(&format!(
            "starting ACTIVE agent loop (interval {:?})",
            self.settings.interval
        ));
        let end = Instant::now() + self.settings.duration;
        // Initial delay before the first inference.
        if matches!(self.wait(self.settings.interval).await, WaitOutcome::Stopped) {
            self.logs.agent("agent loop finished - stopped before first cycle");
            return;
        }
        while !self.stop.is_cancelled() && Instant::now() < end {
            if self.run_single_cycle().await == CycleOutcome::SessionCompleted {
                self.logs.agent("agent loop finished - session completed");
                return;
            }
            match self.wait(self.settings.interval).await {
                WaitOutcome::Stopped => break,
                WaitOutcome::Tick | WaitOutcome::Triggered => {}
            }
        }
        if self.stop.is_cancelled() {
            self.logs.agent("agent loop finished - stopped by external request");
        } else {
            self.logs.agent("agent loop finished - reached maximum duration");
        }
    }

    async fn run_passive(&mut self) {
        self.logs
            .agent("starting PASSIVE agent - waiting for external triggers");
        const COMPLETION_CHECK: Duration = Duration::from_secs(30);
        let mut idle = Duration::ZERO;
        loop {
            if self.stop.is_cancelled() {
                self.logs.agent("passive agent finished - stopped by external request");
                return;
            }
            // Wait in short slices so stop stays responsive between the
            // 30-second completion checks.
            match tokio::time::timeout(Duration::from_secs(1), self.triggers.recv()).await {
                Ok(Some(())) => {
                    idle = Duration::ZERO;
                    self.logs.agent("passive trigger received");
                    if self.run_single_cycle().await == CycleOutcome::SessionCompleted {
                        self.logs.agent("passive agent finished - session completed");
                        return;
                    }
                }
                Ok(None) => {
                    self.logs.agent("passive agent finished - trigger channel closed");
                    return;
                }
                Err(_) => {
                    idle += Duration::from_secs(1);
                    if idle < COMPLETION_CHECK {
                        continue;
                    }
                    idle = Duration::ZERO;
                    // Has the experiment completed while we were idle? The
                    // completed path runs the final vote.
                    if let Ok(perception) = self.perceive() {
                        if perception.experiment_status == TimerStatus::Completed {
                            if self.is_hidden_profiles() {
                                self.final_vote_cycle(&perception).await;
                            }
                            self.logs.agent("passive agent finished - session completed");
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_domain::ParticipantType;
    use orc_engines::{EngineFactory, GameEngine};
    use orc_providers::MockChat;
    use orc_store::{Store, TimerBoard};

    struct Harness {
        surface: Arc<ToolSurface>,
        chat: Arc<MockChat>,
        events: EventBus,
        session_code: String,
        _logs_dir: tempfile::TempDir,
        logs_root: PathBuf,
    }

    fn harness(kind: ExperimentType, config: serde_json::Value) -> Harness {
        let factory = Arc::new(EngineFactory::new(
            Arc::new(Store::new()),
            Arc::new(TimerBoard::new()),
        ));
        let engine = factory.engine_for(&kind);
        let session = engine.create_session("r1", config).unwrap();
        let session_code = session.session_code.clone();
        for name in ["Alice", "Bob"] {
            engine
                .add_participant(&session_code, name, ParticipantType::AiAgent)
                .unwrap();
        }
        engine.start_session(&session_code).unwrap();
        let logs_dir = tempfile::tempdir().unwrap();
        let logs_root = logs_dir.path().to_path_buf();
        Harness {
            surface: Arc::new(ToolSurface::new(factory)),
            chat: Arc::new(MockChat::new()),
            events: EventBus::new(),
            session_code,
            _logs_dir: logs_dir,
            logs_root,
        }
    }

    fn controller(h: &Harness, kind: ExperimentType, participant: &str) -> AgentController {
        let (_tx, rx) = mpsc::channel(1);
        AgentController::new(
            AgentSettings {
                participant_code: participant.to_owned(),
                session_code: h.session_code.clone(),
                experiment_type: kind,
                interval: Duration::from_secs(15),
                duration: Duration::from_secs(900),
                max_memory_length: 20,
                personality: crate::prompt::assign_personality(),
                initiative: Initiative::Active,
                mode: PortMode::Json,
                logs_root: h.logs_root.clone(),
            },
            h.surface.clone(),
            h.chat.clone(),
            h.events.clone(),
            CancelToken::new(),
            rx,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn a_cycle_perceives_decides_and_acts() {
        let h = harness(ExperimentType::ShapeFactory, json!({}));
        h.chat.queue_plain(
            r#"```json
{"actions": [{"type": "message", "recipient": "Bob", "content": "hi Bob"}]}
```"#,
        );
        let mut agent = controller(&h, ExperimentType::ShapeFactory, "Alice");
        let outcome = agent.run_single_cycle().await;
        assert_eq!(outcome, CycleOutcome::Continue);

        // The message reached the store.
        let store = h.surface.factory().store();
        let bob = store.get_participant(&h.session_code, "Bob").unwrap();
        let unread = store.unread_messages_for(&h.session_code, bob.participant_id);
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].content, "hi Bob");

        // Memory carries the status update and the action outcome.
        let history = agent.memory.history();
        assert!(history
            .iter()
            .any(|m| m.content.starts_with("STATUS UPDATE:")));
        assert!(history
            .iter()
            .any(|m| m.content == "SUCCESSFUL ACTION: send_message"));
        // The mock saw the system prompt.
        assert_eq!(h.chat.request_count(), 1);
    }

    #[tokio::test]
    async fn an_empty_plan_means_silence() {
        let h = harness(ExperimentType::ShapeFactory, json!({}));
        h.chat.queue_plain("I'll wait and observe for now.");
        let mut agent = controller(&h, ExperimentType::ShapeFactory, "Alice");
        agent.run_single_cycle().await;
        let history = agent.memory.history();
        assert!(!history
            .iter()
            .any(|m| m.content.starts_with("SUCCESSFUL ACTION")));
        assert!(agent.failures.is_empty());
    }

    #[tokio::test]
    async fn failed_actions_are_recorded_and_fed_back() {
        let h = harness(ExperimentType::ShapeFactory, json!({}));
        h.chat.queue_plain(
            r#"{"actions": [{"type": "produce_shape", "shape": "dodecahedron", "quantity": 1}]}"#,
        );
        // Second cycle: empty reply; the status update must carry the failure.
        h.chat.queue_plain("{\"actions\": []}");
        let mut agent = controller(&h, ExperimentType::ShapeFactory, "Alice");
        agent.run_single_cycle().await;
        assert!(!agent.failures.is_empty());
        assert!(agent
            .memory
            .history()
            .iter()
            .any(|m| m.content.starts_with("FAILED ACTION: produce_shape")));

        agent.run_single_cycle().await;
        let requests = h.chat.requests.lock();
        let last_history = &requests.last().unwrap().1;
        let status = last_history
            .iter()
            .rev()
            .find(|m| m.content.starts_with("STATUS UPDATE:"))
            .unwrap();
        assert!(status.content.contains("produce_shape failed"));
    }

    #[tokio::test]
    async fn llm_errors_are_failures_not_aborts() {
        let h = harness(ExperimentType::ShapeFactory, json!({}));
        h.chat.fail_with("rate limited");
        let mut agent = controller(&h, ExperimentType::ShapeFactory, "Alice");
        let outcome = agent.run_single_cycle().await;
        assert_eq!(outcome, CycleOutcome::Continue);
        assert!(!agent.failures.is_empty());
    }

    #[tokio::test]
    async fn direct_messages_are_marked_read_after_the_update() {
        let h = harness(ExperimentType::ShapeFactory, json!({}));
        let store = h.surface.factory().store();
        let alice = store.get_participant(&h.session_code, "Alice").unwrap();
        let bob = store.get_participant(&h.session_code, "Bob").unwrap();
        store
            .insert_message(&h.session_code, bob.participant_id, Some(alice.participant_id), "ping")
            .unwrap();

        h.chat.queue_plain("{\"actions\": []}");
        let mut agent = controller(&h, ExperimentType::ShapeFactory, "Alice");
        agent.run_single_cycle().await;

        assert!(store
            .unread_messages_for(&h.session_code, alice.participant_id)
            .is_empty());
        // The update the model saw contained the message.
        let requests = h.chat.requests.lock();
        assert!(requests[0].1.iter().any(|m| m.content.contains("ping")));
    }

    #[tokio::test]
    async fn hidden_profiles_final_vote_on_completion() {
        // Scenario S4, agent side: status flips to completed, the controller
        // demands a final vote, and the plan's submit_vote is stored.
        let h = harness(
            ExperimentType::HiddenProfiles,
            json!({"hiddenProfiles": {"candidateNames": ["Candidate_X", "Candidate_Y"]}}),
        );
        h.surface.factory().timers().complete(&h.session_code);
        h.chat.queue_plain(
            r#"{"actions": [{"type": "submit_vote", "candidate_name": "Candidate_X"}]}"#,
        );
        let mut agent = controller(&h, ExperimentType::HiddenProfiles, "Alice");
        let outcome = agent.run_single_cycle().await;
        assert_eq!(outcome, CycleOutcome::SessionCompleted);

        let session = h
            .surface
            .factory()
            .store()
            .get_session(&h.session_code)
            .unwrap();
        assert_eq!(
            session.config.hidden_profiles.votes.get("Alice"),
            Some(&"Candidate_X".to_string())
        );
        // The prompt demanded a final vote.
        let requests = h.chat.requests.lock();
        assert!(requests[0]
            .1
            .iter()
            .any(|m| m.content.contains("FINAL vote")));
    }

    #[tokio::test]
    async fn no_final_vote_is_a_warning_not_a_synthesised_vote() {
        let h = harness(
            ExperimentType::HiddenProfiles,
            json!({"hiddenProfiles": {"candidateNames": ["Candidate_X"]}}),
        );
        h.surface.factory().timers().complete(&h.session_code);
        h.chat.queue_plain("{\"actions\": []}");
        let mut agent = controller(&h, ExperimentType::HiddenProfiles, "Alice");
        agent.run_single_cycle().await;

        let session = h
            .surface
            .factory()
            .store()
            .get_session(&h.session_code)
            .unwrap();
        assert!(session.config.hidden_profiles.votes.is_empty());
    }

    #[tokio::test]
    async fn trade_actions_emit_events() {
        let h = harness(ExperimentType::ShapeFactory, json!({}));
        let mut rx = h.events.subscribe();
        let store = h.surface.factory().store();
        let alice = store.get_participant(&h.session_code, "Alice").unwrap();
        store.deposit_shapes(alice.participant_id, "square", 1);

        h.chat.queue_plain(
            r#"{"actions": [{"type": "propose_trade_offer", "target_participant": "Bob",
                             "offer_type": "sell", "shape": "square", "price_per_unit": 20}]}"#,
        );
        let mut agent = controller(&h, ExperimentType::ShapeFactory, "Alice");
        agent.run_single_cycle().await;

        let envelope = rx.try_recv().unwrap();
        assert!(matches!(envelope.event, Event::NewTradeOffer { .. }));
        assert_eq!(envelope.audience, Audience::Researchers);
    }
}
