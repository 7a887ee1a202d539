//! `run-agent`: launch a single agent against an in-process session for
//! manual debugging.
//!
//! Exit codes: 0 normal termination, 1 configuration error, 2 transport
//! error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use orc_domain::{ExperimentType, ParticipantType};
use orc_engines::{EngineFactory, GameEngine};
use orc_providers::{provider_from_env, ChatCompletion, ChatOptions, MockChat, PortMode};
use orc_runtime::{spawn_session_timer, AgentManager, EventBus, StartAgent};
use orc_store::{Store, TimerBoard};
use orc_tools::ToolSurface;

#[derive(Parser, Debug)]
#[command(name = "run-agent", about = "Run a single experiment agent for debugging")]
struct Cli {
    /// Participant code for the agent (e.g. agent01).
    #[arg(long)]
    participant: String,

    /// Session code the run is addressed by.
    #[arg(long)]
    session: String,

    /// Experiment kind (shapefactory, daytrader, essayranking,
    /// wordguessing, hiddenprofiles, custom_*).
    #[arg(long = "experiment-type", default_value = "shapefactory")]
    experiment_type: String,

    /// Model name forwarded to the LLM provider.
    #[arg(long)]
    model: Option<String>,

    /// Seconds between agent cycles.
    #[arg(long, default_value_t = 10)]
    interval: u64,

    /// Duration of the run in minutes.
    #[arg(long, default_value_t = 15)]
    minutes: u64,

    /// Keep a bounded conversation memory across cycles.
    #[arg(long)]
    memory: bool,

    /// Maximum conversation history length.
    #[arg(long = "max-memory", default_value_t = 20)]
    max_memory: usize,

    /// Use a real LLM provider (requires OPENAI_API_KEY or
    /// ANTHROPIC_API_KEY); without it the agent runs silent cycles.
    #[arg(long)]
    llm: bool,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let experiment_type: ExperimentType = match cli.experiment_type.parse() {
        Ok(kind) => kind,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(1);
        }
    };

    let chat: Arc<dyn ChatCompletion> = if cli.llm {
        let options = ChatOptions {
            model: cli.model.clone().unwrap_or_default(),
            ..ChatOptions::default()
        };
        match provider_from_env(None, options) {
            Ok(provider) => provider,
            Err(err) => {
                eprintln!("configuration error: {err}");
                return ExitCode::from(1);
            }
        }
    } else {
        // Silent cycles: the plumbing runs end to end, the agent says and
        // does nothing.
        Arc::new(MockChat::new())
    };

    match run(cli, experiment_type, chat).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("transport error: {err}");
            ExitCode::from(2)
        }
    }
}

async fn run(
    cli: Cli,
    experiment_type: ExperimentType,
    chat: Arc<dyn ChatCompletion>,
) -> anyhow::Result<()> {
    let store = Arc::new(Store::new());
    let timers = Arc::new(TimerBoard::new());
    let factory = Arc::new(EngineFactory::new(store.clone(), timers.clone()));
    let surface = Arc::new(ToolSurface::new(factory.clone()));
    let events = EventBus::new();
    let manager = Arc::new(AgentManager::new(
        surface.clone(),
        events.clone(),
        PathBuf::from("logs"),
    ));
    let _listener = manager.spawn_event_listener();

    // Bootstrap an in-process session under the requested code: the agent,
    // one peer to interact with, and a round as long as the run.
    let config = serde_json::json!({
        "roundDuration": cli.minutes,
        "agentPerceptionTimeWindow": cli.interval,
        "hiddenProfiles": {"candidateNames": ["Candidate_A", "Candidate_B"]},
    });
    let session = store.create_session_with_code(
        &cli.session,
        "run-agent",
        experiment_type.clone(),
        config,
    )?;
    let session_code = session.session_code.clone();
    let engine = factory.engine_for(&experiment_type);
    engine.add_participant(&session_code, &cli.participant, ParticipantType::AiAgent)?;
    engine.add_participant(&session_code, "partner", ParticipantType::Human)?;
    engine.start_session(&session_code)?;
    tracing::info!(session_code = %session_code, participant = %cli.participant, "debug session ready");

    let timer_manager = manager.clone();
    let timer_code = session_code.clone();
    let timer = spawn_session_timer(
        session_code.clone(),
        store.clone(),
        timers.clone(),
        events.clone(),
        move || async move {
            timer_manager.finalize_session(&timer_code).await;
        },
    );

    let max_memory = if cli.memory { cli.max_memory } else { 2 };
    let started = manager.start_agent(
        &session_code,
        StartAgent {
            participant_code: cli.participant.clone(),
            chat,
            mode: PortMode::Json,
            duration: Duration::from_secs(cli.minutes * 60),
            max_memory_length: max_memory,
        },
    )?;
    if !started {
        anyhow::bail!("agent {} is already running", cli.participant);
    }

    tokio::select! {
        result = timer => {
            result?;
            tracing::info!("session completed; shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted; stopping agents");
            manager.finalize_session(&session_code).await;
        }
    }
    Ok(())
}
