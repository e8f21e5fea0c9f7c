//! Deskhand - natural-language desktop automation agent.
//!
//! Entry point: wires configuration, surfaces, policy, and the orchestrator
//! together and runs one command from the CLI.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use deskhand_agent::{
    AgentOrchestrator, ConfirmationBroker, IntentParser, OpenAiPlanner, OrchestratorOptions,
    SemanticRouter, TokenMeter,
};
use deskhand_browser::{BrowserSessionManager, BrowserSurface};
use deskhand_config::AgentConfig;
use deskhand_input::{CoordinateActionExecutor, PrimaryScreenCapture};
use deskhand_policy::SafetyPolicy;
use deskhand_protocols::event::{AgentEvent, MessageKind, MessageRole};
use deskhand_protocols::surface::TracingHistorySink;
use deskhand_sidecar::{SidecarManager, SidecarSurface};

mod cli;

use cli::{Cli, Commands};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = AgentConfig::from_env();

    match cli.command {
        Commands::Run { command, yes } => run_command(config, command.join(" "), yes).await,
        Commands::Intent { command } => show_intent(config, command.join(" ")).await,
        Commands::Check => check_surfaces(config).await,
    }
}

async fn run_command(config: AgentConfig, command: String, auto_approve: bool) -> anyhow::Result<()> {
    info!("deskhand v{}", env!("CARGO_PKG_VERSION"));

    let session = Arc::new(BrowserSessionManager::new(config.browser.clone()));
    let sidecar_manager = Arc::new(SidecarManager::new(config.sidecar.clone()));

    let semantic_enabled = config.semantic_enabled && config.sidecar.supported;
    if config.semantic_enabled && !config.sidecar.supported {
        warn!("semantic automation requested but unsupported on this platform; using coordinate mode");
    }
    if semantic_enabled && !sidecar_manager.ensure_started().await {
        warn!("accessibility sidecar unavailable; semantic actions will route to the browser only");
    }

    let planner = Arc::new(OpenAiPlanner::with_base_url(
        config.planner.api_key.clone(),
        config.planner.base_url.clone(),
    ));
    let meter = Arc::new(TokenMeter::new(config.token_meter_enabled));
    let intent_parser = IntentParser::new(
        planner.clone(),
        config.planner.intent_model.clone(),
        config.intent_min_confidence,
        meter.clone(),
    );
    let router = SemanticRouter::new(
        Arc::new(BrowserSurface::new(session.clone())),
        Arc::new(SidecarSurface::new(sidecar_manager.clone())),
        config.browser.blocklist.clone(),
    );
    let broker = Arc::new(ConfirmationBroker::default());
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let orchestrator = AgentOrchestrator::new(
        planner,
        intent_parser,
        router,
        Arc::new(CoordinateActionExecutor::new()),
        Arc::new(PrimaryScreenCapture::new()),
        SafetyPolicy::new(config.browser.blocklist.clone()),
        Arc::new(TracingHistorySink),
        broker.clone(),
        meter,
        events_tx,
        OrchestratorOptions {
            planner_model: config.planner.planner_model.clone(),
            semantic_enabled,
            semantic_retry_count: config.semantic_retry_count,
            max_steps: config.max_steps,
        },
    );

    let presenter = tokio::spawn(present_events(events_rx, broker, auto_approve));

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    let outcome = orchestrator.run(&command, cancel).await;
    info!(outcome = outcome.as_str(), "run finished");

    session.shutdown();
    drop(orchestrator);
    let _ = presenter.await;
    Ok(())
}

/// Print the event stream and answer confirmation prompts from stdin.
async fn present_events(
    mut events: mpsc::UnboundedReceiver<AgentEvent>,
    broker: Arc<ConfirmationBroker>,
    auto_approve: bool,
) {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while let Some(event) = events.recv().await {
        match event {
            AgentEvent::Message(message) => {
                let role = match message.role {
                    MessageRole::User => "you",
                    MessageRole::Agent => "agent",
                    MessageRole::System => "system",
                };
                match message.kind {
                    MessageKind::Error => eprintln!("[{role}] {}", message.content),
                    _ => println!("[{role}] {}", message.content),
                }
            }
            AgentEvent::State(state) => {
                tracing::debug!(
                    status = ?state.status,
                    step = state.step_count,
                    mode = ?state.execution_mode,
                    "state"
                );
            }
            AgentEvent::ConfirmationRequested { id, action } => {
                if auto_approve {
                    println!("[confirm] auto-approving: {}", action.describe());
                    broker.resolve(&id, true);
                    continue;
                }
                println!("[confirm] {} — proceed? [y/N]", action.describe());
                let approved = matches!(
                    stdin.next_line().await,
                    Ok(Some(line)) if matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
                );
                broker.resolve(&id, approved);
            }
        }
    }
}

async fn show_intent(config: AgentConfig, command: String) -> anyhow::Result<()> {
    let planner = Arc::new(OpenAiPlanner::with_base_url(
        config.planner.api_key.clone(),
        config.planner.base_url.clone(),
    ));
    let meter = Arc::new(TokenMeter::new(false));
    let parser = IntentParser::new(
        planner,
        config.planner.intent_model.clone(),
        config.intent_min_confidence,
        meter,
    );
    let result = parser.parse(&command).await;
    let rendered =
        serde_json::to_string_pretty(&result).context("intent result serialization")?;
    println!("{rendered}");
    Ok(())
}

async fn check_surfaces(config: AgentConfig) -> anyhow::Result<()> {
    let session = BrowserSessionManager::new(config.browser.clone());
    match session.ensure_session().await {
        Ok(()) => println!("browser: reachable on port {}", config.browser.debug_port),
        Err(error) => println!("browser: unavailable ({error})"),
    }

    let sidecar = SidecarManager::new(config.sidecar.clone());
    if !config.sidecar.supported {
        println!("sidecar: unsupported on this platform");
    } else if sidecar.ensure_started().await {
        println!("sidecar: healthy on port {}", config.sidecar.port);
    } else {
        println!("sidecar: unavailable");
    }

    session.shutdown();
    Ok(())
}
