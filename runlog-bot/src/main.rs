//! runlog-bot - run tracking flow
//!
//! Loads configuration, wires the flow engine to its collaborators, starts the
//! idle sweeper and the health endpoint, then drives flows from stdin.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use runlog_bot::backend::{InMemoryBackend, SubmissionBackend, WebApiBackend};
use runlog_bot::console::{self, Command, HELP, PASTE_TERMINATOR};
use runlog_bot::extract::TextExtractor;
use runlog_bot::flow::{Collaborators, FlowEngine, FlowOptions, UserAction};
use runlog_bot::notify::LogNotifier;
use runlog_bot::render::ConsoleRenderer;
use runlog_bot::session::{SessionStore, SystemClock};
use runlog_bot::AppState;
use runlog_common::config::{BackendKind, TomlConfig};
use runlog_common::events::{DispatchBus, FlowInstanceId};

/// Command-line arguments for runlog-bot
#[derive(Parser, Debug)]
#[command(name = "runlog-bot")]
#[command(about = "Run tracking flow with a console front end")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "RUNLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Log level filter, overrides the config file (RUST_LOG overrides both)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Skip the health endpoint even if enabled in config
    #[arg(long)]
    no_health: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let level = args.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("runlog_bot={level},runlog_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting runlog-bot {}", env!("CARGO_PKG_VERSION"));

    let backend: Arc<dyn SubmissionBackend> = match config.backend.kind {
        BackendKind::Memory => {
            info!("Using in-memory backend");
            Arc::new(InMemoryBackend::new())
        }
        BackendKind::Web => {
            let backend = WebApiBackend::from_config(&config.backend).context("Failed to build web backend")?;
            info!(base_url = ?config.backend.base_url, "Using web API backend");
            Arc::new(backend)
        }
    };

    let store = Arc::new(SessionStore::new(config.session.idle_timeout(), Arc::new(SystemClock)));
    let engine = FlowEngine::new(
        store,
        DispatchBus::new(),
        Collaborators {
            backend,
            extractor: Arc::new(TextExtractor),
            renderer: Arc::new(ConsoleRenderer),
            notifier: Arc::new(LogNotifier),
        },
        FlowOptions::from(&config.session),
    );

    spawn_sweeper(Arc::clone(&engine), config.session.sweep_interval());

    if config.health.enabled && !args.no_health {
        let listener = tokio::net::TcpListener::bind(config.health.bind_address.as_str())
            .await
            .with_context(|| format!("Failed to bind {}", config.health.bind_address))?;
        info!("Health check: http://{}/health", config.health.bind_address);
        let app = runlog_bot::build_router(AppState::new(Arc::clone(&engine)));
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!(error = %e, "Health server stopped");
            }
        });
    }

    println!("{}", HELP);
    run_console(&engine).await?;

    info!("Shutting down");
    Ok(())
}

fn spawn_sweeper(engine: Arc<FlowEngine>, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(std::time::Duration::from_secs(1)));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            engine.sweep().await;
        }
    });
}

/// Active flow for the console user
struct Current {
    user_id: String,
    instance: FlowInstanceId,
}

async fn run_console(engine: &Arc<FlowEngine>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut current: Option<Current> = None;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match console::parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        let action = match command {
            Command::Quit => break,
            Command::Help => {
                println!("{}", HELP);
                continue;
            }
            Command::Sweep => {
                let evicted = engine.sweep().await;
                println!("Evicted {} idle session(s)", evicted);
                continue;
            }
            Command::Start(user_id) => {
                match engine.begin(&user_id).await {
                    Ok(instance) => current = Some(Current { user_id, instance }),
                    Err(e) => println!("Could not start: {}", e),
                }
                continue;
            }
            Command::UploadFile(path) => match tokio::fs::read(&path).await {
                Ok(bytes) => UserAction::Upload {
                    bytes,
                    url: format!("file://{}", path.display()),
                    filename: path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                },
                Err(e) => {
                    println!("Could not read {}: {}", path.display(), e);
                    continue;
                }
            },
            Command::BeginPaste => UserAction::Paste(read_paste(&mut lines).await?),
            Command::Set { key, value } => {
                let Some(flow) = &current else {
                    println!("No active flow; type 'start' first");
                    continue;
                };
                let Some(session) = engine.store().get(&flow.user_id).await else {
                    println!("Session expired; type 'start' again");
                    continue;
                };
                match console::apply_setting(&session.settings, &key, &value) {
                    Ok(settings) => UserAction::UpdateSettings(settings),
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                }
            }
            Command::Action(action) => action,
        };

        match &current {
            Some(flow) => {
                engine.dispatch(flow.instance, &flow.user_id, action);
            }
            None => println!("No active flow; type 'start' first"),
        }
    }
    Ok(())
}

async fn read_paste(lines: &mut Lines<BufReader<Stdin>>) -> Result<String> {
    println!("Paste the report, then a line with only '{}':", PASTE_TERMINATOR);
    let mut text = String::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim() == PASTE_TERMINATOR {
            break;
        }
        text.push_str(&line);
        text.push('\n');
    }
    Ok(text)
}
