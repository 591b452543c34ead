//! TaskHub demo server.
//!
//! Runs the dispatcher with three simulated agents and an HTTP surface, or
//! inspects a saved state file.

mod agents;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use taskhub_dispatcher::{
    http, DispatchEvent, DispatchStatus, Dispatcher, DispatcherConfig, JsonFileStore,
    KeywordPolicy, StateStore,
};
use tokio::net::TcpListener;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Task dispatcher with simulated agents.
#[derive(Parser, Debug)]
#[command(name = "taskhub", about = "Task dispatcher with simulated agents")]
struct Args {
    /// Snapshot file; terminal work is archived beside it
    #[arg(long, default_value = "taskhub-state.json")]
    state: PathBuf,

    /// HTTP server address
    #[arg(long, default_value = "127.0.0.1:8085")]
    http_addr: String,

    /// Completed and failed work kept in memory
    #[arg(long, default_value_t = 1000)]
    history_limit: usize,

    /// Fail executions that run longer than this
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Log level for taskhub crates (overrides RUST_LOG for them)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the dispatcher, demo agents and HTTP server until Ctrl-C
    Run {
        /// Submit the example work items on startup
        #[arg(long)]
        seed: bool,
    },
    /// Print the status recorded in the state file as JSON
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("taskhub={}", args.log_level).parse()?)
                .add_directive(format!("taskhub_dispatcher={}", args.log_level).parse()?)
                .add_directive(format!("taskhub_core={}", args.log_level).parse()?),
        )
        .with_target(true)
        .init();

    match args.command {
        Command::Status => print_status(&args.state).await,
        Command::Run { seed } => {
            let mut config = DispatcherConfig::default().with_history_limit(args.history_limit);
            if let Some(secs) = args.timeout_secs {
                config = config.with_execution_timeout(Duration::from_secs(secs));
            }
            run(config, args.state, &args.http_addr, seed).await
        }
    }
}

async fn print_status(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = JsonFileStore::new(path).load().await?;
    let status = DispatchStatus::from_snapshot(&snapshot);
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn run(
    config: DispatcherConfig,
    state: PathBuf,
    http_addr: &str,
    seed: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(JsonFileStore::new(&state));
    info!(
        state = %store.path().display(),
        archive = %store.archive_path().display(),
        "Loading dispatcher state"
    );

    let dispatcher = Dispatcher::restore(config, Arc::new(KeywordPolicy), store).await;
    tokio::spawn(log_events(dispatcher.subscribe()));

    agents::register_all(&dispatcher).await?;
    if seed {
        agents::seed_examples(&dispatcher).await?;
    }

    let listener = TcpListener::bind(http_addr).await?;
    info!(http_addr = %http_addr, policy = dispatcher.policy_name(), "TaskHub listening");

    axum::serve(listener, http::create_router(dispatcher.clone()))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
            }
        })
        .await?;

    let status = dispatcher.get_status().await;
    info!(
        pending = status.pending_count,
        running = status.running_count,
        completed = status.completed_count,
        failed = status.failed_count,
        "TaskHub stopped"
    );
    Ok(())
}

/// Console presentation layer: one log line per dispatch event.
async fn log_events(rx: tokio::sync::broadcast::Receiver<DispatchEvent>) {
    let mut events = BroadcastStream::new(rx);
    while let Some(item) = events.next().await {
        match item {
            Ok(DispatchEvent::WorkCompleted { work_id, worker_id }) => {
                info!(work_id = %work_id, worker_id = %worker_id, "[event] completed");
            }
            Ok(DispatchEvent::WorkFailed {
                work_id,
                worker_id,
                error,
            }) => {
                let worker = worker_id.map(|w| w.into_inner()).unwrap_or_default();
                warn!(work_id = %work_id, worker_id = %worker, error = %error, "[event] failed");
            }
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => info!("[event] {line}"),
                Err(e) => warn!(error = %e, "Failed to render event"),
            },
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                warn!("Event stream lagged by {} messages", n);
            }
        }
    }
}
