// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wireline - a bridge between one trusted messaging user and a local
//! agent process.
//!
//! Exit codes: 0 on a normal shutdown, 1 on a fatal startup error, 42 when
//! the supervisor wrapper should relaunch us (user-requested restart).

mod bridge;
mod commands;
mod compose;
mod lock;
mod outbound;
mod relay;
mod styling;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use wireline_agent::SessionManager;
use wireline_config::BridgeConfig;
use wireline_core::WirelineError;
use wireline_gateway::WebhookState;
use wireline_notify::NotificationPipeline;
use wireline_provider::{normalize_number, ProviderClient, ProviderCredentials};
use wireline_storage::Database;

use crate::bridge::Bridge;
use crate::lock::ProcessLock;
use crate::outbound::OutboundQueue;

/// Exit code asking the supervisor wrapper to relaunch the process.
const EXIT_RESTART: i32 = 42;

/// Wireline - bridge a trusted messaging user to a local agent.
#[derive(Parser, Debug)]
#[command(name = "wireline", version, about, long_about = None)]
struct Cli {
    /// Explicit config file path (skips the XDG hierarchy).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bridge daemon.
    Serve,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => match run_serve(cli.config).await {
            Ok(restart_requested) => {
                if restart_requested {
                    info!("exiting with restart sentinel");
                    std::process::exit(EXIT_RESTART);
                }
            }
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        },
    }
}

/// Runs the daemon; returns whether a supervisor relaunch was requested.
async fn run_serve(config_path: Option<PathBuf>) -> Result<bool, WirelineError> {
    let config = load(config_path)?;
    init_tracing(&config.log.level);
    config.validate()?;

    let phone = normalize_number(config.provider.trusted_number.as_deref().unwrap_or_default())?;
    let from_number =
        normalize_number(config.provider.from_number.as_deref().unwrap_or_default())?;

    info!(
        db = config.storage.database_path.as_str(),
        poll_ms = config.provider.poll_interval_ms,
        webhook = config.webhook.enabled,
        "starting wireline"
    );

    let db = Database::open(&config.storage.database_path).await?;
    let lock_path = format!("{}.lock", config.storage.database_path);
    let _lock = ProcessLock::acquire(Path::new(&lock_path))?;

    let client = Arc::new(ProviderClient::new(
        &ProviderCredentials {
            api_base: config.provider.api_base.clone(),
            api_key: config.provider.api_key.clone().unwrap_or_default(),
            api_secret: config.provider.api_secret.clone().unwrap_or_default(),
        },
        Duration::from_secs(config.provider.fetch_timeout_secs),
    )?);

    let (bridge_tx, bridge_rx) = mpsc::channel(256);
    let (manager, agent_rx) = SessionManager::new(
        db.clone(),
        config.codex.clone(),
        phone.clone(),
        bridge_tx,
    );
    let manager = Arc::new(manager);

    let pipeline = Arc::new(NotificationPipeline::new(
        db.clone(),
        phone.clone(),
        config.notifications.clone(),
    ));

    let cancel = shutdown_token();

    if config.webhook.enabled {
        let state = WebhookState {
            secret: config.webhook.secret.clone().unwrap_or_default(),
            pipeline: pipeline.clone(),
        };
        let webhook_config = config.webhook.clone();
        let webhook_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = wireline_gateway::serve(&webhook_config, state, webhook_cancel).await {
                error!(error = %e, "webhook ingress failed");
            }
        });
    }

    let outbound = OutboundQueue::spawn(
        client.clone(),
        db.clone(),
        phone.clone(),
        from_number,
        config.features.outbound_styling,
    );

    let bridge = Bridge::new(config, db, phone, manager, pipeline, client, outbound);
    let restart_requested = bridge.run(cancel.clone(), agent_rx, bridge_rx).await?;

    // Take the webhook server down with us.
    cancel.cancel();
    info!("wireline shutdown complete");
    Ok(restart_requested)
}

#[allow(clippy::result_large_err)]
fn load(config_path: Option<PathBuf>) -> Result<BridgeConfig, WirelineError> {
    let loaded = match config_path {
        Some(path) => wireline_config::load_config_from_path(&path),
        None => wireline_config::load_config(),
    };
    loaded.map_err(|e| WirelineError::Config(e.to_string()))
}

/// Returns a token tripped by the first termination signal.
///
/// The poll loop, the outbound drain, and the webhook server all watch the
/// same token, so one signal winds the whole bridge down.
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trip = cancel.clone();
    tokio::spawn(async move {
        let signal_name = next_termination_signal().await;
        info!(signal = signal_name, "winding down the bridge");
        trip.cancel();
    });
    cancel
}

#[cfg(unix)]
async fn next_termination_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            // No SIGTERM stream; Ctrl+C alone still stops the bridge.
            tracing::warn!(error = %e, "SIGTERM handler unavailable");
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn next_termination_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "Ctrl+C"
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wireline={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
