//! Resilience gateway host (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!     caller
//!       │ invoke(policy, operation)
//!       ▼
//!  ┌──────────────────────────────────────────────────────────┐
//!  │                        GATEWAY                            │
//!  │  ┌──────────┐   ┌────────────┐   ┌─────────────────┐      │
//!  │  │ registry │──▶│rate limiter│──▶│ circuit breaker │      │
//!  │  └────▲─────┘   └────────────┘   └───────┬─────────┘      │
//!  │       │                                  ▼                │
//!  │  ┌────┴─────┐                    ┌─────────────────┐      │
//!  │  │  config  │                    │ retry executor  │      │
//!  │  │ watcher  │                    │ + timeout guard │──────┼──▶ dependency
//!  │  └──────────┘                    └─────────────────┘      │
//!  │                                                           │
//!  │  admin API (axum)   metrics (prometheus)   tracing        │
//!  └──────────────────────────────────────────────────────────┘
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use resilience_gateway::admin::{self, AdminState};
use resilience_gateway::config::watcher::ConfigWatcher;
use resilience_gateway::config::{load_config, GatewayConfig};
use resilience_gateway::lifecycle::signals::wait_for_shutdown_signal;
use resilience_gateway::observability::{logging, metrics};
use resilience_gateway::{Gateway, Shutdown};

#[derive(Parser)]
#[command(name = "resilience-gateway")]
#[command(about = "Resilience-aware service-call gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway host with hot-reloaded policies
    Serve {
        #[arg(short, long, default_value = "gateway.toml")]
        config: PathBuf,
    },
    /// Validate a configuration file and print its policies
    Check {
        #[arg(short, long, default_value = "gateway.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve(config).await,
        Commands::Check { config } => {
            let parsed = load_config(&config)?;
            println!("{}", serde_json::to_string_pretty(&parsed.policies)?);
            Ok(())
        }
    }
}

async fn serve(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&path)?;
    logging::init_logging(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        policies = config.policies.len(),
        "resilience-gateway starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to install metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let gateway = Arc::new(Gateway::from_policies(config.policies.clone())?);
    let shutdown = Shutdown::new();

    let (watcher, updates) = ConfigWatcher::new(&path);
    let _watcher = watcher.run()?;
    let reloader = tokio::spawn(apply_reloads(gateway.clone(), updates, shutdown.subscribe()));

    let admin_task = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState::new(gateway.clone(), &config.admin.api_key);
        Some(tokio::spawn(admin::serve(listener, state, shutdown.subscribe())))
    } else {
        None
    };

    wait_for_shutdown_signal().await;
    shutdown.trigger();

    if let Some(task) = admin_task {
        if let Err(e) = task.await? {
            tracing::error!(error = %e, "Admin API exited with error");
        }
    }
    reloader.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Apply validated configuration updates until shutdown.
async fn apply_reloads(
    gateway: Arc<Gateway>,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            update = updates.recv() => {
                let Some(config) = update else { break };
                match gateway.apply_policies(config.policies) {
                    Ok(summary) => {
                        metrics::record_policy_reload("applied");
                        tracing::info!(
                            added = ?summary.added,
                            updated = ?summary.updated,
                            removed = ?summary.removed,
                            "Policies reloaded"
                        );
                    }
                    Err(e) => {
                        metrics::record_policy_reload("rejected");
                        tracing::error!(error = %e, "Rejected policy reload, keeping current policies");
                    }
                }
            }
        }
    }
}
