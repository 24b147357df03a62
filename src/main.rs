//! printwatch binary entry point.
//!
//! Wires configuration, storage, the polling scheduler, the sync engine,
//! and the status server together, and owns graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use printwatch::{
    config::{AppConfig, Mode},
    health::AgentHealth,
    registry::PrinterRegistry,
    scheduler::Scheduler,
    server::{create_router, AppState},
    storage::{PrinterSeed, RemoteClient, StorageBackend, StorageBuilder},
    sync::SyncEngine,
    SnmpCollector,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Timeout for joining background tasks at shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// printwatch - SNMP printer fleet monitoring agent
#[derive(Parser, Debug)]
#[command(name = "printwatch", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "PRINTWATCH_CONFIG"
    )]
    config: String,

    /// Server bind address (overrides config file)
    #[arg(long, env = "PRINTWATCH_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "PRINTWATCH_SERVER_PORT")]
    server_port: Option<u16>,

    /// Database file path (overrides config file)
    #[arg(long, env = "PRINTWATCH_DB_PATH")]
    db_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,printwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("printwatch - printer fleet monitoring agent");

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file
    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(path) = cli.db_path {
        config.database.path = path;
    }
    config.validate()?;

    tracing::info!(
        mode = config.mode.as_ref(),
        interval = ?config.monitor.interval,
        database = %config.database.path,
        "Agent configured"
    );

    // Build storage layer. Failure here is the one fatal storage error.
    let handles = StorageBuilder::new(&config.database.path)
        .pool_size(config.database.pool_size)
        .build()?;
    tracing::info!("Storage initialized");

    // Seed statically configured targets (insert only, no updates).
    let mut seeded = 0;
    for target in &config.printers {
        let seed = PrinterSeed {
            address: target.address.clone(),
            name: target.name.clone(),
            location: target.location.clone(),
            model: target.model.clone(),
        };
        if handles.local.insert_if_absent(&seed)?.is_some() {
            seeded += 1;
        }
    }
    tracing::info!(
        configured = config.printers.len(),
        seeded,
        "Target seeding complete"
    );

    let health = Arc::new(AgentHealth::new());
    let cancel = CancellationToken::new();

    // Select the backend once; there is no runtime switching.
    let (backend, sync_engine) = match config.mode {
        Mode::Local => (
            Arc::new(StorageBackend::local(handles.local.clone())),
            None,
        ),
        Mode::Remote => {
            let Some(remote_cfg) = config.remote.as_ref() else {
                return Err("remote mode requires a [remote] section".into());
            };
            let client = RemoteClient::new(remote_cfg)?;

            let buffer = remote_cfg.buffering.then(|| handles.buffer.clone());
            if let Some(buffer) = &buffer {
                let backlog = buffer.depth()?;
                health.set_buffer_depth(backlog);
                if backlog > 0 {
                    tracing::info!(backlog, "Resuming with undelivered records from last run");
                }
            }

            let engine = buffer.as_ref().map(|buffer| {
                SyncEngine::new(
                    buffer.clone(),
                    client.clone(),
                    remote_cfg.retry.clone(),
                    Arc::clone(&health),
                )
            });

            (
                Arc::new(StorageBackend::remote(
                    handles.local.clone(),
                    client,
                    buffer,
                    Arc::clone(&health),
                )),
                engine,
            )
        }
    };

    // Spawn the sync engine (remote mode with buffering).
    let sync_handle = sync_engine.map(|engine| {
        let cancel = cancel.clone();
        tokio::spawn(engine.run(cancel))
    });

    // Spawn the polling scheduler.
    let scheduler = Scheduler::new(
        config.monitor.clone(),
        SnmpCollector::new(config.snmp.clone()),
        PrinterRegistry::new(Arc::clone(&backend)),
        Arc::clone(&backend),
        Arc::clone(&health),
    );
    let scheduler_handle = tokio::spawn(scheduler.run(cancel.clone()));

    // Status server with graceful shutdown.
    let app = create_router(AppState {
        health: Arc::clone(&health),
        backend: Arc::clone(&backend),
    });
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Status server listening on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    // Signal received: stop the loops and wait for them.
    cancel.cancel();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, scheduler_handle)
        .await
        .is_err()
    {
        tracing::warn!("Scheduler shutdown timed out");
    }
    if let Some(handle) = sync_handle {
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
            tracing::warn!("Sync engine shutdown timed out");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve when a shutdown signal arrives, cancelling the worker loops.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    cancel.cancel();
}
