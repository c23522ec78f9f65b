//! BoltKV - An In-Memory Key-Value Server
//!
//! This is the main entry point for the BoltKV server.
//! It loads the last snapshot, starts the expiry sweeper, and accepts
//! connections until Ctrl+C.

use anyhow::Context;
use boltkv::commands::CommandHandler;
use boltkv::config::Config;
use boltkv::connection::{handle_connection, ConnectionStats};
use boltkv::persistence::SnapshotStore;
use boltkv::pubsub::Broker;
use boltkv::storage::{ExpirySweeper, StorageEngine};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config) {
    println!(
        r#"
   ____        _ _   _  ____     __
  | __ )  ___ | | |_| |/ /\ \   / /
  |  _ \ / _ \| | __| ' /  \ \ / /
  | |_) | (_) | | |_| . \   \ V /
  |____/ \___/|_|\__|_|\_\   \_/

BoltKV v{} - In-Memory Key-Value Server
──────────────────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        boltkv::VERSION,
        config.bind_address()
    );
}

/// Restores the last snapshot, if any. A missing or unreadable snapshot is
/// not fatal; the server starts empty.
fn load_snapshot(storage: &StorageEngine, store: &dyn SnapshotStore) {
    match store.load() {
        Ok(Some(snapshot)) => {
            let loaded = storage.restore(snapshot);
            info!(keys = loaded, "Snapshot restored");
        }
        Ok(None) => info!("No snapshot found, starting with an empty database"),
        Err(e) => warn!(error = %e, "Failed to load snapshot, starting with an empty database"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    print_banner(&config);

    // Create the storage engine (shared across all connections)
    let storage = Arc::new(StorageEngine::new());
    let broker = Arc::new(Broker::new());
    let snapshots = config.snapshot_store();

    match &snapshots {
        Some(store) => load_snapshot(&storage, store.as_ref()),
        None => info!("Persistence disabled"),
    }

    let sweeper = ExpirySweeper::start(Arc::clone(&storage), config.expiry_config());

    // Create connection statistics
    let stats = Arc::new(ConnectionStats::new());
    let handler = CommandHandler::new(Arc::clone(&storage), broker, snapshots)
        .with_stats(Arc::clone(&stats));

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(address = %config.bind_address(), "Listening");

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, handler, stats) => {}
        _ = shutdown => {}
    }

    sweeper.stop();
    info!("Server shutdown complete");
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(listener: TcpListener, handler: CommandHandler, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
                }
                tokio::spawn(handle_connection(
                    stream,
                    addr,
                    handler.clone(),
                    Arc::clone(&stats),
                ));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
