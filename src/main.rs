//! todo-api: a task-record CRUD service
//!
//! Serves a small JSON API over a hand-parsed subset of HTTP/1.1:
//! - `GET /health`
//! - `GET /todos[?completed=..|?priority=..]`, `GET /todos/{id}`
//! - `POST /todos`, `PUT /todos/{id}`, `DELETE /todos/{id}`
//!
//! Records live in SQLite. Configuration comes from CLI arguments or a
//! TOML file.

mod config;
mod handlers;
mod http;
mod router;
mod server;
mod store;
mod todo;

use config::Config;
use server::Server;
use std::sync::Arc;
use store::SqliteStore;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        db = %config.db_path,
        backlog = config.backlog,
        "Starting todo-api server"
    );

    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    let server = Server::new(&config, store);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.run(shutdown_rx).await?;

    info!("todo-api terminated");
    Ok(())
}

/// Resolve on SIGINT (Ctrl-C) or SIGTERM.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
