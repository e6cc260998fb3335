//! Server startup and lifecycle
//!
//! Wires game discovery, the Docker transport, the session manager, and the
//! batch coordinator into one axum server with graceful shutdown.

use anyhow::{bail, Context, Result};
use bollard::Docker;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::batcher::BatchCoordinator;
use crate::cli::commands::ServeArgs;
use crate::config::ServerConfig;
use crate::games;
use crate::routes::{self, AppState};
use crate::session::SessionManager;
use crate::worker::docker::DockerTransport;

/// CLI entry for `serve`. Returns a process exit code.
pub async fn handle_serve(args: &ServeArgs) -> i32 {
    let config = match ServerConfig::from_args(args) {
        Ok(config) => config,
        Err(err) => {
            error!("Invalid configuration: {}", err);
            return 1;
        }
    };

    match run(config).await {
        Ok(()) => 0,
        Err(err) => {
            error!("Server failed: {:#}", err);
            1
        }
    }
}

/// Runs the gateway until interrupted.
pub async fn run(config: ServerConfig) -> Result<()> {
    let config = Arc::new(config);

    info!(
        "Discovering game files from {}",
        config.alfworld_config_path.display()
    );
    let game_files = Arc::new(games::discover_game_files(&config.alfworld_config_path)?);
    if game_files.is_empty() {
        bail!(
            "no game files found; check the data paths in {} and run `alfworld-api setup`",
            config.alfworld_config_path.display()
        );
    }
    info!("Found {} game files", game_files.len());

    let docker =
        Docker::connect_with_local_defaults().context("Failed to connect to Docker daemon")?;
    docker
        .version()
        .await
        .context("Docker daemon is not responding")?;

    let transport = Arc::new(DockerTransport::new(docker, Arc::clone(&config)));
    let manager = Arc::new(SessionManager::new(
        transport,
        Arc::clone(&config),
        Arc::clone(&game_files),
    ));
    manager.spawn_idle_sweeper();

    let batcher = BatchCoordinator::spawn(
        Arc::clone(&manager),
        Duration::from_millis(config.batch_window_ms),
    );

    let app = routes::router(AppState {
        manager: Arc::clone(&manager),
        batcher,
        game_files: Arc::clone(&game_files),
    });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        "alfworld-api ready on {}: {} games, max {} sessions, batch window {} ms",
        addr,
        game_files.len(),
        config.max_sessions,
        config.batch_window_ms
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down, tearing down sessions");
    manager.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
    }
}
