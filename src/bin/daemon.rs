//! `leta-daemon`: the long-lived process. Loads config, binds the request
//! socket, and serves until SIGTERM/SIGINT.
//!
//! Grounded on `leta/daemon/server.py::run_daemon` for the startup/shutdown
//! sequence; the tracing setup follows the teacher's `main.rs` but writes to
//! a log file instead of stderr, since nothing here shares stdout/stderr
//! with a transport the way the MCP server did.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use leta::config;
use leta::daemon::dispatcher::Dispatcher;

fn init_logging() -> Result<()> {
    let log_dir = config::log_dir();
    std::fs::create_dir_all(&log_dir).context("failed to create log directory")?;
    let log_path = log_dir.join("daemon.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(file)
        .with_ansi(false)
        .init();
    Ok(())
}

/// Resolve on the first SIGTERM or SIGINT.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            _ = sigint.recv() => tracing::info!("received SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    tracing::info!("leta-daemon {} starting", env!("CARGO_PKG_VERSION"));

    let config = config::load().context("failed to load config")?;
    let dispatcher = Dispatcher::bootstrap(config).context("failed to bootstrap daemon")?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    dispatcher.run(shutdown_rx).await
}
