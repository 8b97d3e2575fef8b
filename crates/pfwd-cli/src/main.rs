//! pfwd — TCP port forwarder.
//!
//! Accepts connections on a local address and relays them, unmodified and
//! bidirectionally, to a remote `ip:port` or `domain:port` target. Domain
//! targets are re-resolved periodically so long-lived forwarders follow
//! DNS record rotation.

mod config;

use std::path::PathBuf;

use clap::Parser;
use pfwd_core::Forwarder;
use tracing::{error, info};

/// pfwd — TCP port forwarder
#[derive(Parser, Debug)]
#[command(name = "pfwd", version, about = "TCP port forwarder with DNS-backed targets")]
struct Cli {
    /// Local bind address, e.g. 0.0.0.0:808
    #[arg(short = 'l', long = "local")]
    local: Option<String>,

    /// Remote address, e.g. 1.1.1.1:80 or example.com:80
    #[arg(short = 'r', long = "remote")]
    remote: Option<String>,

    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Per-leg read idle timeout in seconds
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Domain re-resolution interval in seconds
    #[arg(long)]
    refresh_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let forwarder_config = match config::load(
        cli.config.as_deref(),
        cli.local,
        cli.remote,
        cli.idle_timeout,
        cli.refresh_interval,
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let remote = forwarder_config.remote_addr.clone();
    let forwarder = match Forwarder::new(forwarder_config).await {
        Ok(f) => f,
        Err(e) => {
            error!(error = %e, "failed to create forwarder");
            std::process::exit(1);
        }
    };

    let local = match forwarder.start().await {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "failed to start forwarder");
            std::process::exit(1);
        }
    };
    info!(local = %local, remote = %remote, "pfwd running");

    shutdown_signal().await;
    info!("received shutdown signal");
    forwarder.stop();

    info!("pfwd stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
