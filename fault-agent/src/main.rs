//! chaosd binary entry point.
//!
//! Usage:
//! ```bash
//! chaosd --config chaosd.toml
//! chaosd --bind 127.0.0.1:9000
//! ```

use anyhow::Context;
use chaosd_agent::config::Config;
use chaosd_agent::http::build_router;
use chaosd_agent::logging;
use chaosd_agent::server::{running_as_root, ChaosAgent};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};

/// Fault-injection agent for chaos experiments.
#[derive(Parser, Debug)]
#[command(name = "chaosd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (missing file means defaults)
    #[arg(long, short, default_value = "chaosd.toml")]
    config: PathBuf,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    logging::init(&config.logging)?;

    let addr: SocketAddr = config
        .server
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind_address))?;
    let drain_timeout = Duration::from_secs(config.shutdown.drain_timeout_secs);

    let agent = Arc::new(ChaosAgent::connect(config)?);
    agent.check_docker().await;

    if !running_as_root() {
        warn!("not running as root, docker socket and tc access may fail");
    }

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, version = env!("CARGO_PKG_VERSION"), "chaosd listening");

    axum::serve(listener, build_router(agent.clone()).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        active = agent.engine().active().len(),
        "shutting down, waiting for running faults to clean up"
    );
    if !agent.engine().drain(drain_timeout).await {
        warn!("some faults did not finish cleanup; check container limits and tc rules");
    }

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = ctrl_c() => {},
            _ = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => warn!(?err, "failed to install SIGTERM handler"),
    }
}
