//! Strata daemon: control plane for model-serving deployments
//!
//! Serves the REST API and drives the external reconciler.

use clap::Parser;
use strata_daemon::error::{DaemonError, DaemonResult};
use strata_daemon::{DaemonConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Strata daemon CLI
#[derive(Parser)]
#[command(name = "stratad")]
#[command(about = "Strata - Model-serving control plane daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "STRATA_CONFIG")]
    config: Option<String>,

    /// Listen address, overrides the configuration file
    #[arg(short, long, env = "STRATA_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level, overrides the configuration file
    #[arg(long, env = "STRATA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "STRATA_LOG_JSON")]
    json: bool,

    /// Reconciler host
    #[arg(long, env = "RECONCILER_HOST")]
    reconciler_host: Option<String>,

    /// Reconciler port
    #[arg(long, env = "RECONCILER_PORT")]
    reconciler_port: Option<u16>,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    if let Some(host) = cli.reconciler_host {
        config.reconciler.host = Some(host);
    }
    if let Some(port) = cli.reconciler_port {
        config.reconciler.port = Some(port);
    }

    init_tracing(&config.logging.level, config.logging.json);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        "Starting strata daemon"
    );

    let server = Server::new(config).await.inspect_err(|err| {
        tracing::error!(error = %err, "Failed to start");
    })?;
    server.run().await
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
