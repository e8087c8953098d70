//! orchlet daemon
//!
//! Hosts an orchestrator, bootstraps statically configured instances and
//! serves the REST API until interrupted.

use anyhow::Context;
use clap::Parser;
use orchlet_api::create_router;
use orchlet_core::{InstanceConfig, OrchestratorConfig};
use orchlet_dispatch::{Capabilities, Orchestrator};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// orchletd - client-side service orchestrator with health checks and failover
#[derive(Parser, Debug)]
#[command(name = "orchletd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind the API server (overrides the config file)
    #[arg(long)]
    address: Option<String>,

    /// Port for the REST API server (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Instance to register at startup, as service=id@host:port
    #[arg(long = "instance", value_parser = parse_instance)]
    instances: Vec<InstanceConfig>,
}

fn parse_instance(s: &str) -> Result<InstanceConfig, String> {
    let (service, rest) = s
        .split_once('=')
        .ok_or_else(|| format!("expected service=id@host:port, got '{}'", s))?;
    let (id, addr) = rest
        .split_once('@')
        .ok_or_else(|| format!("missing '@' in '{}'", s))?;
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| format!("missing port in '{}'", s))?;
    let port: u16 = port
        .parse()
        .map_err(|_| format!("invalid port '{}' in '{}'", port, s))?;

    if service.is_empty() || id.is_empty() || host.is_empty() {
        return Err(format!("empty service, id or host in '{}'", s));
    }

    Ok(InstanceConfig {
        service: service.to_string(),
        id: id.to_string(),
        host: host.to_string(),
        port,
    })
}

fn load_config(args: &Args) -> anyhow::Result<OrchestratorConfig> {
    let mut config = match &args.config {
        Some(path) => OrchestratorConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => OrchestratorConfig::default(),
    };

    if let Some(address) = &args.address {
        config.api.address = address.clone();
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    config.instances.extend(args.instances.iter().cloned());

    Ok(config)
}

fn init_logging(config: &OrchestratorConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log level")?;

    let result = if config.logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl-c");
        return;
    }
    info!("Received ctrl-c, shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!("Starting orchlet daemon v{}", env!("CARGO_PKG_VERSION"));

    let capabilities = Capabilities::http(&config.transport)?;
    let addr: SocketAddr = format!("{}:{}", config.api.address, config.api.port)
        .parse()
        .context("invalid API address")?;
    let bootstrap = config.instances.clone();

    let orchestrator = Arc::new(Orchestrator::start(config, capabilities)?);
    for instance in &bootstrap {
        orchestrator.register_spec(instance.into()).await;
    }
    info!(instances = bootstrap.len(), "Bootstrapped static instances");

    let router = create_router(Arc::clone(&orchestrator));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("API server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    orchestrator.shutdown().await;
    info!("orchlet daemon stopped");
    Ok(())
}
