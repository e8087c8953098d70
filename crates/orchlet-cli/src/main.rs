//! orchlet CLI
//!
//! Command-line interface for interacting with the orchlet daemon.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// orchlet - client for the orchlet service orchestrator
#[derive(Parser, Debug)]
#[command(name = "orchlet")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Daemon API address
    #[arg(long, default_value = "http://localhost:9090", global = true)]
    api: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register an instance of a service
    Register {
        /// Service name
        service: String,

        /// Instance id
        id: String,

        /// Instance host
        host: String,

        /// Instance port
        port: u16,
    },

    /// List the instances of a service
    Instances {
        /// Service name
        service: String,
    },

    /// List all services
    Services,

    /// Execute a request against a service
    Call {
        /// Service name
        service: String,

        /// JSON payload
        #[arg(default_value = "{}")]
        payload: String,
    },

    /// Show system status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let client = commands::ApiClient::new(&cli.api);

    match cli.command {
        Commands::Register {
            service,
            id,
            host,
            port,
        } => {
            commands::register(&client, &service, id, host, port).await?;
        }
        Commands::Instances { service } => {
            commands::instances(&client, &service).await?;
        }
        Commands::Services => {
            commands::services(&client).await?;
        }
        Commands::Call { service, payload } => {
            commands::call(&client, &service, &payload).await?;
        }
        Commands::Status => {
            commands::status(&client).await?;
        }
    }

    Ok(())
}
