//! Claimbridge CLI - host for the ticket bridge
//!
//! Loads the bridge configuration, installs logging and runs a scripted
//! session against the simulated identity engine:
//! - claim requests with mixed outcomes
//! - handler, inbox, waiter and late-registration delivery
//! - claim proof and ticket listing

use clap::{Parser, Subcommand};
use claimbridge_core::BridgeConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;
mod output;

use commands::demo::{self, DemoArgs};
use error::{CliError, CliResult};
use output::OutputFormat;

/// Claimbridge CLI
#[derive(Parser)]
#[command(name = "claimbridge")]
#[command(about = "Claimbridge - ticket correlation for identity engines", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CLAIMBRIDGE_CONFIG")]
    config: Option<String>,

    /// Log level (defaults to the configured level)
    #[arg(long, env = "CLAIMBRIDGE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "CLAIMBRIDGE_LOG_JSON")]
    json: bool,

    /// Output format (table, json)
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run a scripted session against the simulated engine
    Demo(DemoArgs),

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = BridgeConfig::load(cli.config.as_deref())
        .map_err(|e| CliError::Config(e.to_string()))?;

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    match cli.command {
        Commands::Demo(args) => demo::execute(args, config, cli.output).await,
        Commands::Config => output::print_json(&config),
    }
}
