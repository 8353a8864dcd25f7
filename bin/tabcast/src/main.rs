mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "tabcast")]
#[command(about = "MQTT-driven browser URL bridge", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge daemon (long-running)
    Run {
        /// Config file path (defaults to ~/.tabcast/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Navigate the local browser once, bypassing the bus
    Navigate {
        /// Target URL
        #[arg(short, long)]
        url: String,

        /// Debugger port (overrides config debuggerPort)
        #[arg(long)]
        debugger_port: Option<u16>,

        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run environment diagnostics
    Doctor {
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show {
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the default config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Run { config } => {
            commands::run_cmd::run(config).await?;
        }
        Commands::Navigate {
            url,
            debugger_port,
            config,
        } => {
            commands::navigate_cmd::run(&url, debugger_port, config).await?;
        }
        Commands::Doctor { config } => {
            commands::doctor::run(config).await?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show { config } => {
                commands::config_cmd::show(config)?;
            }
            ConfigCommands::Path => {
                commands::config_cmd::path();
            }
        },
    }

    Ok(())
}
