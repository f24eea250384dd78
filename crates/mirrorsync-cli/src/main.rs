mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "mirrorsync",
    version,
    about = "Keeps search and analytics stores in sync with a primary store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync engine
    Run {
        /// Path to sync YAML file
        config: PathBuf,
        /// Run exactly one tick, then exit
        #[arg(long)]
        once: bool,
    },
    /// Validate configuration and collaborator connectivity
    Check {
        /// Path to sync YAML file
        config: PathBuf,
    },
    /// Print the current watermark cursors
    Status {
        /// Path to sync YAML file
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run { config, once } => commands::run::execute(&config, once).await,
        Commands::Check { config } => commands::check::execute(&config).await,
        Commands::Status { config } => commands::status::execute(&config),
    }
}
