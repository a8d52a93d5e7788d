//! Factotum CLI entry point.

use clap::Parser;

use factotum::cli::{Cli, Commands};
use factotum::domain::models::LoggingConfig;

#[tokio::main]
async fn main() {
    // CLI commands run before any config exists, so logging starts from
    // defaults; RUST_LOG still overrides.
    if let Err(err) = factotum::infrastructure::logging::init(&LoggingConfig::default()) {
        eprintln!("warning: {}", err);
    }

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init(args) => factotum::cli::commands::init::execute(args, cli.json).await,
        Commands::Task(args) => factotum::cli::commands::task::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        factotum::cli::handle_error(err, cli.json);
    }
}
