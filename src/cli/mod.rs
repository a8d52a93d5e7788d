//! Command-line interface for operator inspection of the orchestrator.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "factotum")]
#[command(about = "Factotum - task orchestration and resumption engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize factotum configuration and database
    Init(commands::init::InitArgs),

    /// Task inspection and management commands
    Task(commands::task::TaskArgs),
}

/// Print an error and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) {
    if json_mode {
        let payload = serde_json::json!({ "error": err.to_string() });
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&payload).unwrap_or_else(|_| err.to_string())
        );
    } else {
        eprintln!("{} {:#}", console::style("error:").red().bold(), err);
    }
    std::process::exit(1);
}
