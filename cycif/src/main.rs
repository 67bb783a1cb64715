//! Command-line entry point for the CyCIF crypt-compartment analysis
//! pipeline: cell-to-crypt assignment (part 6) and the downstream group
//! statistics (parts 7a and 7b), all driven by one TOML configuration.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod assign;
mod config;
mod multi_group;
mod two_group;

use config::AnalysisConfig;

#[derive(Parser)]
#[command(name = "cycif", about = "CyCIF crypt compartment analysis pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assign cells to crypt compartments under the strict and buffered
    /// policies and report crypt areas.
    Assign {
        /// Run configuration TOML.
        #[arg(long)]
        config: PathBuf,
    },
    /// Two-group rank-sum comparison per tissue metric, with bar plots.
    TwoGroup {
        /// Run configuration TOML.
        #[arg(long)]
        config: PathBuf,
    },
    /// Kruskal-Wallis comparison across all groups, with boxplots.
    MultiGroup {
        /// Run configuration TOML.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match Cli::parse().command {
        Command::Assign { config } => assign::run(&AnalysisConfig::load(&config)?),
        Command::TwoGroup { config } => two_group::run(&AnalysisConfig::load(&config)?),
        Command::MultiGroup { config } => multi_group::run(&AnalysisConfig::load(&config)?),
    }
}
