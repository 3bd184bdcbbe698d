use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Concord - BFT consensus node
#[derive(Parser)]
#[command(name = "concord")]
#[command(about = "Concord node and utilities")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a Concord node
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,
    },

    /// Initialize a new devnet configuration
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,

        /// Number of genesis validators, all run by this node
        #[arg(long, default_value = "1")]
        validators: usize,
    },

    /// Generate validator keys
    Keygen {
        /// Output file for the secret keys (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
