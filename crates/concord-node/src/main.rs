use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;
mod config;
mod devnet;
mod node;

use cli::{Cli, Commands};
use config::{generate_sample_config, LocalValidatorConfig, NodeConfig};
use node::Node;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging, RUST_LOG overrides the default level
    let _subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .pretty()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            run_node(config).await?;
        }
        Commands::Init { output, validators } => {
            init_config(output, validators)?;
        }
        Commands::Keygen { output } => {
            generate_keys(output)?;
        }
    }

    Ok(())
}

/// Run a Concord node
async fn run_node(config_path: PathBuf) -> Result<()> {
    info!("Loading configuration from {:?}", config_path);

    let config = if config_path.exists() {
        NodeConfig::load(&config_path)?
    } else {
        error!(
            "Configuration file not found: {:?}. Run 'concord init' to create one.",
            config_path
        );
        return Err(anyhow::anyhow!("Configuration file not found"));
    };

    let node = Node::new(config)?;
    node.run().await?;

    Ok(())
}

/// Initialize a new configuration file
fn init_config(output: PathBuf, validators: usize) -> Result<()> {
    info!("Generating devnet configuration with {} validators", validators);

    let config = generate_sample_config(validators)?;
    config.save(&output)?;

    info!(
        "Certificate threshold {} of {}",
        config.genesis.certificate_threshold,
        config.genesis.validators.len()
    );

    println!("\nConfiguration file created: {}", output.display());
    println!("\nTo start the node, run:");
    println!("  concord run --config {}", output.display());

    Ok(())
}

/// Generate generator and BLS keys for one validator
fn generate_keys(output: Option<PathBuf>) -> Result<()> {
    let keys = LocalValidatorConfig::generate();
    let entry = keys.to_genesis_entry(1)?;
    let info = keys.to_validator_info()?;

    println!("Generated validator keys:");
    println!("  Address:        {}", info.address);
    println!("  Generator key:  {}", entry.generator_key);
    println!("  BLS key:        {}", entry.bls_key);

    if let Some(path) = output {
        std::fs::write(&path, serde_json::to_string_pretty(&keys)?)?;
        info!("Secret keys saved to {:?}", path);
    } else {
        println!("  Generator secret: {}", keys.generator_secret);
        println!("  BLS secret:       {}", keys.bls_secret);
    }

    println!("\nWARNING: Keep your secret keys safe! Do not share them with anyone.");

    Ok(())
}
