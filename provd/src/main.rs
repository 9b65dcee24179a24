//! provd daemon
//!
//! `provd run --stdio` serves the provisioning protocol through a line
//! bridge to the GATT host, backed by the simulated gateway.

mod bridge;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::*;
use provd::Config;

#[derive(Parser)]
#[command(name = "provd")]
#[command(about = "BLE provisioning agent for cellular/Wi-Fi gateways")]
struct Cli {
    /// Config file (default: $PROVD_HOME/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent
    Run {
        /// Exchange GATT traffic with the host as hex lines on stdin/stdout
        #[arg(long)]
        stdio: bool,
    },
    /// Write the default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Print the effective config
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(Config::default_path);

    match cli.command {
        Commands::Run { stdio } => {
            let config = Config::load(&path)?;
            if !stdio {
                return Err("no BLE host backend in this build, use --stdio".into());
            }
            info!("Starting {} from {}", config.device_name, path.display());
            bridge::run(config).await?;
        }
        Commands::InitConfig { force } => {
            if path.exists() && !force {
                return Err(format!("{} exists, use --force to overwrite", path.display()).into());
            }
            Config::default().save(&path)?;
            println!("Wrote {}", path.display());
        }
        Commands::ShowConfig => {
            let config = Config::load(&path)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
