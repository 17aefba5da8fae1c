//! Daemon entry point.
//!
//! Exit codes: 0 on clean shutdown, 1 on startup failure, 2 on CLI misuse
//! (clap's default).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use keva_node::logging::{init_logging, LogFormat};
use keva_node::{Node, NodeConfig};
use keva_types::ACTIVE_NETWORK;

#[derive(Parser, Debug)]
#[command(name = "keva-daemon", about = "Run a keva node", version)]
struct Cli {
    /// Override the ledger data directory.
    #[arg(long, env = "KEVA_DATA_PATH")]
    data_path: Option<PathBuf>,

    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(path)?,
        None => NodeConfig::default(),
    };
    if let Some(data_path) = &cli.data_path {
        config.data_dir = data_path.clone();
    }
    // Keep the per-network ledgers apart under one data root.
    config.data_dir = config.data_dir.join(ACTIVE_NETWORK.as_str());
    Ok(config)
}

async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let node = Node::new(config, ACTIVE_NETWORK).await?;
    node.start().await?;
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    node.stop();
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(
        LogFormat::from_str(&config.log_format),
        &config.log_level,
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("runtime startup failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "node failed to start");
            ExitCode::FAILURE
        }
    }
}
