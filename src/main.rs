use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use swerve_module_runtime::config::{IoKind, ModuleConfig};

/// Runs one swerve module: 50 Hz control loop driven by zenoh commands
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON module config; defaults are used for anything missing
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the record-only replay IO instead of the servo bus
    #[arg(long)]
    replay: bool,

    /// Serial port of the servo bus (overrides the config file)
    #[arg(short, long)]
    port: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ModuleConfig::load(path)?,
        None => ModuleConfig::default(),
    };
    if args.replay {
        config.io = IoKind::Replay;
    }
    if let Some(port) = args.port {
        config.serial_port = port;
    }

    if let Err(e) = swerve_module_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
