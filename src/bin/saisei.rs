use clap::{command, Parser};
use saisei::config::SystemConfig;
use saisei::gateway::stdio::StdioGateway;
use saisei::system::{System, RESTART_EXIT_CODE};
use saisei::{Error, SaiseiResult};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Enable debug mode
    #[arg(short, long)]
    verbose: bool,
}

async fn run(cli: &Cli) -> SaiseiResult<()> {
    let config = SystemConfig::load(&cli.config)?;
    info!("config loaded.");
    debug!("config: {:?}", config);

    let (gateway, intake) = StdioGateway::channel(config.event_buffer_size);
    let system = System::new(config, gateway)?;

    tokio::select! {
        result = system.run(intake) => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|e| Error::internal(format!("Failed to wait for Ctrl+C: {}", e)))?;
            println!("Shutdown signal received, exiting.");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    if let Err(e) = run(&cli).await {
        if e.is_restart() {
            eprintln!("{}", e);
            std::process::exit(RESTART_EXIT_CODE);
        }
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
