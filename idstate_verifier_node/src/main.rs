use clap::{Parser, Subcommand};
use idstate_verifier_node::{ApiServer, AppState, Config};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve sign-in requests and callbacks (default)
    Run,
    /// Print the effective configuration as TOML
    PrintConfig,
    /// Write the default configuration to the config path
    InitConfig,
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        Ok(Config::from_file(path)?)
    } else {
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    // Initialize tracing subscriber; RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone()),
        ))
        .with(fmt::layer())
        .init();

    match args.command.unwrap_or(Commands::Run) {
        Commands::PrintConfig => {
            println!("{}", config.to_toml()?);
        }
        Commands::InitConfig => {
            config.to_file(&args.config)?;
            info!("Wrote configuration to {}", args.config.display());
        }
        Commands::Run => {
            if !args.config.exists() {
                warn!(
                    "No configuration at {}, using defaults",
                    args.config.display()
                );
            }
            let bind_address = format!("{}:{}", config.api.bind_address, config.api.port);
            info!(
                "Resolving identity states with the {:?} resolver",
                config.resolver.kind
            );
            let state = Arc::new(AppState::from_config(config)?);
            ApiServer::new(state, bind_address).start().await?;
        }
    }

    Ok(())
}
