mod config;
mod error;

use clap::Parser;
use config::{Cli, ServerConfig};

mod cmd;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let result = match ServerConfig::from_cli(&cli) {
        Ok(config) => cmd::serve::run(config).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
