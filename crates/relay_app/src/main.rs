mod chat;
mod config;

use std::path::PathBuf;

use clap::Parser;
use relay_logging::relay_info;

use crate::chat::ChatLoop;
use crate::config::{AppConfig, LogTarget, DEFAULT_CONFIG_PATH};

/// Chat with a streaming generation endpoint; `[include-url: ...]`
/// directives in a message are replaced by the text of the page they name.
#[derive(Debug, Parser)]
#[command(name = "relay", version)]
struct Cli {
    /// Path to the RON configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Override the generation endpoint from the configuration.
    #[arg(long)]
    endpoint: Option<String>,
    /// Log to the terminal instead of the configured destination.
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(&cli.config)?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
        config.endpoint_url()?;
    }
    if cli.verbose {
        config.log.target = LogTarget::Terminal;
    }

    relay_logging::initialize(
        config.log.target.into(),
        config.log.level_filter()?,
        &config.log.path,
    );
    relay_info!("Starting relay against {}", config.endpoint);

    let relay = config.build_relay()?;
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    ChatLoop::new(relay).run(stdin).await
}
