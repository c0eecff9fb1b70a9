//! Command-line interface for the supplement service.
//!
//! Provides commands for serving requests over MQTT, calculating a single
//! request offline, and showing the resolved configuration.

use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::adapters::MqttTransport;
use crate::config::{Config, ConfigLayer};
use crate::core::{calculator, compute_response, ConnectionState, Router};

/// winter-supplement - Winter Supplement rules engine
#[derive(Parser, Debug)]
#[command(name = "winter-supplement")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: ConfigLayer,

    /// YAML config file (values are overridden by flags and environment)
    #[arg(long, env = "WINTER_SUPPLEMENT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Connect to the broker and serve calculation requests (default)
    Serve,

    /// Calculate a single request and print the result
    Calculate {
        /// Input file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Show resolved configuration
    Config,
}

impl Cli {
    /// Resolve configuration from flags, environment and config file
    pub fn load_config(&self) -> Result<Config> {
        Config::load(self.settings.clone(), self.config.as_deref())
    }

    /// Execute the CLI command
    pub async fn execute(self, config: Config) -> Result<()> {
        match self.command.unwrap_or(Commands::Serve) {
            Commands::Serve => serve(config).await,
            Commands::Calculate { input } => calculate(input),
            Commands::Config => show_config(&config),
        }
    }
}

/// Run the router until the connection ends or the process is interrupted
async fn serve(config: Config) -> Result<()> {
    info!("Starting Winter Supplement Rules Engine...");

    let mut router = Router::new(config, MqttTransport::new());

    tokio::select! {
        state = router.connect() => {
            if state == ConnectionState::Failed {
                warn!("Router stopped without a broker connection");
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutting down");
        }
    }

    Ok(())
}

/// Calculate one request read from a file or stdin
fn calculate(input: Option<PathBuf>) -> Result<()> {
    let payload = if let Some(path) = input {
        std::fs::read(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?
    } else {
        let mut buffer = Vec::new();
        io::stdin()
            .read_to_end(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    };

    let response = compute_response(&payload, calculator::calculate)?;
    let response = String::from_utf8(response).context("Result is not valid UTF-8")?;
    println!("{}", response);

    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    let rendered = serde_yaml::to_string(config).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}
