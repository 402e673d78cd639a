//! tunectl - live tuning CLI
//!
//! A command-line tool for observing and live-tuning the properties a
//! tuning agent exposes in its remote store.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{entries, status};
use output::{print_error, OutputFormat};

/// Live tuning CLI
#[derive(Parser)]
#[command(name = "tunectl")]
#[command(author, version, about = "CLI for live-tuning properties over a tuning agent", long_about = None)]
pub struct Cli {
    /// Agent URL (can also be set via TUNECTL_API_URL env var) [default: http://localhost:8080]
    #[arg(long, env = "TUNECTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List entries in the remote store
    List {
        /// Only entries whose key starts with this prefix (e.g. /Drivetrain)
        #[arg(long, short)]
        prefix: Option<String>,
    },

    /// Show one entry
    Get {
        /// Entry key (e.g. /Drivetrain/targetSpeed)
        key: String,
    },

    /// Write an entry; the agent applies it on its next control cycle
    Set {
        /// Entry key (e.g. /Drivetrain/targetSpeed)
        key: String,

        /// New value, parsed as bool, then number, then string
        #[arg(allow_hyphen_values = true)]
        value: String,
    },

    /// Show agent health and readiness
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let file_config = config::Config::load()?;

    let api_url = file_config.api_url(cli.api_url);
    let format = cli
        .format
        .or_else(|| {
            file_config
                .default_format
                .as_deref()
                .and_then(OutputFormat::from_name)
        })
        .unwrap_or_default();

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    // Execute command
    match cli.command {
        Commands::List { prefix } => {
            entries::list_entries(&client, prefix, format).await?;
        }
        Commands::Get { key } => {
            entries::get_entry(&client, &key, format).await?;
        }
        Commands::Set { key, value } => {
            entries::set_entry(&client, &key, &value, format).await?;
        }
        Commands::Status => {
            status::show_status(&client, format).await?;
        }
    }

    Ok(())
}
