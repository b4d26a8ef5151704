//! ignite-thin - Command-line thin client for Apache Ignite
//!
//! Runs one cache operation per invocation and prints the result as JSON.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use ignite_client::Client;
use ignite_protocol::{ProtocolVersion, TypeHint, TypeHints};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ignite-thin")]
#[command(about = "Thin client for Apache Ignite caches")]
#[command(version)]
struct Cli {
    /// YAML config file
    #[arg(short, long, env = "IGNITE_CONFIG")]
    config: Option<PathBuf>,

    /// Node host
    #[arg(long)]
    host: Option<String>,

    /// Node thin client port
    #[arg(short, long)]
    port: Option<u16>,

    /// Username for authentication
    #[arg(short, long)]
    username: Option<String>,

    /// Password for authentication
    #[arg(long)]
    password: Option<String>,

    /// Protocol version to propose (1.0.0 or 1.1.0)
    #[arg(long)]
    protocol_version: Option<ProtocolVersion>,

    /// Wire type for keys (byte, short, int, long, float, double, char, bool, string, object:TYPE)
    #[arg(long, global = true)]
    key_type: Option<TypeHint>,

    /// Wire type for values
    #[arg(long, global = true)]
    value_type: Option<TypeHint>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store a value
    Put {
        cache: String,
        key: String,
        value: String,
    },

    /// Read a value
    Get { cache: String, key: String },

    /// Remove a key
    Remove { cache: String, key: String },

    /// Check whether a key is present
    Contains { cache: String, key: String },

    /// Remove every entry of a cache
    Clear { cache: String },

    /// Count the entries of a cache
    Size { cache: String },

    /// List cache names
    Names,

    /// Create a cache
    Create { name: String },

    /// Destroy a cache
    Destroy { name: String },

    /// Iterate over the entries of a cache
    Scan {
        cache: String,

        /// Entries per page
        #[arg(long, default_value = "1024")]
        page_size: i32,

        /// Stop after this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Read several keys
    GetAll {
        cache: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Store several KEY=VALUE pairs
    PutAll {
        cache: String,
        #[arg(required = true)]
        pairs: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).map_err(|e| {
        eprintln!("{}: {}", "Configuration error".red(), e);
        e
    })?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(username) = cli.username {
        config.username = Some(username);
    }
    if let Some(password) = cli.password {
        config.password = Some(password);
    }
    if let Some(version) = cli.protocol_version {
        config.protocol_version = version;
    }
    config.validate().map_err(|e| {
        eprintln!("{}: {}", "Configuration error".red(), e);
        e
    })?;

    let hints = TypeHints {
        key: cli.key_type,
        value: cli.value_type,
    };

    tracing::debug!("Connecting to {}:{}", config.host, config.port);
    let client = Client::new(config.connection_config());
    client.connect().await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;

    let result = commands::execute(&client, cli.command, &hints).await;
    client.close().await?;

    match result {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
