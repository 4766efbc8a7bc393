//! vstore CLI
//!
//! A thin microservice client for a vstore authority.
//!
//! # Commands
//!
//! - `watch` - Subscribe and log every change until Ctrl-C
//! - `get` - Read values once and print them as JSON
//! - `set` - Write one value
//! - `check-fragment` - Validate a schema fragment file

mod commands;

use clap::{Parser, Subcommand};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vstore_sync_engine::{ClientConfig, Endpoint, DEFAULT_PORT};

/// vstore microservice client.
#[derive(Parser)]
#[command(name = "vstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Authority stream-socket address
    #[arg(global = true, long, value_name = "HOST:PORT", conflicts_with = "unix")]
    tcp: Option<SocketAddr>,

    /// Authority local-domain socket path
    #[arg(global = true, long, value_name = "PATH")]
    unix: Option<PathBuf>,

    /// Application name used as this client's key under shared roots
    #[arg(global = true, short, long, default_value = "vstore-cli")]
    app: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe and log every change until Ctrl-C
    Watch {
        /// Subscribe to the whole tree, lifting the shared-root filters
        #[arg(long)]
        subscribe_all: bool,

        /// Subtree roots to subscribe to
        ids: Vec<String>,
    },

    /// Read values once and print them as JSON
    Get {
        /// Seconds to wait for the authority
        #[arg(short, long, default_value = "5")]
        timeout: u64,

        /// Values to read
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Write one value
    Set {
        /// Seconds to wait for the authority
        #[arg(short, long, default_value = "5")]
        timeout: u64,

        /// Value to write
        id: String,

        /// Payload as JSON, e.g. '{"text":"hello"}'
        data: String,
    },

    /// Validate a schema fragment file
    CheckFragment {
        /// Fragment file
        file: PathBuf,
    },
}

impl Cli {
    fn config(&self) -> ClientConfig {
        let endpoint = match (&self.unix, self.tcp) {
            (Some(path), _) => Endpoint::Unix(path.clone()),
            (None, Some(addr)) => Endpoint::Tcp(addr),
            (None, None) => Endpoint::Tcp(SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT))),
        };
        ClientConfig::new(self.app.clone(), endpoint)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flag
    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.config();
    match cli.command {
        Commands::Watch { subscribe_all, ids } => {
            commands::watch::run(config, subscribe_all, &ids).await?;
        }
        Commands::Get { timeout, ids } => {
            commands::get::run(config, &ids, Duration::from_secs(timeout)).await?;
        }
        Commands::Set { timeout, id, data } => {
            commands::set::run(config, &id, &data, Duration::from_secs(timeout)).await?;
        }
        Commands::CheckFragment { file } => {
            commands::check_fragment::run(&file)?;
        }
    }

    Ok(())
}
