//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// SentrySol - wallet risk analysis with streamed progress
#[derive(Parser, Debug)]
#[command(name = "sentrysol")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "SENTRYSOL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "SENTRYSOL_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "SENTRYSOL_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (default)
    Serve {
        /// Host to bind to
        #[arg(long, env = "SENTRYSOL_HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "SENTRYSOL_PORT")]
        port: Option<u16>,
    },

    /// Analyze one wallet and print the event stream
    Analyze {
        /// Wallet address
        #[arg(required = true)]
        address: String,

        /// Number of transactions to fetch
        #[arg(short, long)]
        limit: Option<usize>,
    },
}
