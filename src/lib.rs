//! SentrySol wallet risk analysis
//!
//! Ingests a Solana address's transaction history and produces a risk
//! assessment plus a transaction-flow graph, reported stage by stage over
//! Server-Sent Events.
//!
//! # Pipeline
//!
//! 1. Transaction history, balance and token metadata from the activity source
//! 2. Compliance risk score from the compliance source
//! 3. Pattern scoring and flow-graph construction
//! 4. A capped context bundle handed to the narrative generator
//!
//! Collaborator failures degrade to defaults; only faults in the core
//! computation end a run early.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod analysis;
pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod failsafe;
pub mod pipeline;
pub mod server;
pub mod trace;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let result = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };
    result.map_err(|e| Error::Internal(format!("tracing already initialized: {e}")))
}
