//! SentrySol - wallet risk analysis service

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use tracing::{error, info};

use sentrysol::{
    chain::Collaborators,
    cli::{Cli, Command},
    config::Config,
    pipeline::{AnalysisRequest, DONE_MARKER, Orchestrator, events::format_line},
    server::Server,
    setup_tracing, trace,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Analyze { address, limit }) => run_analyze(config, address, limit).await,
        Some(Command::Serve { host, port }) => run_server(config, host, port).await,
        None => run_server(config, None, None).await,
    }
}

/// Run one analysis locally and print each event as a prefixed line
async fn run_analyze(config: Config, address: String, limit: Option<usize>) -> ExitCode {
    let request = match AnalysisRequest::new(address, limit, &config.analysis) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let collaborators = match Collaborators::from_config(&config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create collaborators: {e}");
            return ExitCode::FAILURE;
        }
    };

    let orchestrator = Arc::new(Orchestrator::new(collaborators, config.analysis.clone()));
    let mut events = orchestrator.stream(request, config.server.event_buffer, trace::generate());

    let mut succeeded = false;
    while let Some(event) = events.next().await {
        print!("{}", event.to_line());
        if event.is_success() {
            succeeded = true;
            print!("{}", format_line(DONE_MARKER));
        }
    }

    if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Run the HTTP server
async fn run_server(mut config: Config, host: Option<String>, port: Option<u16>) -> ExitCode {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "Starting SentrySol"
    );

    let server = match Server::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}
