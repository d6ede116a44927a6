//! Listening server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::chain::Collaborators;
use crate::config::Config;
use crate::pipeline::Orchestrator;
use crate::{Error, Result};

/// SentrySol HTTP server
pub struct Server {
    config: Config,
    collaborators: Collaborators,
}

impl Server {
    /// Create a server with HTTP-backed collaborators.
    pub fn new(config: Config) -> Result<Self> {
        let collaborators = Collaborators::from_config(&config)?;
        Ok(Self::with_collaborators(config, collaborators))
    }

    /// Create a server around an existing set of collaborators.
    #[must_use]
    pub fn with_collaborators(config: Config, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    /// Shared state for the router.
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            orchestrator: Arc::new(Orchestrator::new(
                self.collaborators.clone(),
                self.config.analysis.clone(),
            )),
            keep_alive_interval: self.config.server.keep_alive_interval,
            event_buffer: self.config.server.event_buffer,
        })
    }

    /// Serve until Ctrl+C or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        for (name, configured) in [
            ("activity", self.collaborators.activity.is_configured()),
            ("compliance", self.collaborators.compliance.is_configured()),
            ("narrative", self.collaborators.narrative.is_configured()),
        ] {
            if !configured {
                warn!(collaborator = name, "No API key configured, calls will degrade to defaults");
            }
        }

        let app = create_router(self.state());
        let listener = TcpListener::bind(addr).await?;
        info!(address = %addr, version = env!("CARGO_PKG_VERSION"), "SentrySol listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Server stopped");
        Ok(())
    }
}

/// Resolve on Ctrl+C or SIGTERM. A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
