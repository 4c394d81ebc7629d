//! `tilestash serve`: run the HTTP API until interrupted.

use std::net::SocketAddr;

use clap::Args;
use tracing::info;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for `serve`.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Listen address (overrides [server] bind)
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

pub async fn run(args: ServeArgs) -> Result<(), CliError> {
    let mut runner = CliRunner::new(args.debug, true)?;
    if let Some(bind) = args.bind {
        runner.config_mut().server.bind = bind;
    }
    runner.log_startup("serve");

    let service = runner.create_service()?;
    let bind = runner.config().server.bind;
    service
        .serve(bind, shutdown_signal())
        .await
        .map_err(CliError::Serve)?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
