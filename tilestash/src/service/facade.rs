//! TileStash service facade implementation.

use super::builder::{
    clear_spool, create_converters, create_directories, create_orchestrator, create_store,
};
use super::error::ServiceError;
use crate::config::ConfigFile;
use crate::http::{self, AppState};
use crate::import::ImportOrchestrator;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// How long running imports get to record their outcome on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// High-level facade for the tileset service.
///
/// Encapsulates component creation and wiring: record store, archive
/// catalog, converters, import orchestrator and the HTTP router.
///
/// # Example
///
/// ```ignore
/// use tilestash::config::ConfigFile;
/// use tilestash::service::TileStashService;
///
/// let config = ConfigFile::load()?;
/// let service = TileStashService::from_config(&config)?;
/// service.serve(config.server.bind, async { let _ = tokio::signal::ctrl_c().await; }).await?;
/// ```
pub struct TileStashService {
    config: ConfigFile,
    orchestrator: ImportOrchestrator,
}

impl TileStashService {
    /// Create the service from configuration.
    ///
    /// Creates the data directories, opens the record store and builds the
    /// converters.
    pub fn from_config(config: &ConfigFile) -> Result<Self, ServiceError> {
        create_directories(&config.storage)?;

        let store = create_store(&config.storage)?;
        let converters = create_converters(&config.import)?;
        let orchestrator = create_orchestrator(config, store, converters);

        Ok(Self {
            config: config.clone(),
            orchestrator,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn orchestrator(&self) -> &ImportOrchestrator {
        &self.orchestrator
    }

    /// HTTP router over this service's orchestrator.
    pub fn router(&self) -> Router {
        let state = AppState::new(self.orchestrator.clone(), self.config.storage.uploads_dir());
        http::router(state, self.config.server.max_upload_size)
    }

    /// Serves HTTP on `bind` until `shutdown` resolves, then waits for
    /// running imports to record their outcome.
    pub async fn serve<F>(&self, bind: SocketAddr, shutdown: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(bind)
            .await
            .map_err(|source| ServiceError::BindError { addr: bind, source })?;
        let local_addr = listener.local_addr()?;
        self.clear_stale_spool();

        info!(
            addr = %local_addr,
            data_dir = %self.config.storage.data_dir.display(),
            record_store = %self.config.storage.record_store,
            "TileStash listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("HTTP server stopped");
        self.shutdown(DEFAULT_SHUTDOWN_GRACE).await;
        Ok(())
    }

    /// Removes uploads and extraction directories left by a previous
    /// server process.
    ///
    /// Must only run in the server; CLI imports share the spool directories.
    pub fn clear_stale_spool(&self) {
        for dir in [
            self.config.storage.uploads_dir(),
            self.config.storage.staging_dir(),
        ] {
            let removed = clear_spool(&dir);
            if removed > 0 {
                info!(dir = %dir.display(), removed, "Removed stale spool entries");
            }
        }
    }

    /// Stops the import pipeline. Returns false if imports were still
    /// running when `grace` elapsed.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let drained = self.orchestrator.shutdown(grace).await;
        if !drained {
            warn!(
                grace_secs = grace.as_secs(),
                "Imports still running after shutdown grace period"
            );
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordStoreKind;
    use tempfile::TempDir;

    fn config(dir: &std::path::Path) -> ConfigFile {
        let mut config = ConfigFile::default();
        config.storage.data_dir = dir.to_path_buf();
        config.storage.record_store = RecordStoreKind::Memory;
        config
    }

    #[test]
    fn test_from_config_leaves_uploads_alone() {
        let temp = TempDir::new().unwrap();
        let uploads = temp.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        std::fs::write(uploads.join("upload-stale"), b"old").unwrap();

        let service = TileStashService::from_config(&config(temp.path())).unwrap();
        assert!(uploads.join("upload-stale").exists());
        assert_eq!(
            service.orchestrator().catalog().root(),
            temp.path().join("tilesets")
        );

        service.clear_stale_spool();
        assert!(!uploads.join("upload-stale").exists());
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown_signal() {
        let temp = TempDir::new().unwrap();
        let service = TileStashService::from_config(&config(temp.path())).unwrap();

        let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
        service.serve(bind, async {}).await.unwrap();
        assert!(service.orchestrator().scheduler().is_shutting_down());
    }
}
