//! Setup shared by the commands that touch the data directory.

use crate::error::CliError;
use tilestash::config::ConfigFile;
use tilestash::logging::{init_logging, LogOptions, LoggingGuard};
use tilestash::service::TileStashService;
use tracing::info;

/// Loaded config plus an installed logger; logging stops when dropped.
pub struct CliRunner {
    logging_guard: LoggingGuard,
    config: ConfigFile,
}

impl CliRunner {
    /// Load config and initialize logging to the configured file.
    ///
    /// # Arguments
    ///
    /// * `debug_mode` - Default to debug-level logging when RUST_LOG is unset
    /// * `stdout` - Mirror logs to stdout; off for commands that print their
    ///   own output
    pub fn new(debug_mode: bool, stdout: bool) -> Result<Self, CliError> {
        let config = ConfigFile::load()?;

        let options = LogOptions::new(&config.logging.file)
            .with_debug(debug_mode)
            .with_stdout(stdout);
        let logging_guard =
            init_logging(&options).map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            logging_guard,
            config,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Mutable configuration, for command-line overrides.
    pub fn config_mut(&mut self) -> &mut ConfigFile {
        &mut self.config
    }

    pub fn log_startup(&self, command: &str) {
        info!("TileStash v{}", tilestash::VERSION);
        info!(
            log_file = %self.logging_guard.path().display(),
            "TileStash CLI: {} command",
            command
        );
    }

    /// Opens the record store and wires the import pipeline.
    pub fn create_service(&self) -> Result<TileStashService, CliError> {
        TileStashService::from_config(&self.config)
            .map_err(CliError::ServiceCreation)
            .inspect(|_| info!("Service created successfully"))
    }
}
