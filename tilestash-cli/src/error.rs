//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::path::PathBuf;
use std::process;
use tilestash::config::ConfigFileError;
use tilestash::import::ImportError;
use tilestash::service::ServiceError;
use tilestash::store::StoreError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to create service
    ServiceCreation(ServiceError),
    /// HTTP server error
    Serve(ServiceError),
    /// Input file missing or not a file
    InputFile(PathBuf),
    /// Upload was rejected before conversion started
    Import(ImportError),
    /// Conversion ran and failed
    ImportFailed { tileset: String, message: String },
    /// Record store error
    Store(StoreError),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        // Print additional help for specific errors
        match self {
            CliError::Serve(ServiceError::BindError { addr, .. }) => {
                eprintln!();
                eprintln!("Is another process already listening on {}?", addr);
                eprintln!("Use --bind or [server] bind in config.ini to pick another address.");
            }
            CliError::Import(ImportError::UnsupportedFormat(_)) => {
                eprintln!();
                eprintln!("Generic geodata needs an external tiler. Set [import] geodata_command");
                eprintln!("in config.ini, e.g.: geodata_command = tippecanoe -o {{dest}} {{source}}");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ServiceCreation(e) => write!(f, "Failed to create service: {}", e),
            CliError::Serve(e) => write!(f, "Server error: {}", e),
            CliError::InputFile(path) => {
                write!(f, "Input file '{}' does not exist or is not a file", path.display())
            }
            CliError::Import(e) => write!(f, "Import rejected: {}", e),
            CliError::ImportFailed { tileset, message } => {
                write!(f, "Import of {} failed: {}", tileset, message)
            }
            CliError::Store(e) => write!(f, "Record store error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ServiceCreation(e) => Some(e),
            CliError::Serve(e) => Some(e),
            CliError::Import(e) => Some(e),
            CliError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ImportError> for CliError {
    fn from(e: ImportError) -> Self {
        CliError::Import(e)
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Store(e)
    }
}
