//! Default values and constants for all configuration settings.
//!
//! Contains all `DEFAULT_*` constants and the `ConfigFile::default()`
//! implementation.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use super::file::config_directory;
use super::settings::*;

// =============================================================================
// Server defaults
// =============================================================================

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default maximum upload size (512MB).
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 512 * 1024 * 1024;

/// Default listen address: loopback only.
pub fn default_bind() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT))
}

// =============================================================================
// Import defaults
// =============================================================================

/// Default retries after a failed copy.
pub const DEFAULT_IMPORT_RETRIES: u32 = 2;

/// Default conversion timeout in seconds.
pub const DEFAULT_IMPORT_TIMEOUT_SECS: u64 = 120;

/// Default minimum interval between progress writes in milliseconds.
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;

/// Default tile format of the external geodata tiler.
pub const DEFAULT_GEODATA_FORMAT: &str = "pbf";

// =============================================================================
// Paths
// =============================================================================

/// Default data directory (~/.tilestash/data).
pub fn default_data_dir() -> PathBuf {
    config_directory().join("data")
}

/// Default log file (~/.tilestash/logs/tilestash.log).
pub fn default_log_file() -> PathBuf {
    config_directory().join("logs").join("tilestash.log")
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind: default_bind(),
                max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            },
            storage: StorageSettings {
                data_dir: default_data_dir(),
                record_store: RecordStoreKind::Sqlite,
            },
            import: ImportSettings {
                retries: DEFAULT_IMPORT_RETRIES,
                timeout_secs: DEFAULT_IMPORT_TIMEOUT_SECS,
                progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
                geodata_command: None,
                geodata_format: DEFAULT_GEODATA_FORMAT.to_string(),
            },
            logging: LoggingSettings {
                file: default_log_file(),
            },
        }
    }
}
