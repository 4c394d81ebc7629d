//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use crate::import::ImportConfig;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// HTTP server settings
    pub server: ServerSettings,
    /// Archive and record storage
    pub storage: StorageSettings,
    /// Import pipeline settings
    pub import: ImportSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Listen address
    pub bind: SocketAddr,
    /// Largest accepted request body in bytes
    pub max_upload_size: usize,
}

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Root of everything the service writes
    pub data_dir: PathBuf,
    /// Record store backend
    pub record_store: RecordStoreKind,
}

impl StorageSettings {
    /// Directory holding `<owner>/<tilesetId>` archives.
    pub fn tilesets_dir(&self) -> PathBuf {
        self.data_dir.join("tilesets")
    }

    /// SQLite database of tileset records.
    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join("records.db")
    }

    /// Spool directory for multipart uploads.
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// Parent of the per-import extraction directories.
    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("staging")
    }
}

/// Which [`RecordStore`](crate::store::RecordStore) backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordStoreKind {
    /// `records.db` under the data directory
    #[default]
    Sqlite,
    /// Process memory; records are lost on restart
    Memory,
}

impl RecordStoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for RecordStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown record store '{}'", other)),
        }
    }
}

/// Import pipeline configuration.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    /// Retries after a failed copy (retryable errors only).
    /// Default: 2
    pub retries: u32,
    /// Upper bound for one conversion in seconds, retries included.
    /// Default: 120
    pub timeout_secs: u64,
    /// Minimum interval between progress writes in milliseconds.
    /// Default: 500
    pub progress_interval_ms: u64,
    /// External tiler for generic geodata, e.g. `tippecanoe -o {dest} {source}`.
    /// None leaves generic geodata unsupported.
    pub geodata_command: Option<String>,
    /// Tile format the external tiler produces.
    pub geodata_format: String,
}

impl ImportSettings {
    /// Runtime configuration of the orchestrator.
    pub fn to_import_config(&self) -> ImportConfig {
        ImportConfig {
            retries: self.retries,
            timeout: Duration::from_secs(self.timeout_secs),
            progress_interval: Duration::from_millis(self.progress_interval_ms),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    /// Log file path
    pub file: PathBuf,
}
