//! Service configuration.
//!
//! Settings are read from `~/.tilestash/config.ini` (or the file named by
//! `TILESTASH_CONFIG`). Missing files and keys fall back to the defaults in
//! [`defaults`]; present keys are validated and rejected with
//! [`ConfigFileError::InvalidValue`].
//!
//! # Example
//!
//! ```
//! use tilestash::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! assert_eq!(config.server.bind.port(), 3000);
//! assert_eq!(config.import.retries, 2);
//! ```

pub mod defaults;
mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use file::{config_directory, config_file_path, ConfigFileError, CONFIG_ENV_VAR};
pub use settings::{
    ConfigFile, ImportSettings, LoggingSettings, RecordStoreKind, ServerSettings, StorageSettings,
};
pub use size::{format_size, parse_size, SizeParseError};
