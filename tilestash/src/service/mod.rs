//! High-level service facade for TileStash.
//!
//! Wires the record store, archive catalog, converters, import orchestrator
//! and HTTP router from a loaded [`ConfigFile`](crate::config::ConfigFile).
//!
//! # Example
//!
//! ```ignore
//! use tilestash::config::ConfigFile;
//! use tilestash::service::TileStashService;
//!
//! let config = ConfigFile::load()?;
//! let service = TileStashService::from_config(&config)?;
//! let router = service.router();
//! ```

mod builder;
mod error;
mod facade;

pub use builder::{create_converters, create_orchestrator, create_store};
pub use error::ServiceError;
pub use facade::{TileStashService, DEFAULT_SHUTDOWN_GRACE};
