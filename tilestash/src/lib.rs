//! TileStash - upload, import and serve map tilesets
//!
//! This library provides the core of the TileStash service: an HTTP API that
//! accepts geodata uploads, imports them into MBTiles archives in the
//! background, and serves the resulting tiles by `z/x/y`.
//!
//! # High-Level API
//!
//! For most use cases, the [`service`] module wires every component from a
//! loaded configuration:
//!
//! ```ignore
//! use tilestash::config::ConfigFile;
//! use tilestash::service::TileStashService;
//!
//! let config = ConfigFile::load()?;
//! let service = TileStashService::from_config(&config)?;
//! service.serve(config.server.bind, shutdown_signal()).await?;
//! ```
//!
//! # Import pipeline
//!
//! ```text
//! upload ─► sniff ─► normalize ─► converter.info ─► record (response sent)
//!                                                        │
//!                               ImportScheduler ◄────────┘
//!                                      │
//!                   lock ─► converter.copy ─► rename ─► terminal write
//!                                      │
//!                              ProgressReporter ─► record store
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod archive;
pub mod config;
pub mod convert;
pub mod coord;
pub mod http;
pub mod import;
pub mod logging;
pub mod normalize;
pub mod service;
pub mod sniff;
pub mod store;
pub mod tileset;

/// Version of the TileStash library and CLI.
///
/// This is synchronized across all components in the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Boxed future returned by the object-safe async traits in this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
