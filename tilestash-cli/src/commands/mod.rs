//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`serve`] - Run the HTTP API
//! - [`import`] - Import one file in the foreground
//! - [`list`] - List an owner's tilesets
//! - [`config`] - Configuration management (path, init, show)

pub mod config;
pub mod import;
pub mod list;
pub mod serve;
