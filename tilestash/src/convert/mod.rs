//! Tile converters.
//!
//! A [`TileConverter`] reads a normalized source and writes an MBTiles
//! archive, reporting progress as it goes. Converters are registered per
//! [`Protocol`](crate::sniff::Protocol) in a [`ConverterRegistry`] that is
//! assembled at startup; a protocol without a converter is unsupported.
//!
//! # Implementations
//!
//! - [`MbTilesConverter`] - copies an uploaded MBTiles archive tile by tile
//! - [`CommandConverter`] - runs an external tiling program

mod command;
mod mbtiles;
mod registry;

pub use command::CommandConverter;
pub use mbtiles::MbTilesConverter;
pub use registry::ConverterRegistry;

use crate::archive::ArchiveError;
use crate::import::ProgressSink;
use crate::normalize::SourceLocator;
use crate::BoxFuture;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Descriptive information a converter reports about its source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceInfo {
    /// Suggested tileset name
    pub name: Option<String>,
    /// Suggested tileset description
    pub description: Option<String>,
    /// Tile format the archive will contain (`png`, `pbf`, ...)
    pub format: Option<String>,
}

/// Tiles written by a copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub tiles: u64,
}

/// Conversion failure.
///
/// Retryable errors (busy databases, transient I/O) are retried by the
/// orchestrator; permanent ones end the attempt immediately.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConvertError {
    pub message: String,
    pub is_retryable: bool,
}

impl ConvertError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_retryable: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_retryable: false,
        }
    }

    pub fn cancelled() -> Self {
        Self::permanent("cancelled")
    }
}

impl From<ArchiveError> for ConvertError {
    fn from(e: ArchiveError) -> Self {
        let retryable = match &e {
            ArchiveError::Database(rusqlite::Error::SqliteFailure(failure, _)) => matches!(
                failure.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            ArchiveError::Io { .. } | ArchiveError::Task(_) => true,
            _ => false,
        };
        Self {
            message: e.to_string(),
            is_retryable: retryable,
        }
    }
}

/// Converts normalized sources into MBTiles archives.
pub trait TileConverter: Send + Sync {
    /// Converter name for logging.
    fn name(&self) -> &str;

    /// Describes the source without converting it.
    fn info<'a>(&'a self, source: &'a SourceLocator)
        -> BoxFuture<'a, Result<SourceInfo, ConvertError>>;

    /// Writes the source's tiles into a new archive at `dest`.
    ///
    /// `progress` receives `(done, total)` events at any rate. The copy
    /// should stop early with [`ConvertError::cancelled`] once `cancel` fires.
    fn copy<'a>(
        &'a self,
        source: &'a SourceLocator,
        dest: &'a Path,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<CopyStats, ConvertError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_archive_error_classification() {
        let missing: ConvertError = ArchiveError::NotFound(PathBuf::from("/x")).into();
        assert!(!missing.is_retryable);

        let io: ConvertError = ArchiveError::io(
            "/x",
            std::io::Error::new(std::io::ErrorKind::Interrupted, "interrupted"),
        )
        .into();
        assert!(io.is_retryable);

        let busy: ConvertError = ArchiveError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ))
        .into();
        assert!(busy.is_retryable);
    }

    #[test]
    fn test_cancelled_is_permanent() {
        let err = ConvertError::cancelled();
        assert!(!err.is_retryable);
        assert_eq!(err.to_string(), "cancelled");
    }
}
