//! Format sniffing for uploaded files.
//!
//! A sniffer looks at the first bytes (and, as a tiebreaker, the name) of an
//! uploaded file and classifies it into a [`Protocol`] - which converter
//! pipeline applies - and a [`FileKind`] - whether the file is a container
//! that must be normalized first.
//!
//! Recognised but unsupported formats are not errors: they classify as
//! [`Protocol::Other`] and the import orchestrator rejects them. Only files
//! that cannot be read or recognised at all fail with
//! [`SniffError::UnreadableFile`].

mod detect;

pub use detect::detect;

use crate::BoxFuture;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Number of leading bytes inspected by [`MagicSniffer`].
pub const DEFAULT_HEAD_LEN: usize = 1024;

/// Conversion pipeline a file belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Generic geodata handled by an external tiling converter
    Geodata,
    /// An existing MBTiles archive, imported by tile passthrough
    MbTiles,
    /// Recognised format without an import pipeline (e.g. `serialtiles`)
    Other(String),
}

impl Protocol {
    /// Scheme prefix used in source locators (`<scheme>://<path>`).
    pub fn scheme(&self) -> &str {
        match self {
            Self::Geodata => "omnivore",
            Self::MbTiles => "mbtiles",
            Self::Other(name) => name,
        }
    }

    /// Parses a locator scheme back into a protocol.
    pub fn from_scheme(scheme: &str) -> Self {
        match scheme {
            "omnivore" => Self::Geodata,
            "mbtiles" => Self::MbTiles,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scheme())
    }
}

/// Concrete file format detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Zip archive (zipped shapefile); needs extraction
    Zip,
    /// GeoJSON document
    GeoJson,
    /// Delimited text with coordinate columns
    Csv,
    /// Keyhole Markup Language
    Kml,
    /// GPS Exchange Format
    Gpx,
    /// GeoTIFF raster
    Tiff,
    /// GDAL virtual raster
    Vrt,
    /// MBTiles (SQLite) archive
    MbTiles,
    /// Gzip stream (serialtiles dump)
    Gzip,
    /// Gzipped TileMill project bundle
    Tm2z,
    /// TileJSON document
    TileJson,
}

impl FileKind {
    /// Returns true for container formats that must be normalized.
    pub fn is_container(self) -> bool {
        matches!(self, Self::Zip)
    }

    /// Short lowercase name for logging and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::GeoJson => "geojson",
            Self::Csv => "csv",
            Self::Kml => "kml",
            Self::Gpx => "gpx",
            Self::Tiff => "tif",
            Self::Vrt => "vrt",
            Self::MbTiles => "mbtiles",
            Self::Gzip => "serialtiles",
            Self::Tm2z => "tm2z",
            Self::TileJson => "tilejson",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Conversion pipeline
    pub protocol: Protocol,
    /// Detected format
    pub kind: FileKind,
}

impl FileInfo {
    /// Creates a classification.
    pub fn new(protocol: Protocol, kind: FileKind) -> Self {
        Self { protocol, kind }
    }
}

/// Sniffing errors.
#[derive(Debug, Error)]
pub enum SniffError {
    /// The file could not be opened or its format was not recognised
    #[error("Unreadable file {path}: {reason}")]
    UnreadableFile { path: PathBuf, reason: String },
}

impl SniffError {
    /// Creates an [`SniffError::UnreadableFile`].
    pub fn unreadable(path: &Path, reason: impl Into<String>) -> Self {
        Self::UnreadableFile {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Classifies files into protocols and kinds.
pub trait FormatSniffer: Send + Sync {
    /// Classifies the file at `path`.
    fn classify<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<FileInfo, SniffError>>;
}

/// Sniffer based on magic bytes with a textual fallback.
#[derive(Debug, Clone)]
pub struct MagicSniffer {
    head_len: usize,
}

impl MagicSniffer {
    /// Creates a sniffer inspecting [`DEFAULT_HEAD_LEN`] bytes.
    pub fn new() -> Self {
        Self {
            head_len: DEFAULT_HEAD_LEN,
        }
    }

    /// Creates a sniffer inspecting `head_len` bytes.
    pub fn with_head_len(head_len: usize) -> Self {
        Self {
            head_len: head_len.max(16),
        }
    }

    fn read_head(path: &Path, head_len: usize) -> Result<Vec<u8>, SniffError> {
        let file = std::fs::File::open(path).map_err(|e| SniffError::unreadable(path, e.to_string()))?;
        let mut head = Vec::with_capacity(head_len);
        file.take(head_len as u64)
            .read_to_end(&mut head)
            .map_err(|e| SniffError::unreadable(path, e.to_string()))?;
        Ok(head)
    }
}

impl Default for MagicSniffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatSniffer for MagicSniffer {
    fn classify<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<FileInfo, SniffError>> {
        let owned = path.to_path_buf();
        let head_len = self.head_len;
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                let head = Self::read_head(&owned, head_len)?;
                detect(&head, &owned)
            })
            .await
            .map_err(|e| SniffError::unreadable(path, format!("sniffer task failed: {}", e)))?
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_protocol_scheme_round_trip() {
        for protocol in [
            Protocol::Geodata,
            Protocol::MbTiles,
            Protocol::Other("serialtiles".to_string()),
        ] {
            assert_eq!(Protocol::from_scheme(protocol.scheme()), protocol);
        }
    }

    #[test]
    fn test_only_zip_is_container() {
        assert!(FileKind::Zip.is_container());
        assert!(!FileKind::GeoJson.is_container());
        assert!(!FileKind::MbTiles.is_container());
    }

    #[tokio::test]
    async fn test_classify_file_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("points.geojson");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(br#"{"type":"FeatureCollection","features":[]}"#)
            .unwrap();

        let info = MagicSniffer::new().classify(&path).await.unwrap();
        assert_eq!(info, FileInfo::new(Protocol::Geodata, FileKind::GeoJson));
    }

    #[tokio::test]
    async fn test_classify_missing_file_is_unreadable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.zip");

        let err = MagicSniffer::new().classify(&path).await.unwrap_err();
        assert!(matches!(err, SniffError::UnreadableFile { .. }));
    }
}
