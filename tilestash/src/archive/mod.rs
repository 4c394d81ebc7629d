//! Tile archive storage and the tile read path.
//!
//! Imported tilesets are stored as MBTiles files at
//! `<root>/<owner>/<tileset_id>`. [`MbTilesArchive`] reads them (metadata and
//! single tiles, with the XYZ-to-TMS row flip), [`MbTilesWriter`] creates
//! them, and [`ArchiveCatalog`] maps tileset keys to files.

mod catalog;
mod mbtiles;

pub use catalog::ArchiveCatalog;
pub use mbtiles::{MbTilesArchive, MbTilesWriter, Tile, TileRow};

use crate::coord::TileCoord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Archive errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// No archive file at the expected location
    #[error("Archive {0} not found")]
    NotFound(PathBuf),

    /// The archive exists but holds no tile at the coordinates
    #[error("Tile {coord} not found in {path}")]
    TileNotFound { path: PathBuf, coord: TileCoord },

    /// Owner or tileset id cannot be used as a path component
    #[error("Invalid archive name '{0}'")]
    InvalidName(String),

    /// SQLite failure
    #[error("Archive database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem failure
    #[error("Archive I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A blocking archive task panicked or was cancelled
    #[error("Archive task failed: {0}")]
    Task(String),
}

impl ArchiveError {
    /// Returns true for missing archives and missing tiles.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::TileNotFound { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Archive-level metadata from the MBTiles `metadata` table.
///
/// Well-known keys are typed; everything else (including the members of the
/// `json` entry, such as `vector_layers`) is kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<u8>,
    /// West, south, east, north
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Vec<f64>>,
    /// Longitude, latitude, zoom
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<Vec<f64>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ArchiveInfo {
    /// Builds the info from raw `(name, value)` metadata rows.
    ///
    /// Values that fail to parse as their typed field are kept as strings in
    /// `extra` rather than dropped.
    pub fn from_metadata<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut info = Self::default();
        for (name, value) in rows {
            match name.as_str() {
                "format" => info.format = Some(value),
                "name" => info.name = Some(value),
                "description" => info.description = Some(value),
                "minzoom" => match value.trim().parse() {
                    Ok(z) => info.minzoom = Some(z),
                    Err(_) => info.keep(name, value),
                },
                "maxzoom" => match value.trim().parse() {
                    Ok(z) => info.maxzoom = Some(z),
                    Err(_) => info.keep(name, value),
                },
                "bounds" => match parse_number_list(&value, 4) {
                    Some(list) => info.bounds = Some(list),
                    None => info.keep(name, value),
                },
                "center" => match parse_number_list(&value, 3) {
                    Some(list) => info.center = Some(list),
                    None => info.keep(name, value),
                },
                "json" => match serde_json::from_str::<serde_json::Value>(&value) {
                    Ok(serde_json::Value::Object(members)) => info.extra.extend(members),
                    _ => info.keep(name, value),
                },
                _ => info.keep(name, value),
            }
        }
        info
    }

    fn keep(&mut self, name: String, value: String) {
        self.extra.insert(name, serde_json::Value::String(value));
    }
}

fn parse_number_list(value: &str, len: usize) -> Option<Vec<f64>> {
    let list = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    (list.len() == len).then_some(list)
}

/// MIME type for a tile format name.
pub fn content_type_for(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "pbf" | "mvt" => "application/x-protobuf",
        "json" | "geojson" => "application/json",
        _ => "application/octet-stream",
    }
}
