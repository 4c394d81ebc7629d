//! Magic-byte and text-head detection rules.

use super::{FileInfo, FileKind, Protocol, SniffError};
use std::path::Path;

const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";
const ZIP_MAGIC: &[u8] = &[0x50, 0x4b, 0x03, 0x04];
const ZIP_EMPTY_MAGIC: &[u8] = &[0x50, 0x4b, 0x05, 0x06];
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const TIFF_LE_MAGIC: &[u8] = b"II*\0";
const TIFF_BE_MAGIC: &[u8] = b"MM\0*";
const BIGTIFF_LE_MAGIC: &[u8] = b"II+\0";
const UTF8_BOM: &[u8] = &[0xef, 0xbb, 0xbf];

/// Classifies a file from its leading bytes and path.
///
/// Binary signatures win; text formats are recognised from the start of the
/// document, with the extension deciding only for CSV.
pub fn detect(head: &[u8], path: &Path) -> Result<FileInfo, SniffError> {
    if head.is_empty() {
        return Err(SniffError::unreadable(path, "file is empty"));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if head.starts_with(SQLITE_MAGIC) {
        return Ok(FileInfo::new(Protocol::MbTiles, FileKind::MbTiles));
    }
    if head.starts_with(ZIP_MAGIC) || head.starts_with(ZIP_EMPTY_MAGIC) {
        return Ok(FileInfo::new(Protocol::Geodata, FileKind::Zip));
    }
    if head.starts_with(GZIP_MAGIC) {
        if extension == "tm2z" {
            return Ok(FileInfo::new(
                Protocol::Other("tm2z".to_string()),
                FileKind::Tm2z,
            ));
        }
        return Ok(FileInfo::new(
            Protocol::Other("serialtiles".to_string()),
            FileKind::Gzip,
        ));
    }
    if head.starts_with(TIFF_LE_MAGIC)
        || head.starts_with(TIFF_BE_MAGIC)
        || head.starts_with(BIGTIFF_LE_MAGIC)
    {
        return Ok(FileInfo::new(Protocol::Geodata, FileKind::Tiff));
    }

    let text = head.strip_prefix(UTF8_BOM).unwrap_or(head);
    let text = String::from_utf8_lossy(text);
    let trimmed = text.trim_start();

    if trimmed.starts_with('<') {
        let lower = trimmed.to_ascii_lowercase();
        if lower.contains("<kml") {
            return Ok(FileInfo::new(Protocol::Geodata, FileKind::Kml));
        }
        if lower.contains("<gpx") {
            return Ok(FileInfo::new(Protocol::Geodata, FileKind::Gpx));
        }
        if lower.contains("<vrtdataset") {
            return Ok(FileInfo::new(Protocol::Geodata, FileKind::Vrt));
        }
        return Err(SniffError::unreadable(path, "unknown XML document"));
    }

    if trimmed.starts_with('{') {
        if trimmed.contains("\"tilejson\"") {
            return Ok(FileInfo::new(
                Protocol::Other("tilejson".to_string()),
                FileKind::TileJson,
            ));
        }
        if trimmed.contains("\"type\"") {
            return Ok(FileInfo::new(Protocol::Geodata, FileKind::GeoJson));
        }
        return Err(SniffError::unreadable(path, "JSON document is not GeoJSON"));
    }

    if looks_like_csv(trimmed, &extension) {
        return Ok(FileInfo::new(Protocol::Geodata, FileKind::Csv));
    }

    Err(SniffError::unreadable(path, "unknown filetype"))
}

/// CSV has no signature: accept it by extension, or by a header row naming
/// coordinate columns.
fn looks_like_csv(text: &str, extension: &str) -> bool {
    let Some(header) = text.lines().next() else {
        return false;
    };
    if !header.contains(',') {
        return false;
    }
    if extension == "csv" {
        return true;
    }

    let columns: Vec<String> = header
        .split(',')
        .map(|c| c.trim().trim_matches('"').to_ascii_lowercase())
        .collect();
    let has = |names: &[&str]| columns.iter().any(|c| names.contains(&c.as_str()));
    has(&["lat", "latitude", "y"]) && has(&["lon", "lng", "long", "longitude", "x"])
}
