//! MBTiles reading and writing.
//!
//! MBTiles stores rows in the TMS scheme (row 0 at the south edge); the
//! public API speaks XYZ and flips rows at the boundary.

use super::{content_type_for, ArchiveError, ArchiveInfo};
use crate::coord::TileCoord;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS metadata (name TEXT, value TEXT);
CREATE UNIQUE INDEX IF NOT EXISTS metadata_name ON metadata (name);
CREATE TABLE IF NOT EXISTS tiles (
    zoom_level  INTEGER,
    tile_column INTEGER,
    tile_row    INTEGER,
    tile_data   BLOB
);
CREATE UNIQUE INDEX IF NOT EXISTS tile_index ON tiles (zoom_level, tile_column, tile_row);
";

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

/// One tile as served over HTTP.
#[derive(Debug, Clone)]
pub struct Tile {
    /// Raw tile bytes
    pub data: Bytes,
    /// Response headers (`Content-Type`, `Content-Encoding`, `Last-Modified`, `ETag`)
    pub headers: Vec<(&'static str, String)>,
}

impl Tile {
    /// Looks up a header by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// One row of the `tiles` table, in TMS addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRow {
    pub zoom_level: u32,
    pub tile_column: u32,
    pub tile_row: u32,
    pub data: Vec<u8>,
}

impl TileRow {
    /// Builds a row from XYZ coordinates. `None` if the tile is off the grid.
    pub fn from_xyz(coord: TileCoord, data: Vec<u8>) -> Option<Self> {
        Some(Self {
            zoom_level: u32::from(coord.zoom),
            tile_column: coord.x,
            tile_row: coord.tms_row()?,
            data,
        })
    }
}

/// Read-only handle on an MBTiles file.
pub struct MbTilesArchive {
    path: PathBuf,
    conn: Connection,
    modified: Option<SystemTime>,
}

impl MbTilesArchive {
    /// Opens the archive at `path` read-only.
    ///
    /// A missing file is [`ArchiveError::NotFound`]; SQLite is never asked to
    /// create it.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArchiveError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(ArchiveError::io(path, e)),
        };

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            path: path.to_path_buf(),
            conn,
            modified: metadata.modified().ok(),
        })
    }

    /// Path of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw `(name, value)` pairs from the metadata table.
    pub fn metadata(&self) -> Result<Vec<(String, String)>, ArchiveError> {
        let mut stmt = self.conn.prepare("SELECT name, value FROM metadata")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Parsed archive metadata.
    pub fn info(&self) -> Result<ArchiveInfo, ArchiveError> {
        Ok(ArchiveInfo::from_metadata(self.metadata()?))
    }

    /// Number of tiles in the archive.
    pub fn tile_count(&self) -> Result<u64, ArchiveError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Visits every tile row in storage order.
    ///
    /// Stops at the first error returned by `visit`.
    pub fn scan_tiles<F>(&self, mut visit: F) -> Result<u64, ArchiveError>
    where
        F: FnMut(TileRow) -> Result<(), ArchiveError>,
    {
        let mut stmt = self
            .conn
            .prepare("SELECT zoom_level, tile_column, tile_row, tile_data FROM tiles")?;
        let mut rows = stmt.query([])?;
        let mut visited = 0u64;
        while let Some(row) = rows.next()? {
            visit(TileRow {
                zoom_level: row.get(0)?,
                tile_column: row.get(1)?,
                tile_row: row.get(2)?,
                data: row.get(3)?,
            })?;
            visited += 1;
        }
        Ok(visited)
    }

    /// Reads one tile addressed in XYZ.
    pub fn get_tile(&self, coord: TileCoord) -> Result<Tile, ArchiveError> {
        let not_found = || ArchiveError::TileNotFound {
            path: self.path.clone(),
            coord,
        };
        let tms_row = coord.tms_row().ok_or_else(not_found)?;

        let data: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT tile_data FROM tiles
                 WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
                params![coord.zoom, coord.x, tms_row],
                |row| row.get(0),
            )
            .optional()?;
        let data = data.ok_or_else(not_found)?;

        let format: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE name = 'format'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let headers = tile_headers(&data, format.as_deref(), self.modified);
        Ok(Tile {
            data: Bytes::from(data),
            headers,
        })
    }
}

fn tile_headers(
    data: &[u8],
    format: Option<&str>,
    modified: Option<SystemTime>,
) -> Vec<(&'static str, String)> {
    let format = format.map(str::to_string).unwrap_or_else(|| sniff_format(data));
    let mut headers = vec![("Content-Type", content_type_for(&format).to_string())];

    if data.starts_with(GZIP_MAGIC) {
        headers.push(("Content-Encoding", "gzip".to_string()));
    }
    if let Some(modified) = modified {
        let modified: DateTime<Utc> = modified.into();
        headers.push((
            "Last-Modified",
            modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        ));
    }

    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    headers.push(("ETag", format!("\"{:016x}\"", hasher.finish())));
    headers
}

/// Guesses the format of a tile without a `format` metadata entry.
fn sniff_format(data: &[u8]) -> String {
    let format = if data.starts_with(b"\x89PNG") {
        "png"
    } else if data.starts_with(&[0xff, 0xd8, 0xff]) {
        "jpg"
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "webp"
    } else {
        "pbf"
    };
    format.to_string()
}

/// Writes a new MBTiles file.
pub struct MbTilesWriter {
    path: PathBuf,
    conn: Connection,
}

impl MbTilesWriter {
    /// Creates the archive at `path`, replacing any file already there.
    pub fn create(path: &Path) -> Result<Self, ArchiveError> {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ArchiveError::io(path, e)),
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    /// Path being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sets one metadata entry.
    pub fn put_metadata(&self, name: &str, value: &str) -> Result<(), ArchiveError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (name, value) VALUES (?1, ?2)",
            params![name, value],
        )?;
        Ok(())
    }

    /// Writes a batch of tiles in one transaction.
    pub fn put_tiles(&mut self, tiles: &[TileRow]) -> Result<(), ArchiveError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO tiles (zoom_level, tile_column, tile_row, tile_data)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for tile in tiles {
                stmt.execute(params![
                    tile.zoom_level,
                    tile.tile_column,
                    tile.tile_row,
                    tile.data
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Flushes and closes the database.
    pub fn finish(self) -> Result<(), ArchiveError> {
        self.conn.close().map_err(|(_, e)| ArchiveError::Database(e))
    }
}
