//! Mapping from tileset keys to archive files.

use super::{ArchiveError, ArchiveInfo, MbTilesArchive, Tile};
use crate::coord::TileCoord;
use crate::tileset::{is_valid_identifier, TilesetKey};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PARTIAL_SUFFIX: &str = "partial";

/// Locates and reads the archives of all tilesets under one root directory.
///
/// Layout: `<root>/<owner>/<tileset_id>`. An import writes
/// `<root>/<owner>/<tileset_id>.partial` and publishes it with a rename, so
/// readers only ever see complete archives.
#[derive(Debug, Clone)]
pub struct ArchiveCatalog {
    root: PathBuf,
}

impl ArchiveCatalog {
    /// Creates a catalog rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of all archives.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final archive location for `key`.
    pub fn archive_path(&self, key: &TilesetKey) -> Result<PathBuf, ArchiveError> {
        for part in [&key.owner, &key.tileset_id] {
            if !is_valid_identifier(part) {
                return Err(ArchiveError::InvalidName(part.clone()));
            }
        }
        Ok(self.root.join(&key.owner).join(&key.tileset_id))
    }

    /// Location an import writes to before publishing.
    pub fn partial_path(&self, key: &TilesetKey) -> Result<PathBuf, ArchiveError> {
        let mut path = self.archive_path(key)?;
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".");
        name.push(PARTIAL_SUFFIX);
        path.set_file_name(name);
        Ok(path)
    }

    /// Creates the owner directory of `key` and returns the partial path.
    pub async fn prepare(&self, key: &TilesetKey) -> Result<PathBuf, ArchiveError> {
        let partial = self.partial_path(key)?;
        if let Some(parent) = partial.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ArchiveError::io(parent, e))?;
        }
        remove_if_exists(&partial).await?;
        Ok(partial)
    }

    /// Atomically replaces the archive of `key` with its partial file.
    pub async fn publish(&self, key: &TilesetKey) -> Result<PathBuf, ArchiveError> {
        let partial = self.partial_path(key)?;
        let dest = self.archive_path(key)?;
        tokio::fs::rename(&partial, &dest)
            .await
            .map_err(|e| ArchiveError::io(&partial, e))?;
        info!(tileset = %key, path = %dest.display(), "Archive published");
        Ok(dest)
    }

    /// Removes the partial file of `key`, if any.
    pub async fn discard_partial(&self, key: &TilesetKey) -> Result<(), ArchiveError> {
        let partial = self.partial_path(key)?;
        if remove_if_exists(&partial).await? {
            debug!(tileset = %key, "Discarded partial archive");
        }
        Ok(())
    }

    /// Returns true if a published archive exists for `key`.
    pub async fn exists(&self, key: &TilesetKey) -> bool {
        match self.archive_path(key) {
            Ok(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Reads the archive metadata of `key`.
    pub async fn info(&self, key: &TilesetKey) -> Result<ArchiveInfo, ArchiveError> {
        let path = self.archive_path(key)?;
        blocking(move || MbTilesArchive::open(&path)?.info()).await
    }

    /// Reads one tile of `key`.
    pub async fn get_tile(&self, key: &TilesetKey, coord: TileCoord) -> Result<Tile, ArchiveError> {
        let path = self.archive_path(key)?;
        blocking(move || MbTilesArchive::open(&path)?.get_tile(coord)).await
    }

    /// Deletes the archive of `key`. Returns false if there was none.
    pub async fn remove(&self, key: &TilesetKey) -> Result<bool, ArchiveError> {
        let path = self.archive_path(key)?;
        let removed = remove_if_exists(&path).await?;
        if removed {
            info!(tileset = %key, "Archive removed");
        }
        Ok(removed)
    }
}

async fn remove_if_exists(path: &Path) -> Result<bool, ArchiveError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ArchiveError::io(path, e)),
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ArchiveError>
where
    F: FnOnce() -> Result<T, ArchiveError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))?
}
