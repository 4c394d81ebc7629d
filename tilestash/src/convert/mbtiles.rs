//! MBTiles passthrough converter.

use super::{ConvertError, CopyStats, SourceInfo, TileConverter};
use crate::archive::{ArchiveError, MbTilesArchive, MbTilesWriter, TileRow};
use crate::import::ProgressSink;
use crate::normalize::SourceLocator;
use crate::BoxFuture;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default number of tiles written per transaction.
pub const DEFAULT_BATCH_SIZE: usize = 512;

/// Copies an uploaded MBTiles archive into a fresh archive.
///
/// The copy re-validates every row instead of moving the upload into place,
/// so a corrupt upload fails the import instead of the tile read path.
#[derive(Debug, Clone)]
pub struct MbTilesConverter {
    batch_size: usize,
}

impl MbTilesConverter {
    pub fn new() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets the number of tiles per write transaction (and per progress event).
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }
}

impl Default for MbTilesConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl TileConverter for MbTilesConverter {
    fn name(&self) -> &str {
        "mbtiles"
    }

    fn info<'a>(
        &'a self,
        source: &'a SourceLocator,
    ) -> BoxFuture<'a, Result<SourceInfo, ConvertError>> {
        let path = source.path().to_path_buf();
        Box::pin(async move {
            let info = tokio::task::spawn_blocking(move || MbTilesArchive::open(&path)?.info())
                .await
                .map_err(|e| ConvertError::permanent(format!("info task failed: {}", e)))??;
            Ok(SourceInfo {
                name: info.name,
                description: info.description,
                format: info.format,
            })
        })
    }

    fn copy<'a>(
        &'a self,
        source: &'a SourceLocator,
        dest: &'a Path,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<CopyStats, ConvertError>> {
        let source = source.path().to_path_buf();
        let dest = dest.to_path_buf();
        let batch_size = self.batch_size;
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                copy_archive(&source, &dest, batch_size, &progress, &cancel)
            })
            .await
            .map_err(|e| ConvertError::retryable(format!("copy task failed: {}", e)))?
        })
    }
}

fn stop_if_cancelled(cancel: &CancellationToken) -> Result<(), ConvertError> {
    if cancel.is_cancelled() {
        return Err(ConvertError::cancelled());
    }
    Ok(())
}

fn copy_archive(
    source: &Path,
    dest: &Path,
    batch_size: usize,
    progress: &ProgressSink,
    cancel: &CancellationToken,
) -> Result<CopyStats, ConvertError> {
    let reader = MbTilesArchive::open(source)?;
    let total = reader.tile_count()?;
    stop_if_cancelled(cancel)?;
    let mut writer = MbTilesWriter::create(dest)?;

    for (name, value) in reader.metadata()? {
        writer.put_metadata(&name, &value)?;
    }
    progress.report(0, total);

    let mut batch: Vec<TileRow> = Vec::with_capacity(batch_size);
    let mut done = 0u64;
    let mut failure: Option<ConvertError> = None;

    reader.scan_tiles(|row| {
        batch.push(row);
        if batch.len() >= batch_size {
            if cancel.is_cancelled() {
                failure = Some(ConvertError::cancelled());
                return Err(ArchiveError::Task("cancelled".to_string()));
            }
            writer.put_tiles(&batch)?;
            done += batch.len() as u64;
            batch.clear();
            progress.report(done, total);
        }
        Ok(())
    })
    .map_err(|e| failure.take().unwrap_or_else(|| ConvertError::from(e)))?;

    if !batch.is_empty() {
        stop_if_cancelled(cancel)?;
        writer.put_tiles(&batch)?;
        done += batch.len() as u64;
        progress.report(done, total);
    }
    stop_if_cancelled(cancel)?;
    writer.finish()?;

    debug!(
        source = %source.display(),
        dest = %dest.display(),
        tiles = done,
        "MBTiles copy complete"
    );
    Ok(CopyStats { tiles: done })
}
