//! Normalization of uploaded files into converter-ready sources.
//!
//! Most uploads can be handed to a converter as they are; the locator simply
//! points at the uploaded file. Container formats (zipped shapefiles) are
//! extracted into a private staging directory first. The staging directory
//! belongs to the returned [`Source`] and disappears when it is dropped, so
//! every exit path of an import cleans up after itself.

mod extract;
mod locator;

pub use locator::SourceLocator;

use crate::sniff::{FileInfo, FileKind, Protocol};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

/// Normalization errors.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The container could not be extracted or held no usable data
    #[error("Failed to extract {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    /// The staging area could not be prepared
    #[error("Failed to prepare staging directory {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl NormalizeError {
    pub(crate) fn extraction(path: &Path, reason: impl Into<String>) -> Self {
        Self::Extraction {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// A converter-ready source.
///
/// Holds the staging directory (if any) alive until dropped.
#[derive(Debug)]
pub struct Source {
    locator: SourceLocator,
    staging: Option<TempDir>,
}

impl Source {
    /// Source pointing straight at a file, with no staging.
    pub fn passthrough(locator: SourceLocator) -> Self {
        Self {
            locator,
            staging: None,
        }
    }

    /// Source inside a staging directory that is removed on drop.
    pub fn staged(locator: SourceLocator, staging: TempDir) -> Self {
        Self {
            locator,
            staging: Some(staging),
        }
    }

    /// Locator handed to converters.
    pub fn locator(&self) -> &SourceLocator {
        &self.locator
    }

    /// Staging directory, if the source was extracted.
    pub fn staging_dir(&self) -> Option<&Path> {
        self.staging.as_ref().map(TempDir::path)
    }
}

/// Turns uploaded files into [`Source`]s.
#[derive(Debug, Clone)]
pub struct Normalizer {
    staging_root: PathBuf,
}

impl Normalizer {
    /// Creates a normalizer that stages extracted files under `staging_root`.
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
        }
    }

    /// Directory under which staging directories are created.
    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// Normalizes the upload at `path` according to its classification.
    pub async fn normalize(&self, path: &Path, info: &FileInfo) -> Result<Source, NormalizeError> {
        let absolute = std::path::absolute(path)
            .map_err(|e| NormalizeError::extraction(path, e.to_string()))?;

        if !info.kind.is_container() {
            let locator = SourceLocator::new(&info.protocol, &absolute);
            debug!(locator = %locator, kind = %info.kind, "Passing upload through");
            return Ok(Source::passthrough(locator));
        }

        match info.kind {
            FileKind::Zip => self.extract_zip(absolute, &info.protocol).await,
            other => Err(NormalizeError::extraction(
                path,
                format!("no normalizer for container kind {}", other),
            )),
        }
    }

    async fn extract_zip(
        &self,
        archive: PathBuf,
        protocol: &Protocol,
    ) -> Result<Source, NormalizeError> {
        tokio::fs::create_dir_all(&self.staging_root)
            .await
            .map_err(|source| NormalizeError::Staging {
                path: self.staging_root.clone(),
                source,
            })?;
        let staging = tempfile::Builder::new()
            .prefix("staging-")
            .tempdir_in(&self.staging_root)
            .map_err(|source| NormalizeError::Staging {
                path: self.staging_root.clone(),
                source,
            })?;

        let target = staging.path().to_path_buf();
        let source_archive = archive.clone();
        let shapefile = tokio::task::spawn_blocking(move || {
            extract::extract_shapefile(&source_archive, &target)
        })
        .await
        .map_err(|e| {
            NormalizeError::extraction(&archive, format!("extraction task failed: {}", e))
        })??;

        let locator = SourceLocator::new(protocol, &shapefile);
        debug!(
            archive = %archive.display(),
            staging = %staging.path().display(),
            locator = %locator,
            "Extracted zipped shapefile"
        );
        Ok(Source::staged(locator, staging))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = ::zip::ZipWriter::new(file);
        let options = ::zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn test_passthrough_keeps_original_file() {
        let temp_dir = TempDir::new().unwrap();
        let upload = temp_dir.path().join("points.geojson");
        std::fs::write(&upload, b"{\"type\":\"FeatureCollection\"}").unwrap();

        let normalizer = Normalizer::new(temp_dir.path().join("staging"));
        let info = FileInfo::new(Protocol::Geodata, FileKind::GeoJson);
        let source = normalizer.normalize(&upload, &info).await.unwrap();

        assert_eq!(source.locator().scheme(), "omnivore");
        assert_eq!(source.locator().path(), upload.as_path());
        assert!(source.staging_dir().is_none());
    }

    #[tokio::test]
    async fn test_zip_extracts_shapefile() {
        let temp_dir = TempDir::new().unwrap();
        let upload = temp_dir.path().join("roads.zip");
        write_zip(
            &upload,
            &[
                ("roads/roads.shp", "shp"),
                ("roads/roads.dbf", "dbf"),
                ("roads/roads.shx", "shx"),
            ],
        );

        let normalizer = Normalizer::new(temp_dir.path().join("staging"));
        let info = FileInfo::new(Protocol::Geodata, FileKind::Zip);
        let source = normalizer.normalize(&upload, &info).await.unwrap();

        let staging = source.staging_dir().unwrap().to_path_buf();
        assert!(source.locator().path().starts_with(&staging));
        assert!(source.locator().path().ends_with("roads/roads.shp"));
        assert!(staging.join("roads/roads.dbf").exists());

        drop(source);
        assert!(!staging.exists(), "staging directory removed on drop");
    }

    #[tokio::test]
    async fn test_corrupt_zip_is_extraction_error() {
        let temp_dir = TempDir::new().unwrap();
        let upload = temp_dir.path().join("broken.zip");
        let mut file = std::fs::File::create(&upload).unwrap();
        file.write_all(&[0x50, 0x4b, 0x03, 0x04, 0xde, 0xad]).unwrap();

        let staging_root = temp_dir.path().join("staging");
        let normalizer = Normalizer::new(&staging_root);
        let info = FileInfo::new(Protocol::Geodata, FileKind::Zip);
        let err = normalizer.normalize(&upload, &info).await.unwrap_err();

        assert!(matches!(err, NormalizeError::Extraction { .. }));
        let leftovers = std::fs::read_dir(&staging_root).unwrap().count();
        assert_eq!(leftovers, 0, "failed extraction leaves no staging directory");
    }
}
