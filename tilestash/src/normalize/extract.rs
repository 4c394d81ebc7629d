//! Zip extraction for shapefile uploads.

use super::NormalizeError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Extracts `zip_path` into `target_dir` and returns the path of the
/// shapefile it contains.
///
/// Entries that would escape `target_dir` abort the extraction. Archives
/// holding several shapefiles resolve to the first in lexical order.
pub(super) fn extract_shapefile(
    zip_path: &Path,
    target_dir: &Path,
) -> Result<PathBuf, NormalizeError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| NormalizeError::extraction(zip_path, format!("open: {err}")))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|err| NormalizeError::extraction(zip_path, err.to_string()))?;

    let mut shapefiles = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| NormalizeError::extraction(zip_path, err.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(NormalizeError::extraction(
                zip_path,
                "zip entry path traversal detected",
            ));
        };
        let entry_path = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| NormalizeError::extraction(zip_path, err.to_string()))?;
            continue;
        }
        if is_hidden_metadata(&entry_path) {
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| NormalizeError::extraction(zip_path, err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| NormalizeError::extraction(zip_path, err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| NormalizeError::extraction(zip_path, err.to_string()))?;

        if has_extension(&entry_path, "shp") {
            shapefiles.push(entry_path);
        }
    }

    shapefiles.sort();
    shapefiles
        .into_iter()
        .next()
        .ok_or_else(|| {
            NormalizeError::extraction(zip_path, "zip file did not contain a shapefile")
        })
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// macOS resource forks (`__MACOSX/`, `._name.shp`) are not shapefiles.
fn is_hidden_metadata(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == "__MACOSX")
        || path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("._"))
}
