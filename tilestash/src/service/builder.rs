//! Component construction from configuration.
//!
//! Factory functions used by [`super::TileStashService`]. Each one builds a
//! single component so the facade only wires them together.

use super::error::ServiceError;
use crate::archive::ArchiveCatalog;
use crate::config::{ConfigFile, ImportSettings, RecordStoreKind, StorageSettings};
use crate::convert::{CommandConverter, ConverterRegistry, MbTilesConverter};
use crate::import::ImportOrchestrator;
use crate::normalize::Normalizer;
use crate::sniff::Protocol;
use crate::store::{MemoryRecordStore, RecordStore, SqliteRecordStore};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Opens the configured record store.
pub fn create_store(storage: &StorageSettings) -> Result<Arc<dyn RecordStore>, ServiceError> {
    match storage.record_store {
        RecordStoreKind::Sqlite => {
            let path = storage.records_path();
            let store = SqliteRecordStore::open(&path)?;
            info!(path = %path.display(), "Opened record store");
            Ok(Arc::new(store))
        }
        RecordStoreKind::Memory => {
            warn!("Using in-memory record store; records are lost on restart");
            Ok(Arc::new(MemoryRecordStore::new()))
        }
    }
}

/// Registers the passthrough converter and, when a tiler command is
/// configured, the generic geodata converter.
pub fn create_converters(import: &ImportSettings) -> Result<ConverterRegistry, ServiceError> {
    let mut converters = ConverterRegistry::new();
    converters.register(Protocol::MbTiles, Arc::new(MbTilesConverter::new()));

    match import.geodata_command.as_deref() {
        Some(template) => {
            let command = CommandConverter::from_template(template, &import.geodata_format)?;
            info!(
                program = command.program(),
                format = %import.geodata_format,
                "Generic geodata converter enabled"
            );
            converters.register(Protocol::Geodata, Arc::new(command));
        }
        None => {
            info!("No geodata_command configured; generic geodata uploads are unsupported");
        }
    }
    Ok(converters)
}

/// Builds the orchestrator over `store`.
pub fn create_orchestrator(
    config: &ConfigFile,
    store: Arc<dyn RecordStore>,
    converters: ConverterRegistry,
) -> ImportOrchestrator {
    let catalog = ArchiveCatalog::new(config.storage.tilesets_dir());
    ImportOrchestrator::builder(store, catalog)
        .normalizer(Normalizer::new(config.storage.staging_dir()))
        .converters(converters)
        .config(config.import.to_import_config())
        .build()
}

/// Creates the data directories.
pub fn create_directories(storage: &StorageSettings) -> Result<(), ServiceError> {
    for dir in [
        storage.data_dir.clone(),
        storage.tilesets_dir(),
        storage.uploads_dir(),
        storage.staging_dir(),
    ] {
        std::fs::create_dir_all(&dir).map_err(|e| {
            ServiceError::ConfigError(format!("cannot create {}: {}", dir.display(), e))
        })?;
    }
    Ok(())
}

/// Deletes files a previous process left behind in a spool directory.
///
/// Uploads and extraction directories are only needed while their import
/// runs, so anything present at startup is stale. Returns the number of
/// entries removed.
pub fn clear_spool(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => debug!(path = %path.display(), error = %e, "Could not remove stale entry"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings(dir: &Path) -> ConfigFile {
        let mut config = ConfigFile::default();
        config.storage.data_dir = dir.to_path_buf();
        config
    }

    #[test]
    fn test_converters_without_command() {
        let converters = create_converters(&ConfigFile::default().import).unwrap();
        assert!(converters.supports(&Protocol::MbTiles));
        assert!(!converters.supports(&Protocol::Geodata));
    }

    #[test]
    fn test_converters_with_command() {
        let mut import = ConfigFile::default().import;
        import.geodata_command = Some("tippecanoe -o {dest} {source}".to_string());

        let converters = create_converters(&import).unwrap();
        assert!(converters.supports(&Protocol::Geodata));
    }

    #[test]
    fn test_converter_command_without_dest_fails() {
        let mut import = ConfigFile::default().import;
        import.geodata_command = Some("tippecanoe {source}".to_string());
        assert!(create_converters(&import).is_err());
    }

    #[test]
    fn test_sqlite_store_lives_in_data_dir() {
        let temp = TempDir::new().unwrap();
        let config = settings(temp.path());
        create_directories(&config.storage).unwrap();

        create_store(&config.storage).unwrap();
        assert!(temp.path().join("records.db").exists());
        assert!(temp.path().join("tilesets").is_dir());
    }

    #[test]
    fn test_clear_spool() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("upload-abc"), b"x").unwrap();
        std::fs::create_dir(temp.path().join("import-1")).unwrap();
        std::fs::write(temp.path().join("import-1").join("a.shp"), b"x").unwrap();

        assert_eq!(clear_spool(temp.path()), 2);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
        assert_eq!(clear_spool(&temp.path().join("missing")), 0);
    }
}
