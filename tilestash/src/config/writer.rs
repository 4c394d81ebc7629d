//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;
use super::size::format_size;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let geodata_command = config.import.geodata_command.as_deref().unwrap_or("");

    format!(
        r#"[server]
; Address the HTTP API listens on
bind = {}
; Largest accepted upload (default: 512MB)
; Supports: KB, MB, GB suffixes (e.g., 100MB, 2GB)
max_upload_size = {}

[storage]
; Root directory for tile archives (tilesets/), the record database
; (records.db), upload spooling (uploads/) and zip extraction (staging/)
data_dir = {}
; Record store backend:
;   sqlite - records.db under data_dir (default)
;   memory - in-process only, records are lost on restart
record_store = {}

[import]
; Retries after a failed copy, for transient errors only (default: 2)
; Delay between retries doubles from 100ms
retries = {}
; Upper bound in seconds for one conversion, retries included (default: 120)
timeout_secs = {}
; Minimum interval in milliseconds between progress updates (default: 500)
progress_interval_ms = {}
; External tiler for generic geodata (zip shapefiles, GeoJSON, CSV, KML, GPX, GeoTIFF)
; {{source}} and {{dest}} are replaced with the input and the MBTiles output path
; Leave empty to reject generic geodata uploads as unsupported
; Example: geodata_command = tippecanoe -f -o {{dest}} {{source}}
geodata_command = {}
; Tile format produced by the tiler (default: pbf)
geodata_format = {}

[logging]
; Log file path
file = {}
"#,
        config.server.bind,
        format_size(config.server.max_upload_size),
        path_to_string(&config.storage.data_dir),
        config.storage.record_store,
        config.import.retries,
        config.import.timeout_secs,
        config.import.progress_interval_ms,
        geodata_command,
        config.import.geodata_format,
        path_to_string(&config.logging.file),
    )
}

/// Convert path to string, collapsing home dir to ~.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::super::settings::{ConfigFile, RecordStoreKind};
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");

        let mut config = ConfigFile::default();
        config.server.bind = "0.0.0.0:9000".parse().unwrap();
        config.server.max_upload_size = 2 * 1024 * 1024 * 1024; // 2GB
        config.storage.data_dir = PathBuf::from("/srv/tilestash");
        config.storage.record_store = RecordStoreKind::Memory;
        config.import.geodata_command = Some("tippecanoe -o {dest} {source}".to_string());
        config.import.timeout_secs = 600;

        config.save_to(&config_path).unwrap();

        let loaded = ConfigFile::load_from(&config_path).unwrap();

        assert_eq!(loaded.server.bind, config.server.bind);
        assert_eq!(loaded.server.max_upload_size, 2 * 1024 * 1024 * 1024);
        assert_eq!(loaded.storage.data_dir, PathBuf::from("/srv/tilestash"));
        assert_eq!(loaded.storage.record_store, RecordStoreKind::Memory);
        assert_eq!(
            loaded.import.geodata_command.as_deref(),
            Some("tippecanoe -o {dest} {source}")
        );
        assert_eq!(loaded.import.timeout_secs, 600);
    }

    #[test]
    fn test_default_config_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");

        ConfigFile::default().save_to(&config_path).unwrap();
        let loaded = ConfigFile::load_from(&config_path).unwrap();

        assert!(loaded.import.geodata_command.is_none());
        assert_eq!(loaded.logging.file, ConfigFile::default().logging.file);
    }

    #[test]
    fn test_comments_show_placeholders() {
        let content = to_config_string(&ConfigFile::default());
        assert!(content.contains("{source} and {dest}"));
        assert!(content.contains("max_upload_size = 512MB"));
    }
}
