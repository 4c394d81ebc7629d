//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use super::size::parse_size;

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parses `value` with [`FromStr`], mapping failure to `InvalidValue`.
fn parse_value<T: FromStr>(
    section: &str,
    key: &str,
    value: &str,
    reason: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, reason))
}

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [server] section
    if let Some(section) = ini.section(Some("server")) {
        if let Some(v) = section.get("bind") {
            config.server.bind = parse_value(
                "server",
                "bind",
                v,
                "expected a socket address like '127.0.0.1:3000'",
            )?;
        }
        if let Some(v) = section.get("max_upload_size") {
            let size = parse_size(v).map_err(|_| {
                invalid(
                    "server",
                    "max_upload_size",
                    v,
                    "expected format like '512MB', '2GB', or '1024KB'",
                )
            })?;
            if size == 0 {
                return Err(invalid(
                    "server",
                    "max_upload_size",
                    v,
                    "must be greater than zero",
                ));
            }
            config.server.max_upload_size = size;
        }
    }

    // [storage] section
    if let Some(section) = ini.section(Some("storage")) {
        if let Some(v) = section.get("data_dir") {
            let v = v.trim();
            if !v.is_empty() {
                config.storage.data_dir = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("record_store") {
            config.storage.record_store = parse_value(
                "storage",
                "record_store",
                v,
                "must be 'sqlite' or 'memory'",
            )?;
        }
    }

    // [import] section
    if let Some(section) = ini.section(Some("import")) {
        if let Some(v) = section.get("retries") {
            config.import.retries =
                parse_value("import", "retries", v, "must be a non-negative integer")?;
        }
        if let Some(v) = section.get("timeout_secs") {
            let secs: u64 = parse_value(
                "import",
                "timeout_secs",
                v,
                "must be a positive integer (seconds)",
            )?;
            if secs == 0 {
                return Err(invalid(
                    "import",
                    "timeout_secs",
                    v,
                    "must be a positive integer (seconds)",
                ));
            }
            config.import.timeout_secs = secs;
        }
        if let Some(v) = section.get("progress_interval_ms") {
            config.import.progress_interval_ms = parse_value(
                "import",
                "progress_interval_ms",
                v,
                "must be a non-negative integer (milliseconds)",
            )?;
        }
        if let Some(v) = section.get("geodata_command") {
            let v = v.trim();
            if v.is_empty() {
                config.import.geodata_command = None;
            } else if !v.contains("{dest}") {
                return Err(invalid(
                    "import",
                    "geodata_command",
                    v,
                    "must contain a {dest} placeholder",
                ));
            } else {
                config.import.geodata_command = Some(v.to_string());
            }
        }
        if let Some(v) = section.get("geodata_format") {
            let v = v.trim().to_lowercase();
            if !v.is_empty() {
                config.import.geodata_format = v;
            }
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = expand_tilde(v);
            }
        }
    }

    Ok(config)
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
