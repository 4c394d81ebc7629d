//! Tileset metadata records.
//!
//! A [`Tileset`] is the persisted description of one imported tile archive:
//! who owns it, what it is called, and where its most recent import stands.
//! Records are changed through [`TilesetPatch`] values so that every store
//! implementation applies the same rules (attempt guards, monotonic progress).

mod patch;

pub use patch::{PatchRejected, TilesetPatch};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a tileset record: unique per `(owner, tileset_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TilesetKey {
    /// Owning account or namespace
    pub owner: String,
    /// Tileset identifier within the owner
    pub tileset_id: String,
}

impl TilesetKey {
    /// Creates a key from owner and tileset id.
    pub fn new(owner: impl Into<String>, tileset_id: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            tileset_id: tileset_id.into(),
        }
    }
}

impl fmt::Display for TilesetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.tileset_id)
    }
}

/// Metadata record for one tileset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tileset {
    /// Owning account or namespace
    pub owner: String,
    /// Identifier, unique within the owner
    pub tileset_id: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Display description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// True once the latest import attempt has finished (successfully or not)
    pub complete: bool,
    /// Import progress (0-100); only meaningful while `complete` is false
    pub progress: u8,
    /// Failure detail of the latest import attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Import attempt counter (0 = never imported)
    #[serde(default)]
    pub attempt: u64,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Last modification time
    pub modified: DateTime<Utc>,
}

impl Tileset {
    /// Creates an empty, never-imported record for `owner`.
    ///
    /// The id is left empty; stores assign one on insert.
    pub fn new(owner: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            owner: owner.into(),
            tileset_id: String::new(),
            name: None,
            description: None,
            complete: false,
            progress: 0,
            error: None,
            attempt: 0,
            created: now,
            modified: now,
        }
    }

    /// Creates an empty record with a caller-chosen id.
    pub fn with_id(owner: impl Into<String>, tileset_id: impl Into<String>) -> Self {
        Self {
            tileset_id: tileset_id.into(),
            ..Self::new(owner)
        }
    }

    /// Returns the record's key.
    pub fn key(&self) -> TilesetKey {
        TilesetKey::new(self.owner.clone(), self.tileset_id.clone())
    }

    /// Returns true if an import attempt is currently running for this record.
    pub fn is_importing(&self) -> bool {
        self.attempt > 0 && !self.complete
    }
}

/// Generates a fresh tileset id.
pub fn generate_tileset_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Returns true if `value` is usable as an owner or tileset id.
///
/// Ids become path components of the archive location, so separators,
/// dot-only names and control characters are refused.
pub fn is_valid_identifier(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 128
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_empty() {
        let tileset = Tileset::new("acme");
        assert_eq!(tileset.owner, "acme");
        assert!(tileset.tileset_id.is_empty());
        assert!(!tileset.complete);
        assert_eq!(tileset.progress, 0);
        assert_eq!(tileset.attempt, 0);
        assert!(!tileset.is_importing());
    }

    #[test]
    fn test_generated_ids_are_unique_and_valid() {
        let a = generate_tileset_id();
        let b = generate_tileset_id();
        assert_ne!(a, b);
        assert!(is_valid_identifier(&a));
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("acme"));
        assert!(is_valid_identifier("roads.v2_final-1"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier(".."));
        assert!(!is_valid_identifier("a/b"));
        assert!(!is_valid_identifier("a\\b"));
        assert!(!is_valid_identifier("spaced name"));
    }

    #[test]
    fn test_json_uses_camel_case() {
        let tileset = Tileset::with_id("acme", "roads");
        let json = serde_json::to_value(&tileset).unwrap();
        assert_eq!(json["tilesetId"], "roads");
        assert_eq!(json["complete"], false);
        assert_eq!(json["progress"], 0);
        assert!(json.get("error").is_none());
        assert!(json.get("name").is_none());
    }

    #[test]
    fn test_key_display() {
        let key = TilesetKey::new("acme", "roads");
        assert_eq!(key.to_string(), "acme/roads");
    }
}
