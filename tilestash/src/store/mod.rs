//! Tileset record store.
//!
//! The store exclusively owns persisted tileset metadata. Every operation is
//! atomic per record; nothing needs cross-record transactions.
//!
//! # Implementations
//!
//! - [`MemoryRecordStore`] - process-local, used for tests and ephemeral runs
//! - [`SqliteRecordStore`] - one row per tileset in a SQLite database
//!
//! Both apply updates through [`TilesetPatch::apply`], so attempt guards and
//! progress monotonicity behave identically.

mod memory;
mod sqlite;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use crate::tileset::{is_valid_identifier, PatchRejected, Tileset, TilesetKey, TilesetPatch};
use crate::BoxFuture;
use thiserror::Error;

/// Record store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record for the key
    #[error("Tileset {0} not found")]
    NotFound(TilesetKey),

    /// Insert collided with an existing record
    #[error("Tileset {0} already exists")]
    AlreadyExists(TilesetKey),

    /// The patch was refused by the record's attempt guard
    #[error("Update to tileset {key} rejected: {reason}")]
    Rejected {
        key: TilesetKey,
        #[source]
        reason: PatchRejected,
    },

    /// Owner or tileset id unusable as an identifier
    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// Backend failure (database, lock, blocking task)
    #[error("Record store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns true if the error means the record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if the error came from a superseded or finished attempt.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Persistence for tileset records.
///
/// Async methods return boxed futures so stores can be shared as
/// `Arc<dyn RecordStore>`.
pub trait RecordStore: Send + Sync {
    /// Lists all records of an owner, oldest first.
    fn list<'a>(&'a self, owner: &'a str) -> BoxFuture<'a, Result<Vec<Tileset>, StoreError>>;

    /// Finds one record.
    fn find<'a>(&'a self, key: &'a TilesetKey)
        -> BoxFuture<'a, Result<Option<Tileset>, StoreError>>;

    /// Inserts a record, assigning a tileset id if it has none.
    fn insert(&self, tileset: Tileset) -> BoxFuture<'_, Result<Tileset, StoreError>>;

    /// Applies a patch atomically and returns the updated record.
    fn update<'a>(
        &'a self,
        key: &'a TilesetKey,
        patch: TilesetPatch,
    ) -> BoxFuture<'a, Result<Tileset, StoreError>>;

    /// Removes a record and returns it.
    fn remove<'a>(&'a self, key: &'a TilesetKey) -> BoxFuture<'a, Result<Tileset, StoreError>>;
}

/// Fills in a missing id and validates identifiers before insert.
pub(crate) fn prepare_insert(mut tileset: Tileset) -> Result<Tileset, StoreError> {
    if tileset.tileset_id.is_empty() {
        tileset.tileset_id = crate::tileset::generate_tileset_id();
    }
    if !is_valid_identifier(&tileset.owner) {
        return Err(StoreError::InvalidIdentifier(tileset.owner));
    }
    if !is_valid_identifier(&tileset.tileset_id) {
        return Err(StoreError::InvalidIdentifier(tileset.tileset_id));
    }
    Ok(tileset)
}

/// Wraps a patch rejection with the record key.
pub(crate) fn rejected(key: &TilesetKey, reason: PatchRejected) -> StoreError {
    StoreError::Rejected {
        key: key.clone(),
        reason,
    }
}
