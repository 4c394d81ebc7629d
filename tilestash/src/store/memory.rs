//! In-memory record store.

use super::{prepare_insert, rejected, RecordStore, StoreError};
use crate::tileset::{Tileset, TilesetKey, TilesetPatch};
use crate::BoxFuture;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Record store backed by a concurrent map.
///
/// Per-record atomicity comes from DashMap's shard locks: an update holds the
/// entry's write guard while the patch is applied.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: DashMap<TilesetKey, Tileset>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all owners.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn list_sync(&self, owner: &str) -> Vec<Tileset> {
        let mut tilesets: Vec<Tileset> = self
            .records
            .iter()
            .filter(|entry| entry.key().owner == owner)
            .map(|entry| entry.value().clone())
            .collect();
        tilesets.sort_by(|a, b| {
            a.created
                .cmp(&b.created)
                .then_with(|| a.tileset_id.cmp(&b.tileset_id))
        });
        tilesets
    }

    fn insert_sync(&self, tileset: Tileset) -> Result<Tileset, StoreError> {
        let tileset = prepare_insert(tileset)?;
        match self.records.entry(tileset.key()) {
            Entry::Occupied(entry) => Err(StoreError::AlreadyExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(tileset.clone());
                Ok(tileset)
            }
        }
    }

    fn update_sync(&self, key: &TilesetKey, patch: &TilesetPatch) -> Result<Tileset, StoreError> {
        let mut record = self
            .records
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        patch
            .apply(record.value_mut(), Utc::now())
            .map_err(|reason| rejected(key, reason))?;
        Ok(record.value().clone())
    }
}

impl RecordStore for MemoryRecordStore {
    fn list<'a>(&'a self, owner: &'a str) -> BoxFuture<'a, Result<Vec<Tileset>, StoreError>> {
        Box::pin(async move { Ok(self.list_sync(owner)) })
    }

    fn find<'a>(
        &'a self,
        key: &'a TilesetKey,
    ) -> BoxFuture<'a, Result<Option<Tileset>, StoreError>> {
        Box::pin(async move { Ok(self.records.get(key).map(|r| r.value().clone())) })
    }

    fn insert(&self, tileset: Tileset) -> BoxFuture<'_, Result<Tileset, StoreError>> {
        Box::pin(async move { self.insert_sync(tileset) })
    }

    fn update<'a>(
        &'a self,
        key: &'a TilesetKey,
        patch: TilesetPatch,
    ) -> BoxFuture<'a, Result<Tileset, StoreError>> {
        Box::pin(async move { self.update_sync(key, &patch) })
    }

    fn remove<'a>(&'a self, key: &'a TilesetKey) -> BoxFuture<'a, Result<Tileset, StoreError>> {
        Box::pin(async move {
            self.records
                .remove(key)
                .map(|(_, tileset)| tileset)
                .ok_or_else(|| StoreError::NotFound(key.clone()))
        })
    }
}
