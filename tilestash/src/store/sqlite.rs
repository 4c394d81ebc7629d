//! SQLite-backed record store.

use super::{prepare_insert, rejected, RecordStore, StoreError};
use crate::tileset::{Tileset, TilesetKey, TilesetPatch};
use crate::BoxFuture;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tilesets (
    owner       TEXT NOT NULL,
    tileset_id  TEXT NOT NULL,
    name        TEXT,
    description TEXT,
    complete    INTEGER NOT NULL DEFAULT 0,
    progress    INTEGER NOT NULL DEFAULT 0,
    error       TEXT,
    attempt     INTEGER NOT NULL DEFAULT 0,
    created     TEXT NOT NULL,
    modified    TEXT NOT NULL,
    PRIMARY KEY (owner, tileset_id)
);
";

const COLUMNS: &str =
    "owner, tileset_id, name, description, complete, progress, error, attempt, created, modified";

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Record store persisting tilesets in a SQLite database.
///
/// The connection is shared behind a mutex; every operation runs on the
/// blocking thread pool so the async runtime never waits on disk I/O.
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Opens (or creates) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!(
                    "failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get::<_, String>(0))?;
        let store = Self::from_connection(conn)?;

        info!(path = %path.display(), "SQLite record store opened");
        Ok(store)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Backend("record store lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("blocking task failed: {}", e)))?
    }
}

fn row_to_tileset(row: &Row<'_>) -> rusqlite::Result<Tileset> {
    let progress: i64 = row.get(5)?;
    let attempt: i64 = row.get(7)?;
    Ok(Tileset {
        owner: row.get(0)?,
        tileset_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        complete: row.get(4)?,
        progress: u8::try_from(progress.clamp(0, 100)).unwrap_or(0),
        error: row.get(6)?,
        attempt: u64::try_from(attempt).unwrap_or(0),
        created: row.get(8)?,
        modified: row.get(9)?,
    })
}

fn attempt_to_sql(attempt: u64) -> i64 {
    i64::try_from(attempt).unwrap_or(i64::MAX)
}

fn find_row(conn: &Connection, key: &TilesetKey) -> Result<Option<Tileset>, StoreError> {
    let sql = format!(
        "SELECT {} FROM tilesets WHERE owner = ?1 AND tileset_id = ?2",
        COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![key.owner, key.tileset_id], row_to_tileset)
        .optional()?)
}

impl RecordStore for SqliteRecordStore {
    fn list<'a>(&'a self, owner: &'a str) -> BoxFuture<'a, Result<Vec<Tileset>, StoreError>> {
        let owner = owner.to_string();
        Box::pin(self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM tilesets WHERE owner = ?1 ORDER BY created, tileset_id",
                COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![owner], row_to_tileset)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        }))
    }

    fn find<'a>(
        &'a self,
        key: &'a TilesetKey,
    ) -> BoxFuture<'a, Result<Option<Tileset>, StoreError>> {
        let key = key.clone();
        Box::pin(self.with_conn(move |conn| find_row(conn, &key)))
    }

    fn insert(&self, tileset: Tileset) -> BoxFuture<'_, Result<Tileset, StoreError>> {
        Box::pin(async move {
            let tileset = prepare_insert(tileset)?;
            self.with_conn(move |conn| {
                let sql = format!(
                    "INSERT INTO tilesets ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    COLUMNS
                );
                let result = conn.execute(
                    &sql,
                    params![
                        tileset.owner,
                        tileset.tileset_id,
                        tileset.name,
                        tileset.description,
                        tileset.complete,
                        i64::from(tileset.progress),
                        tileset.error,
                        attempt_to_sql(tileset.attempt),
                        tileset.created,
                        tileset.modified,
                    ],
                );
                match result {
                    Ok(_) => Ok(tileset),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == ErrorCode::ConstraintViolation =>
                    {
                        Err(StoreError::AlreadyExists(tileset.key()))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
        })
    }

    fn update<'a>(
        &'a self,
        key: &'a TilesetKey,
        patch: TilesetPatch,
    ) -> BoxFuture<'a, Result<Tileset, StoreError>> {
        let key = key.clone();
        Box::pin(self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut tileset =
                find_row(&tx, &key)?.ok_or_else(|| StoreError::NotFound(key.clone()))?;
            patch
                .apply(&mut tileset, Utc::now())
                .map_err(|reason| rejected(&key, reason))?;
            tx.execute(
                "UPDATE tilesets SET name = ?3, description = ?4, complete = ?5, progress = ?6,
                     error = ?7, attempt = ?8, modified = ?9
                 WHERE owner = ?1 AND tileset_id = ?2",
                params![
                    tileset.owner,
                    tileset.tileset_id,
                    tileset.name,
                    tileset.description,
                    tileset.complete,
                    i64::from(tileset.progress),
                    tileset.error,
                    attempt_to_sql(tileset.attempt),
                    tileset.modified,
                ],
            )?;
            tx.commit()?;
            Ok(tileset)
        }))
    }

    fn remove<'a>(&'a self, key: &'a TilesetKey) -> BoxFuture<'a, Result<Tileset, StoreError>> {
        let key = key.clone();
        Box::pin(self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let tileset =
                find_row(&tx, &key)?.ok_or_else(|| StoreError::NotFound(key.clone()))?;
            tx.execute(
                "DELETE FROM tilesets WHERE owner = ?1 AND tileset_id = ?2",
                params![key.owner, key.tileset_id],
            )?;
            tx.commit()?;
            Ok(tileset)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let inserted = store.insert(Tileset::new("acme")).await.unwrap();

        let found = store.find(&inserted.key()).await.unwrap().unwrap();
        assert_eq!(found.tileset_id, inserted.tileset_id);
        assert_eq!(found.owner, "acme");
        assert!(!found.complete);
    }

    #[tokio::test]
    async fn test_duplicate_insert() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        store.insert(Tileset::with_id("acme", "roads")).await.unwrap();
        let err = store
            .insert(Tileset::with_id("acme", "roads"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_import_lifecycle_round_trip() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let key = store
            .insert(Tileset::with_id("acme", "roads"))
            .await
            .unwrap()
            .key();

        let started = store
            .update(
                &key,
                TilesetPatch::begin_attempt(Some("Roads".to_string()), None),
            )
            .await
            .unwrap();
        assert_eq!(started.attempt, 1);

        store
            .update(&key, TilesetPatch::progress(1, 60))
            .await
            .unwrap();
        let finished = store
            .update(&key, TilesetPatch::finish(1, Some("boom".to_string())))
            .await
            .unwrap();

        let found = store.find(&key).await.unwrap().unwrap();
        assert_eq!(found, finished);
        assert!(found.complete);
        assert_eq!(found.progress, 60);
        assert_eq!(found.error.as_deref(), Some("boom"));
        assert_eq!(found.name.as_deref(), Some("Roads"));
    }

    #[tokio::test]
    async fn test_rejected_patch_not_persisted() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let key = store
            .insert(Tileset::with_id("acme", "roads"))
            .await
            .unwrap()
            .key();
        store
            .update(&key, TilesetPatch::begin_attempt(None, None))
            .await
            .unwrap();

        let err = store
            .update(&key, TilesetPatch::progress(7, 50))
            .await
            .unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(store.find(&key).await.unwrap().unwrap().progress, 0);
    }

    #[tokio::test]
    async fn test_list_and_remove() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        store.insert(Tileset::with_id("acme", "a")).await.unwrap();
        store.insert(Tileset::with_id("acme", "b")).await.unwrap();
        store.insert(Tileset::with_id("globex", "c")).await.unwrap();

        assert_eq!(store.list("acme").await.unwrap().len(), 2);

        let removed = store.remove(&TilesetKey::new("acme", "a")).await.unwrap();
        assert_eq!(removed.tileset_id, "a");
        assert_eq!(store.list("acme").await.unwrap().len(), 1);
        assert!(store
            .remove(&TilesetKey::new("acme", "a"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_reopen_persists_records() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db").join("records.db");

        {
            let store = SqliteRecordStore::open(&path).unwrap();
            store.insert(Tileset::with_id("acme", "roads")).await.unwrap();
        }

        let store = SqliteRecordStore::open(&path).unwrap();
        let found = store.find(&TilesetKey::new("acme", "roads")).await.unwrap();
        assert!(found.is_some());
    }
}
