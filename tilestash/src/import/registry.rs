//! Registry of in-flight import attempts.
//!
//! Tracks every attempt from upload to terminal write so the service can
//! report what is running, and owns the per-destination locks that keep two
//! attempts from converting into the same archive at once.
//!
//! Uses lock-free maps and atomic counters; nothing here blocks the runtime.

use super::ImportStage;
use crate::tileset::TilesetKey;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Process-unique identifier of one import attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImportId(u64);

impl ImportId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ImportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "import-{}", self.0)
    }
}

/// Live state of one import attempt.
pub struct ActiveImport {
    /// Registry identifier
    pub import_id: ImportId,
    /// Destination tileset
    pub key: TilesetKey,
    /// When the upload was accepted
    pub started_at: Instant,
    attempt: AtomicU64,
    stage: AtomicU8,
}

impl ActiveImport {
    fn new(import_id: ImportId, key: TilesetKey) -> Self {
        Self {
            import_id,
            key,
            started_at: Instant::now(),
            attempt: AtomicU64::new(0),
            stage: AtomicU8::new(ImportStage::Pending as u8),
        }
    }

    /// Current stage.
    #[inline]
    pub fn stage(&self) -> ImportStage {
        ImportStage::from_u8(self.stage.load(Ordering::Acquire)).unwrap_or(ImportStage::Pending)
    }

    /// Moves to `next` if the transition is legal. Returns false otherwise.
    pub fn advance(&self, next: ImportStage) -> bool {
        let mut current = self.stage.load(Ordering::Acquire);
        loop {
            let Some(stage) = ImportStage::from_u8(current) else {
                return false;
            };
            if !stage.can_advance_to(next) {
                return false;
            }
            match self.stage.compare_exchange(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Record attempt number (0 until the attempt has begun in the store).
    #[inline]
    pub fn attempt(&self) -> u64 {
        self.attempt.load(Ordering::Acquire)
    }

    pub(crate) fn set_attempt(&self, attempt: u64) {
        self.attempt.store(attempt, Ordering::Release);
    }

    /// Time since the upload was accepted.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl fmt::Debug for ActiveImport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveImport")
            .field("import_id", &self.import_id)
            .field("key", &self.key)
            .field("attempt", &self.attempt())
            .field("stage", &self.stage())
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

/// Registry of active import attempts and destination locks.
pub struct ImportRegistry {
    imports: DashMap<ImportId, Arc<ActiveImport>>,
    locks: DashMap<TilesetKey, Arc<Mutex<()>>>,
    next_id: AtomicU64,
    total_imports: AtomicU64,
    completed_imports: AtomicU64,
    failed_imports: AtomicU64,
    unsupported_imports: AtomicU64,
}

impl ImportRegistry {
    pub fn new() -> Self {
        Self {
            imports: DashMap::new(),
            locks: DashMap::new(),
            next_id: AtomicU64::new(1),
            total_imports: AtomicU64::new(0),
            completed_imports: AtomicU64::new(0),
            failed_imports: AtomicU64::new(0),
            unsupported_imports: AtomicU64::new(0),
        }
    }

    /// Registers a new attempt for `key` in [`ImportStage::Pending`].
    pub fn register(&self, key: TilesetKey) -> Arc<ActiveImport> {
        let import_id = ImportId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(ActiveImport::new(import_id, key));

        self.imports.insert(import_id, Arc::clone(&entry));
        self.total_imports.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            import_id = %import_id,
            tileset = %entry.key,
            "Registered import"
        );
        entry
    }

    /// Looks up an attempt by id.
    pub fn get(&self, import_id: ImportId) -> Option<Arc<ActiveImport>> {
        self.imports.get(&import_id).map(|r| Arc::clone(r.value()))
    }

    /// Active attempts targeting `key`, oldest first.
    pub fn for_tileset(&self, key: &TilesetKey) -> Vec<Arc<ActiveImport>> {
        let mut found: Vec<_> = self
            .imports
            .iter()
            .filter(|entry| &entry.value().key == key)
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        found.sort_by_key(|entry| entry.import_id);
        found
    }

    /// Lock serializing conversions into the archive of `key`.
    pub fn destination_lock(&self, key: &TilesetKey) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Removes an attempt that reached `stage` and updates the counters.
    ///
    /// Destination locks nobody holds or waits on are dropped as well.
    pub fn finish(&self, import_id: ImportId, stage: ImportStage) {
        let Some((_, entry)) = self.imports.remove(&import_id) else {
            return;
        };
        let counter = match stage {
            ImportStage::Done => &self.completed_imports,
            ImportStage::Unsupported => &self.unsupported_imports,
            _ => &self.failed_imports,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.locks
            .remove_if(&entry.key, |_, lock| Arc::strong_count(lock) == 1);

        tracing::debug!(
            import_id = %import_id,
            tileset = %entry.key,
            attempt = entry.attempt(),
            stage = %stage,
            elapsed_ms = entry.elapsed().as_millis(),
            "Import finished"
        );
    }

    /// Number of attempts not yet finished.
    #[inline]
    pub fn active_count(&self) -> usize {
        self.imports.len()
    }

    /// Snapshot of registry statistics.
    pub fn stats(&self) -> ImportStats {
        let mut by_stage = [0usize; ImportStage::ALL.len()];
        for entry in self.imports.iter() {
            by_stage[entry.value().stage() as usize] += 1;
        }

        ImportStats {
            active_imports: self.imports.len(),
            total_imports: self.total_imports.load(Ordering::Relaxed),
            completed_imports: self.completed_imports.load(Ordering::Relaxed),
            failed_imports: self.failed_imports.load(Ordering::Relaxed),
            unsupported_imports: self.unsupported_imports.load(Ordering::Relaxed),
            imports_pending: by_stage[ImportStage::Pending as usize],
            imports_sniffing: by_stage[ImportStage::Sniffing as usize],
            imports_converting: by_stage[ImportStage::Converting as usize],
        }
    }
}

impl Default for ImportRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of registry statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    /// Attempts not yet finished
    pub active_imports: usize,
    /// Attempts registered (lifetime)
    pub total_imports: u64,
    /// Attempts that published an archive
    pub completed_imports: u64,
    /// Attempts that failed (sniff, extraction, conversion)
    pub failed_imports: u64,
    /// Uploads of unsupported formats
    pub unsupported_imports: u64,
    /// Attempts in Pending
    pub imports_pending: usize,
    /// Attempts in Sniffing
    pub imports_sniffing: usize,
    /// Attempts in Converting (including those waiting for the lock)
    pub imports_converting: usize,
}
