//! Partial updates to tileset records.

use super::Tileset;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Reasons a patch is refused without modifying the record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchRejected {
    /// The record has moved on to a different import attempt.
    #[error("import attempt {expected} superseded by attempt {actual}")]
    AttemptMismatch { expected: u64, actual: u64 },

    /// The attempt already wrote its terminal update.
    #[error("import attempt {attempt} already finished")]
    AttemptFinished { attempt: u64 },
}

/// A partial update applied atomically to a [`Tileset`].
///
/// Import-related patches carry the attempt number they belong to; a store
/// refuses them once the record has started a newer attempt, so a slow,
/// superseded import can never overwrite the state of the current one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TilesetPatch {
    /// New display name
    pub name: Option<String>,
    /// New display description
    pub description: Option<String>,
    /// Start a new import attempt (bump `attempt`, reset progress and error)
    pub begin_attempt: bool,
    /// Progress value to record (never lowers the stored value)
    pub progress: Option<u8>,
    /// Terminal result of the attempt: `Some(None)` success, `Some(Some(e))` failure
    pub finish: Option<Option<String>>,
    /// Only apply if the record is still on this attempt
    pub expected_attempt: Option<u64>,
}

impl TilesetPatch {
    /// Metadata-only update (the PATCH endpoint).
    pub fn metadata(name: Option<String>, description: Option<String>) -> Self {
        Self {
            name,
            description,
            ..Self::default()
        }
    }

    /// Starts a new import attempt, optionally filling in name and description.
    pub fn begin_attempt(name: Option<String>, description: Option<String>) -> Self {
        Self {
            name,
            description,
            begin_attempt: true,
            ..Self::default()
        }
    }

    /// Progress update for a running attempt.
    pub fn progress(attempt: u64, progress: u8) -> Self {
        Self {
            progress: Some(progress),
            expected_attempt: Some(attempt),
            ..Self::default()
        }
    }

    /// Terminal update for an attempt.
    pub fn finish(attempt: u64, error: Option<String>) -> Self {
        Self {
            finish: Some(error),
            expected_attempt: Some(attempt),
            ..Self::default()
        }
    }

    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && !self.begin_attempt
            && self.progress.is_none()
            && self.finish.is_none()
    }

    /// Applies the patch to `tileset`.
    ///
    /// All checks run before any field is touched: a rejected patch leaves the
    /// record unchanged.
    pub fn apply(&self, tileset: &mut Tileset, now: DateTime<Utc>) -> Result<(), PatchRejected> {
        if let Some(expected) = self.expected_attempt {
            if tileset.attempt != expected {
                return Err(PatchRejected::AttemptMismatch {
                    expected,
                    actual: tileset.attempt,
                });
            }
            if tileset.complete && (self.progress.is_some() || self.finish.is_some()) {
                return Err(PatchRejected::AttemptFinished { attempt: expected });
            }
        }

        if let Some(name) = &self.name {
            tileset.name = Some(name.clone());
        }
        if let Some(description) = &self.description {
            tileset.description = Some(description.clone());
        }
        if self.begin_attempt {
            tileset.attempt += 1;
            tileset.complete = false;
            tileset.progress = 0;
            tileset.error = None;
        }
        if let Some(progress) = self.progress {
            tileset.progress = tileset.progress.max(progress.min(100));
        }
        if let Some(result) = &self.finish {
            tileset.complete = true;
            tileset.error = result.clone();
            if result.is_none() {
                tileset.progress = 100;
            }
        }

        tileset.modified = now;
        Ok(())
    }
}
