//! Import progress reporting.
//!
//! Converters push `(done, total)` events into a [`ProgressSink`] as often as
//! they like. A [`ProgressReporter`] task turns the latest event into a
//! percentage and writes it to the record store, throttled by a
//! [`ProgressThrottle`]. The terminal write of an attempt goes through
//! [`ProgressReporter::finish`], which stops the task first so no progress
//! write can land after it.

use crate::store::{RecordStore, StoreError};
use crate::tileset::{Tileset, TilesetKey, TilesetPatch};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Highest value written while an attempt is still running.
///
/// 100 is reserved for the terminal write of a successful attempt.
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// One progress observation from a converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub done: u64,
    pub total: u64,
}

impl ProgressEvent {
    /// `round(100 * done / total)`, 0 when the total is unknown.
    pub fn percentage(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let done = u128::from(self.done.min(self.total));
        let total = u128::from(self.total);
        let pct = (done * 200 + total) / (total * 2);
        u8::try_from(pct).unwrap_or(100)
    }
}

/// Converter-side handle for progress events.
///
/// Latest value wins: events sent faster than the reporter consumes them
/// overwrite each other.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: Arc<watch::Sender<Option<ProgressEvent>>>,
}

impl ProgressSink {
    /// Creates a sink and the receiver observing it.
    pub fn channel() -> (Self, watch::Receiver<Option<ProgressEvent>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx: Arc::new(tx) }, rx)
    }

    /// A sink nobody listens to.
    pub fn detached() -> Self {
        Self::channel().0
    }

    /// Records that `done` of `total` units are finished.
    pub fn report(&self, done: u64, total: u64) {
        self.tx.send_replace(Some(ProgressEvent { done, total }));
    }
}

/// Decides which progress values are written.
///
/// A value passes if it is higher than the last written one and the minimum
/// interval since the last write has elapsed. Running values are capped at
/// [`MAX_RUNNING_PROGRESS`]. After [`finish`](Self::finish) nothing passes.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
    last_value: Option<u8>,
    finished: bool,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            last_value: None,
            finished: false,
        }
    }

    /// Offers a percentage observed at `now`; returns the value to write.
    pub fn offer(&mut self, percentage: u8, now: Instant) -> Option<u8> {
        if self.finished {
            return None;
        }
        let value = percentage.min(MAX_RUNNING_PROGRESS);
        if self.last_value.is_some_and(|last| value <= last) {
            return None;
        }
        if self.ready_at().is_some_and(|ready| now < ready) {
            return None;
        }
        self.last_emit = Some(now);
        self.last_value = Some(value);
        Some(value)
    }

    /// Earliest instant the next value may be written.
    pub fn ready_at(&self) -> Option<Instant> {
        self.last_emit.map(|last| last + self.interval)
    }

    /// Last value that passed.
    pub fn last_value(&self) -> Option<u8> {
        self.last_value
    }

    /// Closes the throttle. Returns true the first time only.
    pub fn finish(&mut self) -> bool {
        !std::mem::replace(&mut self.finished, true)
    }
}

/// Outcome of [`ProgressReporter::finish`].
#[derive(Debug, Clone)]
pub struct FinishedAttempt {
    /// Record after the terminal write
    pub record: Tileset,
    /// Progress writes that landed before the terminal write
    pub progress_writes: u64,
}

/// Writes throttled progress for one import attempt.
pub struct ProgressReporter {
    store: Arc<dyn RecordStore>,
    key: TilesetKey,
    attempt: u64,
    close: CancellationToken,
    task: Option<JoinHandle<u64>>,
}

impl ProgressReporter {
    /// Starts the reporter task for `attempt` of `key`.
    pub fn spawn(
        store: Arc<dyn RecordStore>,
        key: TilesetKey,
        attempt: u64,
        interval: Duration,
    ) -> (Self, ProgressSink) {
        let (sink, rx) = ProgressSink::channel();
        let close = CancellationToken::new();
        let task = tokio::spawn(run_reporter(
            Arc::clone(&store),
            key.clone(),
            attempt,
            ProgressThrottle::new(interval),
            rx,
            close.clone(),
        ));

        let reporter = Self {
            store,
            key,
            attempt,
            close,
            task: Some(task),
        };
        (reporter, sink)
    }

    /// Stops progress reporting and writes the terminal state of the attempt.
    ///
    /// `error` is `None` for success (progress becomes 100). Waits for any
    /// in-flight progress write before issuing the terminal one.
    pub async fn finish(mut self, error: Option<String>) -> Result<FinishedAttempt, StoreError> {
        self.close.cancel();
        let progress_writes = match self.task.take() {
            Some(task) => task.await.unwrap_or_else(|e| {
                warn!(tileset = %self.key, error = %e, "Progress reporter task failed");
                0
            }),
            None => 0,
        };

        let record = self
            .store
            .update(&self.key, TilesetPatch::finish(self.attempt, error))
            .await?;
        debug!(
            tileset = %self.key,
            attempt = self.attempt,
            progress_writes,
            error = record.error.as_deref().unwrap_or(""),
            "Import attempt finalized"
        );
        Ok(FinishedAttempt {
            record,
            progress_writes,
        })
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.close.cancel();
    }
}

async fn run_reporter(
    store: Arc<dyn RecordStore>,
    key: TilesetKey,
    attempt: u64,
    mut throttle: ProgressThrottle,
    mut rx: watch::Receiver<Option<ProgressEvent>>,
    close: CancellationToken,
) -> u64 {
    let mut writes = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = close.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        if let Some(ready) = throttle.ready_at() {
            if ready > Instant::now() {
                tokio::select! {
                    biased;
                    _ = close.cancelled() => break,
                    _ = tokio::time::sleep_until(ready) => {}
                }
            }
        }

        let Some(event) = *rx.borrow_and_update() else {
            continue;
        };
        let Some(value) = throttle.offer(event.percentage(), Instant::now()) else {
            continue;
        };

        match store
            .update(&key, TilesetPatch::progress(attempt, value))
            .await
        {
            Ok(_) => writes += 1,
            Err(e) if e.is_rejected() || e.is_not_found() => {
                debug!(tileset = %key, attempt, error = %e, "Progress writes stopped");
                break;
            }
            Err(e) => {
                warn!(tileset = %key, attempt, error = %e, "Failed to write progress");
            }
        }
    }
    throttle.finish();
    writes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;
    use crate::tileset::Tileset;

    #[test]
    fn test_percentage_rounding() {
        let pct = |done, total| ProgressEvent { done, total }.percentage();
        assert_eq!(pct(0, 10), 0);
        assert_eq!(pct(1, 3), 33);
        assert_eq!(pct(2, 3), 67);
        assert_eq!(pct(1, 200), 1);
        assert_eq!(pct(10, 10), 100);
        assert_eq!(pct(20, 10), 100);
        assert_eq!(pct(5, 0), 0);
    }

    #[test]
    fn test_throttle_is_monotonic_and_capped() {
        let mut throttle = ProgressThrottle::new(Duration::ZERO);
        let now = Instant::now();
        assert_eq!(throttle.offer(10, now), Some(10));
        assert_eq!(throttle.offer(5, now), None);
        assert_eq!(throttle.offer(10, now), None);
        assert_eq!(throttle.offer(100, now), Some(99));
        assert_eq!(throttle.offer(100, now), None);
        assert_eq!(throttle.last_value(), Some(99));
    }

    #[test]
    fn test_throttle_interval() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(500));
        let start = Instant::now();
        assert_eq!(throttle.offer(1, start), Some(1));
        assert_eq!(throttle.offer(2, start + Duration::from_millis(100)), None);
        assert_eq!(throttle.ready_at(), Some(start + Duration::from_millis(500)));
        assert_eq!(throttle.offer(3, start + Duration::from_millis(500)), Some(3));
    }

    #[test]
    fn test_throttle_finish_once() {
        let mut throttle = ProgressThrottle::new(Duration::ZERO);
        assert!(throttle.finish());
        assert!(!throttle.finish());
        assert_eq!(throttle.offer(50, Instant::now()), None);
    }

    async fn importing_record(store: &Arc<dyn RecordStore>) -> Tileset {
        let inserted = store.insert(Tileset::with_id("acme", "roads")).await.unwrap();
        store
            .update(&inserted.key(), TilesetPatch::begin_attempt(None, None))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_reporter_success_ends_at_100() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
        let record = importing_record(&store).await;

        let (reporter, sink) =
            ProgressReporter::spawn(Arc::clone(&store), record.key(), record.attempt, Duration::ZERO);
        for done in 0..=10 {
            sink.report(done, 10);
            tokio::task::yield_now().await;
        }

        let finished = reporter.finish(None).await.unwrap();
        assert!(finished.record.complete);
        assert_eq!(finished.record.progress, 100);
        assert!(finished.record.error.is_none());

        let late = store
            .update(&record.key(), TilesetPatch::progress(record.attempt, 50))
            .await;
        assert!(late.unwrap_err().is_rejected());
    }

    #[tokio::test]
    async fn test_reporter_failure_keeps_progress() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
        let record = importing_record(&store).await;

        let (reporter, sink) =
            ProgressReporter::spawn(Arc::clone(&store), record.key(), record.attempt, Duration::ZERO);
        sink.report(4, 10);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let finished = reporter.finish(Some("boom".to_string())).await.unwrap();
        assert!(finished.record.complete);
        assert_eq!(finished.record.error.as_deref(), Some("boom"));
        assert_eq!(finished.record.progress, 40);
        assert_eq!(finished.progress_writes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_throttles_writes() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
        let record = importing_record(&store).await;

        let (reporter, sink) = ProgressReporter::spawn(
            Arc::clone(&store),
            record.key(),
            record.attempt,
            Duration::from_secs(1),
        );
        for done in 1..=50 {
            sink.report(done, 100);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let finished = reporter.finish(None).await.unwrap();
        assert!(finished.progress_writes >= 4);
        assert!(finished.progress_writes <= 6);
    }

    #[tokio::test]
    async fn test_superseded_attempt_stops_reporting() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
        let record = importing_record(&store).await;
        store
            .update(&record.key(), TilesetPatch::begin_attempt(None, None))
            .await
            .unwrap();

        let (reporter, sink) =
            ProgressReporter::spawn(Arc::clone(&store), record.key(), record.attempt, Duration::ZERO);
        sink.report(5, 10);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = reporter.finish(None).await.unwrap_err();
        assert!(err.is_rejected());
        let current = store.find(&record.key()).await.unwrap().unwrap();
        assert!(!current.complete);
        assert_eq!(current.progress, 0);
    }
}
