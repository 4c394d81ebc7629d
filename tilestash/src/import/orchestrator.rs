//! Import orchestration.

use super::{
    ActiveImport, ImportId, ImportRegistry, ImportScheduler, ImportStage, ProgressReporter,
    ProgressSink,
};
use crate::archive::{ArchiveCatalog, ArchiveError};
use crate::convert::{ConvertError, ConverterRegistry, CopyStats, MbTilesConverter, TileConverter};
use crate::normalize::{NormalizeError, Normalizer, Source, SourceLocator};
use crate::sniff::{FormatSniffer, MagicSniffer, Protocol, SniffError};
use crate::store::{RecordStore, StoreError};
use crate::tileset::{is_valid_identifier, Tileset, TilesetKey, TilesetPatch};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default converter retries for retryable errors.
pub const DEFAULT_RETRIES: u32 = 2;
/// Default overall conversion timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
/// Default minimum interval between progress writes.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

const BACKOFF_BASE_MS: u64 = 100;

/// Tunables of the import pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportConfig {
    /// Retries after the first failed copy, for retryable errors only
    pub retries: u32,
    /// Upper bound for the whole conversion, retries included
    pub timeout: Duration,
    /// Minimum interval between progress writes
    pub progress_interval: Duration,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// Uploaded file handed to an import.
///
/// Temporary uploads are deleted when the import finishes, whatever the
/// outcome; persistent ones (files named on the command line) are left alone.
#[derive(Debug)]
pub struct Upload {
    path: PathBuf,
    temp: Option<TempPath>,
    original_name: Option<String>,
}

impl Upload {
    /// Upload stored in a temporary file owned by the import.
    pub fn temporary(temp: TempPath, original_name: Option<String>) -> Self {
        Self {
            path: temp.to_path_buf(),
            temp: Some(temp),
            original_name,
        }
    }

    /// Upload read from a file the import must not delete.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let original_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string);
        Self {
            path,
            temp: None,
            original_name,
        }
    }

    /// Location of the uploaded bytes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Client-supplied filename, if any.
    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }

    /// Original filename without directory and extension.
    pub fn stem(&self) -> Option<String> {
        let name = self.original_name.as_deref()?;
        Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Returns true if the file is deleted when the upload is dropped.
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }
}

/// A request to import an upload into a tileset.
#[derive(Debug)]
pub struct ImportRequest {
    pub owner: String,
    /// Existing tileset to re-import; `None` creates a new one
    pub tileset_id: Option<String>,
    pub upload: Upload,
}

impl ImportRequest {
    pub fn new(owner: impl Into<String>, tileset_id: Option<String>, upload: Upload) -> Self {
        Self {
            owner: owner.into(),
            tileset_id,
            upload,
        }
    }
}

/// Errors returned before the background conversion starts.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The tileset to re-import does not exist
    #[error("Tileset {0} not found")]
    NotFound(TilesetKey),

    /// Recognised format without a converter
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Upload could not be read or recognised
    #[error(transparent)]
    Unreadable(#[from] SniffError),

    /// Container could not be extracted
    #[error(transparent)]
    Extraction(#[from] NormalizeError),

    /// Converter could not describe the source
    #[error("Failed to read source: {0}")]
    SourceInfo(#[source] ConvertError),

    /// Owner or tileset id unusable
    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// The service no longer accepts imports
    #[error("Import service is shutting down")]
    ShuttingDown,

    /// Record store failure
    #[error(transparent)]
    Store(StoreError),
}

impl ImportError {
    /// Returns true for errors caused by the request rather than the service.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::ShuttingDown)
    }
}

impl From<StoreError> for ImportError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => Self::NotFound(key),
            StoreError::InvalidIdentifier(value) => Self::InvalidIdentifier(value),
            other => Self::Store(other),
        }
    }
}

/// `"120s"` for whole seconds, `"1500ms"` otherwise.
fn format_timeout(timeout: Duration) -> String {
    if timeout.subsec_millis() == 0 && !timeout.is_zero() {
        format!("{}s", timeout.as_secs())
    } else {
        format!("{}ms", timeout.as_millis())
    }
}

/// Why a background conversion failed. Recorded as the tileset `error`.
#[derive(Debug, Error)]
pub enum ConversionFailure {
    #[error("{0}")]
    Convert(ConvertError),

    #[error("conversion timed out after {}", format_timeout(*.0))]
    Timeout(Duration),

    #[error("import cancelled")]
    Cancelled,

    /// A newer attempt started, or the record was deleted, before publishing
    #[error("import attempt {0} superseded")]
    Superseded(u64),

    #[error("{0}")]
    Archive(#[from] ArchiveError),
}

/// Final result of one import attempt.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub import_id: ImportId,
    pub key: TilesetKey,
    pub attempt: u64,
    /// Terminal stage reached
    pub stage: ImportStage,
    /// Tiles written (0 on failure)
    pub tiles: u64,
    /// Failure detail recorded on the tileset
    pub error: Option<String>,
    /// Record after the terminal write; `None` if the write did not land
    pub record: Option<Tileset>,
}

impl ImportOutcome {
    pub fn is_success(&self) -> bool {
        self.stage == ImportStage::Done
    }
}

/// Handle on an accepted import.
#[derive(Debug)]
pub struct ImportTicket {
    /// Record as returned to the client (attempt begun, `complete == false`)
    pub tileset: Tileset,
    pub import_id: ImportId,
    handle: JoinHandle<ImportOutcome>,
}

impl ImportTicket {
    /// Waits for the background conversion to finish.
    pub async fn wait(self) -> ImportOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => ImportOutcome {
                import_id: self.import_id,
                key: self.tileset.key(),
                attempt: self.tileset.attempt,
                stage: ImportStage::FailedConvert,
                tiles: 0,
                error: Some(format!("import task failed: {}", e)),
                record: None,
            },
        }
    }
}

/// Everything the background part of an attempt needs.
struct Prepared {
    record: Tileset,
    source: Source,
    converter: Arc<dyn TileConverter>,
}

struct Inner {
    store: Arc<dyn RecordStore>,
    sniffer: Arc<dyn FormatSniffer>,
    normalizer: Normalizer,
    converters: ConverterRegistry,
    catalog: ArchiveCatalog,
    registry: Arc<ImportRegistry>,
    scheduler: ImportScheduler,
    config: ImportConfig,
}

/// Drives uploads through sniffing, normalization and conversion.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ImportOrchestrator {
    inner: Arc<Inner>,
}

impl ImportOrchestrator {
    /// Starts building an orchestrator around a store and an archive catalog.
    pub fn builder(
        store: Arc<dyn RecordStore>,
        catalog: ArchiveCatalog,
    ) -> ImportOrchestratorBuilder {
        ImportOrchestratorBuilder::new(store, catalog)
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.inner.store
    }

    pub fn catalog(&self) -> &ArchiveCatalog {
        &self.inner.catalog
    }

    pub fn registry(&self) -> &Arc<ImportRegistry> {
        &self.inner.registry
    }

    pub fn scheduler(&self) -> &ImportScheduler {
        &self.inner.scheduler
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.inner.converters
    }

    pub fn config(&self) -> &ImportConfig {
        &self.inner.config
    }

    /// Accepts an upload and starts its import.
    ///
    /// Returns once the record reflects the new attempt; the conversion
    /// continues in the background. On error no background work was started,
    /// and a record created for this request has been removed again.
    pub async fn submit(&self, request: ImportRequest) -> Result<ImportTicket, ImportError> {
        if self.inner.scheduler.is_shutting_down() {
            return Err(ImportError::ShuttingDown);
        }
        let ImportRequest {
            owner,
            tileset_id,
            upload,
        } = request;

        let (record, created) = self.resolve(owner, tileset_id).await?;
        let key = record.key();
        let entry = self.inner.registry.register(key.clone());

        let prepared = match self.prepare(&entry, record, &upload).await {
            Ok(prepared) => prepared,
            Err((stage, err)) => {
                entry.advance(stage);
                if created {
                    if let Err(e) = self.inner.store.remove(&key).await {
                        warn!(
                            tileset = %key,
                            error = %e,
                            "Failed to remove record of rejected upload"
                        );
                    }
                }
                self.inner.registry.finish(entry.import_id, stage);
                info!(
                    owner = %key.owner,
                    tileset_id = %key.tileset_id,
                    stage = %stage,
                    error = %err,
                    "Upload rejected"
                );
                return Err(err);
            }
        };

        entry.advance(ImportStage::Converting);
        let tileset = prepared.record.clone();
        info!(
            owner = %key.owner,
            tileset_id = %key.tileset_id,
            attempt = tileset.attempt,
            converter = prepared.converter.name(),
            source = %prepared.source.locator(),
            "Import accepted"
        );

        let import_id = entry.import_id;
        let handle = self
            .inner
            .scheduler
            .spawn(self.clone().run_conversion(entry, prepared, upload));
        Ok(ImportTicket {
            tileset,
            import_id,
            handle,
        })
    }

    /// Pending: loads the tileset to re-import, or creates a new one.
    async fn resolve(
        &self,
        owner: String,
        tileset_id: Option<String>,
    ) -> Result<(Tileset, bool), ImportError> {
        if !is_valid_identifier(&owner) {
            return Err(ImportError::InvalidIdentifier(owner));
        }
        match tileset_id {
            Some(id) => {
                if !is_valid_identifier(&id) {
                    return Err(ImportError::InvalidIdentifier(id));
                }
                let key = TilesetKey::new(owner, id);
                let record = self
                    .inner
                    .store
                    .find(&key)
                    .await?
                    .ok_or(ImportError::NotFound(key))?;
                Ok((record, false))
            }
            None => {
                let record = self.inner.store.insert(Tileset::new(owner)).await?;
                debug!(tileset = %record.key(), "Created tileset record");
                Ok((record, true))
            }
        }
    }

    /// Sniffing through the start of the attempt in the store.
    async fn prepare(
        &self,
        entry: &ActiveImport,
        record: Tileset,
        upload: &Upload,
    ) -> Result<Prepared, (ImportStage, ImportError)> {
        let failed = |e: ImportError| (ImportStage::FailedSniff, e);
        entry.advance(ImportStage::Sniffing);

        let info = self
            .inner
            .sniffer
            .classify(upload.path())
            .await
            .map_err(|e| failed(e.into()))?;
        let converter = self.converter_for(&info.protocol).ok_or_else(|| {
            (
                ImportStage::Unsupported,
                ImportError::UnsupportedFormat(info.protocol.scheme().to_string()),
            )
        })?;
        debug!(
            tileset = %entry.key,
            protocol = %info.protocol,
            kind = %info.kind,
            "Upload classified"
        );

        let source = self
            .inner
            .normalizer
            .normalize(upload.path(), &info)
            .await
            .map_err(|e| failed(e.into()))?;
        let source_info = converter
            .info(source.locator())
            .await
            .map_err(|e| failed(ImportError::SourceInfo(e)))?;

        let name = match record.name {
            Some(_) => None,
            None => source_info.name.clone().or_else(|| upload.stem()),
        };
        let description = match record.description {
            Some(_) => None,
            None => source_info.description.clone(),
        };
        let record = self
            .inner
            .store
            .update(&record.key(), TilesetPatch::begin_attempt(name, description))
            .await
            .map_err(|e| failed(e.into()))?;
        entry.set_attempt(record.attempt);

        Ok(Prepared {
            record,
            source,
            converter,
        })
    }

    fn converter_for(&self, protocol: &Protocol) -> Option<Arc<dyn TileConverter>> {
        match protocol {
            Protocol::Other(_) => None,
            known => self.inner.converters.get(known),
        }
    }

    /// Converting through Done: runs detached on the scheduler.
    async fn run_conversion(
        self,
        entry: Arc<ActiveImport>,
        prepared: Prepared,
        upload: Upload,
    ) -> ImportOutcome {
        let key = entry.key.clone();
        let attempt = prepared.record.attempt;
        let shutdown = self.inner.scheduler.shutdown_token();

        let lock = self.inner.registry.destination_lock(&key);
        let guard = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            guard = lock.lock_owned() => Some(guard),
        };

        let (reporter, sink) = ProgressReporter::spawn(
            Arc::clone(&self.inner.store),
            key.clone(),
            attempt,
            self.inner.config.progress_interval,
        );

        let result = match &guard {
            Some(_) => self.convert(&key, &prepared, sink, shutdown.child_token()).await,
            None => Err(ConversionFailure::Cancelled),
        };

        let result = match result {
            Ok(stats) if !self.is_current_attempt(&key, attempt).await => {
                Err(ConversionFailure::Superseded(attempt))
            }
            other => other,
        };
        let result: Result<CopyStats, ConversionFailure> = match result {
            Ok(stats) => match self.inner.catalog.publish(&key).await {
                Ok(_) => Ok(stats),
                Err(e) => Err(e.into()),
            },
            Err(failure) => {
                if let Err(e) = self.inner.catalog.discard_partial(&key).await {
                    warn!(tileset = %key, error = %e, "Failed to discard partial archive");
                }
                Err(failure)
            }
        };

        let (stage, tiles, error) = match result {
            Ok(stats) => (ImportStage::Done, stats.tiles, None),
            Err(failure) => (ImportStage::FailedConvert, 0, Some(failure.to_string())),
        };
        entry.advance(stage);

        let record = match reporter.finish(error.clone()).await {
            Ok(finished) => Some(finished.record),
            Err(e) if e.is_not_found() => {
                warn!(tileset = %key, attempt, "Tileset deleted during import; removing archive");
                if let Err(e) = self.inner.catalog.remove(&key).await {
                    warn!(tileset = %key, error = %e, "Failed to remove orphaned archive");
                }
                None
            }
            Err(e) => {
                warn!(tileset = %key, attempt, error = %e, "Terminal import update not applied");
                None
            }
        };
        drop(guard);
        drop(prepared);
        drop(upload);
        self.inner.registry.finish(entry.import_id, stage);

        match &error {
            None => info!(
                owner = %key.owner,
                tileset_id = %key.tileset_id,
                attempt,
                tiles,
                elapsed_ms = entry.elapsed().as_millis(),
                "Import complete"
            ),
            Some(error) => warn!(
                owner = %key.owner,
                tileset_id = %key.tileset_id,
                attempt,
                error = %error,
                "Import failed"
            ),
        }

        ImportOutcome {
            import_id: entry.import_id,
            key,
            attempt,
            stage,
            tiles,
            error,
            record,
        }
    }

    /// False once the record has been deleted or has begun a newer attempt.
    async fn is_current_attempt(&self, key: &TilesetKey, attempt: u64) -> bool {
        match self.inner.store.find(key).await {
            Ok(Some(record)) => record.attempt == attempt,
            Ok(None) => false,
            Err(e) => {
                warn!(
                    tileset = %key,
                    attempt,
                    error = %e,
                    "Cannot check attempt before publishing"
                );
                true
            }
        }
    }

    /// Copies into the partial archive, bounded by the overall timeout.
    async fn convert(
        &self,
        key: &TilesetKey,
        prepared: &Prepared,
        sink: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<CopyStats, ConversionFailure> {
        let partial = self.inner.catalog.prepare(key).await?;
        let timeout = self.inner.config.timeout;

        let mut copy = std::pin::pin!(self.copy_with_retry(prepared, &partial, sink, &cancel));
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let stopped = tokio::select! {
            biased;
            result = &mut copy => return result,
            _ = cancel.cancelled() => ConversionFailure::Cancelled,
            _ = &mut deadline => ConversionFailure::Timeout(timeout),
        };

        // Converters may still be writing the partial archive from a blocking
        // thread. The destination lock is held until they have returned.
        cancel.cancel();
        let drained = copy.await;
        debug!(
            tileset = %key,
            reason = %stopped,
            converter_result = ?drained.map(|stats| stats.tiles),
            "Converter stopped"
        );
        Err(stopped)
    }

    async fn copy_with_retry(
        &self,
        prepared: &Prepared,
        partial: &Path,
        sink: ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<CopyStats, ConversionFailure> {
        let locator: &SourceLocator = prepared.source.locator();
        let max_retries = self.inner.config.retries;
        let mut retry = 0u32;

        loop {
            let result = prepared
                .converter
                .copy(locator, partial, sink.clone(), cancel.clone())
                .await;
            let err = match result {
                Ok(stats) => return Ok(stats),
                Err(_) if cancel.is_cancelled() => return Err(ConversionFailure::Cancelled),
                Err(e) => e,
            };
            if !err.is_retryable || retry >= max_retries {
                return Err(ConversionFailure::Convert(err));
            }

            let backoff = Duration::from_millis(BACKOFF_BASE_MS << retry.min(16));
            warn!(
                tileset = %prepared.record.key(),
                retry = retry + 1,
                max_retries,
                backoff_ms = backoff.as_millis(),
                error = %err,
                "Conversion failed, retrying"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ConversionFailure::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
            retry += 1;
        }
    }

    /// Stops accepting imports, cancels running ones and waits for their
    /// terminal writes.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.inner.scheduler.shutdown(grace).await
    }
}

/// Builder for [`ImportOrchestrator`].
pub struct ImportOrchestratorBuilder {
    store: Arc<dyn RecordStore>,
    catalog: ArchiveCatalog,
    sniffer: Option<Arc<dyn FormatSniffer>>,
    normalizer: Option<Normalizer>,
    converters: Option<ConverterRegistry>,
    registry: Option<Arc<ImportRegistry>>,
    scheduler: Option<ImportScheduler>,
    config: ImportConfig,
}

impl ImportOrchestratorBuilder {
    fn new(store: Arc<dyn RecordStore>, catalog: ArchiveCatalog) -> Self {
        Self {
            store,
            catalog,
            sniffer: None,
            normalizer: None,
            converters: None,
            registry: None,
            scheduler: None,
            config: ImportConfig::default(),
        }
    }

    pub fn sniffer(mut self, sniffer: Arc<dyn FormatSniffer>) -> Self {
        self.sniffer = Some(sniffer);
        self
    }

    pub fn normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = Some(converters);
        self
    }

    pub fn registry(mut self, registry: Arc<ImportRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn scheduler(mut self, scheduler: ImportScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn config(mut self, config: ImportConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the orchestrator.
    ///
    /// Defaults: [`MagicSniffer`], staging under `<catalog root>/.staging`,
    /// and only the MBTiles passthrough converter.
    pub fn build(self) -> ImportOrchestrator {
        let normalizer = self
            .normalizer
            .unwrap_or_else(|| Normalizer::new(self.catalog.root().join(".staging")));
        let converters = self.converters.unwrap_or_else(|| {
            ConverterRegistry::new().with(Protocol::MbTiles, Arc::new(MbTilesConverter::new()))
        });

        ImportOrchestrator {
            inner: Arc::new(Inner {
                store: self.store,
                sniffer: self
                    .sniffer
                    .unwrap_or_else(|| Arc::new(MagicSniffer::new())),
                normalizer,
                converters,
                catalog: self.catalog,
                registry: self.registry.unwrap_or_default(),
                scheduler: self.scheduler.unwrap_or_default(),
                config: self.config,
            }),
        }
    }
}
