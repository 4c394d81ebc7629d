//! Asynchronous tileset import.
//!
//! An import turns an uploaded file into a published MBTiles archive:
//!
//! ```text
//! Pending ──► Sniffing ──► Converting ──► Done
//!                │  │           │
//!                │  └► Unsupported
//!                └► FailedSniff └► FailedConvert
//! ```
//!
//! Everything up to and including the start of a new attempt in the record
//! store runs while the client waits ([`ImportOrchestrator::submit`]). The
//! conversion itself runs on the [`ImportScheduler`] and reports progress
//! through a [`ProgressReporter`].

mod orchestrator;
mod progress;
mod registry;
mod scheduler;
mod stage;

pub use orchestrator::{
    ConversionFailure, ImportConfig, ImportError, ImportOrchestrator, ImportOrchestratorBuilder,
    ImportOutcome, ImportRequest, ImportTicket, Upload,
};
pub use progress::{
    FinishedAttempt, ProgressEvent, ProgressReporter, ProgressSink, ProgressThrottle,
    MAX_RUNNING_PROGRESS,
};
pub use registry::{ActiveImport, ImportId, ImportRegistry, ImportStats};
pub use scheduler::ImportScheduler;
pub use stage::ImportStage;
