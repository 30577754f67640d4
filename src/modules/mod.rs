//! Cross-cutting services for a batch run.
//!
//! Lifecycle events, run statistics and the on-disk run record.

pub mod events;
pub mod metrics;
pub mod run_record;

// Re-export commonly used types
pub use events::{
    AttemptEvent, CaptureEvent, CompletedEvent, ErrorEvent, EventDispatcher, EventHandler,
    ExhaustedEvent, IdentifierEvent, LoggingHandler, LookupEvent, RecordEvent, SolveEvent,
    StatsHandler, SubmissionEvent, WarningEvent,
};
pub use metrics::{RunStats, StatsCollector};
pub use run_record::{RunLog, RunRecord, RunRecordError};
