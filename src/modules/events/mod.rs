//! Event system for the lookup lifecycle.
//!
//! The retrieval state machine and the batch orchestrator publish events;
//! handlers turn them into console logs, run-log lines and run statistics.

use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;

use super::metrics::StatsCollector;

/// Processing of one input row is starting.
#[derive(Debug, Clone)]
pub struct IdentifierEvent {
    pub identifier: String,
    /// 1-based row position in the input list.
    pub position: usize,
    pub timestamp: DateTime<Local>,
}

/// Processing of one identifier finished, successfully or not.
#[derive(Debug, Clone)]
pub struct CompletedEvent {
    pub identifier: String,
    pub records: usize,
    pub timestamp: DateTime<Local>,
}

/// One attempt of the retrieval loop is starting.
#[derive(Debug, Clone)]
pub struct AttemptEvent {
    pub identifier: String,
    pub attempt: usize,
    pub max_attempts: usize,
    pub timestamp: DateTime<Local>,
}

/// A challenge image was captured (and possibly archived).
#[derive(Debug, Clone)]
pub struct CaptureEvent {
    pub identifier: String,
    pub attempt: usize,
    pub bytes: usize,
    pub archived_at: Option<PathBuf>,
    pub timestamp: DateTime<Local>,
}

/// The solver produced an answer, or gave up.
#[derive(Debug, Clone)]
pub struct SolveEvent {
    pub identifier: String,
    pub attempt: usize,
    pub answer: Option<String>,
    pub timestamp: DateTime<Local>,
}

/// Outcome of a submitted form.
#[derive(Debug, Clone)]
pub struct SubmissionEvent {
    pub identifier: String,
    pub attempt: usize,
    pub accepted: bool,
    pub timestamp: DateTime<Local>,
}

/// Recoverable problem that ends the current attempt.
#[derive(Debug, Clone)]
pub struct WarningEvent {
    pub identifier: String,
    pub attempt: usize,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

/// Every attempt for an identifier failed.
#[derive(Debug, Clone)]
pub struct ExhaustedEvent {
    pub identifier: String,
    pub attempts: usize,
    pub timestamp: DateTime<Local>,
}

/// Extracted record, summarised for progress output.
#[derive(Debug, Clone)]
pub struct RecordEvent {
    pub identifier: String,
    pub serial: String,
    pub status: String,
    pub timestamp: DateTime<Local>,
}

/// Unexpected failure while processing one identifier.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub identifier: String,
    pub error: String,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Clone)]
pub enum LookupEvent {
    Identifier(IdentifierEvent),
    Attempt(AttemptEvent),
    Capture(CaptureEvent),
    Solve(SolveEvent),
    Submission(SubmissionEvent),
    Warning(WarningEvent),
    Exhausted(ExhaustedEvent),
    Record(RecordEvent),
    Error(ErrorEvent),
    Completed(CompletedEvent),
}

impl LookupEvent {
    /// Status glyph printed next to extracted records.
    pub fn record_glyph(status: &str) -> &'static str {
        if status == "Activo" { "✓" } else { "○" }
    }

    /// Human-readable line used by the console and the run log. `None` for
    /// events that are only interesting at debug level.
    pub fn describe(&self) -> Option<String> {
        match self {
            LookupEvent::Identifier(event) => {
                Some(format!("[{}] {}", event.position, event.identifier))
            }
            LookupEvent::Attempt(event) if event.attempt > 1 => Some(format!(
                "  Retry {}/{}...",
                event.attempt - 1,
                event.max_attempts.saturating_sub(1)
            )),
            LookupEvent::Attempt(_) | LookupEvent::Capture(_) => None,
            LookupEvent::Solve(event) => Some(match &event.answer {
                Some(answer) => format!("  Solution: {answer}"),
                None => "  Warning: Captcha could not be solved".to_string(),
            }),
            LookupEvent::Submission(event) => Some(if event.accepted {
                "  ✓ Success".to_string()
            } else {
                "  ✗ Captcha incorrect".to_string()
            }),
            LookupEvent::Warning(event) => Some(format!("  Warning: {}", event.message)),
            LookupEvent::Exhausted(event) => Some(format!(
                "{}: All {} captcha attempts failed",
                event.identifier, event.attempts
            )),
            LookupEvent::Record(event) => Some(format!(
                "    {} {} - {}",
                Self::record_glyph(&event.status),
                event.serial,
                event.status
            )),
            LookupEvent::Error(event) => Some(format!("{}: {}", event.identifier, event.error)),
            // Blank separator between identifiers.
            LookupEvent::Completed(_) => Some(String::new()),
        }
    }

    /// Whether the event belongs in the error channel.
    pub fn is_error(&self) -> bool {
        matches!(self, LookupEvent::Exhausted(_) | LookupEvent::Error(_))
    }
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &LookupEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: LookupEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &LookupEvent) {
        match event {
            LookupEvent::Attempt(attempt) => {
                log::debug!(
                    "{} attempt {}/{}",
                    attempt.identifier,
                    attempt.attempt,
                    attempt.max_attempts
                );
            }
            LookupEvent::Capture(capture) => {
                log::debug!(
                    "{} attempt {} captured {} bytes",
                    capture.identifier,
                    capture.attempt,
                    capture.bytes
                );
            }
            _ => {}
        }

        let Some(line) = event.describe() else {
            return;
        };
        match event {
            LookupEvent::Warning(_) | LookupEvent::Solve(SolveEvent { answer: None, .. }) => {
                log::warn!("{line}")
            }
            _ if event.is_error() => log::error!("{line}"),
            _ => log::info!("{line}"),
        }
    }
}

/// Feeds the statistics collector.
#[derive(Clone, Debug)]
pub struct StatsHandler {
    stats: StatsCollector,
}

impl StatsHandler {
    pub fn new(stats: StatsCollector) -> Self {
        Self { stats }
    }
}

impl EventHandler for StatsHandler {
    fn handle(&self, event: &LookupEvent) {
        match event {
            LookupEvent::Attempt(_) => self.stats.record_attempt(),
            LookupEvent::Solve(solve) => self.stats.record_solve(solve.answer.is_some()),
            LookupEvent::Submission(submission) => {
                self.stats.record_submission(submission.accepted)
            }
            LookupEvent::Exhausted(_) => self.stats.record_exhausted(),
            LookupEvent::Record(record) => self.stats.record_status(&record.status),
            LookupEvent::Error(_) => self.stats.record_error(),
            LookupEvent::Identifier(_)
            | LookupEvent::Capture(_)
            | LookupEvent::Warning(_)
            | LookupEvent::Completed(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingHandler(std::sync::Mutex<usize>);

    impl EventHandler for CountingHandler {
        fn handle(&self, _event: &LookupEvent) {
            *self.0.lock().unwrap() += 1;
        }
    }

    fn warning(message: &str) -> LookupEvent {
        LookupEvent::Warning(WarningEvent {
            identifier: "ABC010101AAA".into(),
            attempt: 1,
            message: message.into(),
            timestamp: Local::now(),
        })
    }

    #[test]
    fn dispatches_to_handlers() {
        let mut dispatcher = EventDispatcher::new();
        let counter = Arc::new(CountingHandler(std::sync::Mutex::new(0)));
        dispatcher.register_handler(counter.clone());
        dispatcher.register_handler(Arc::new(LoggingHandler));
        dispatcher.dispatch(warning("No captcha found"));
        assert_eq!(*counter.0.lock().unwrap(), 1);
    }

    #[test]
    fn first_attempt_is_silent_and_retries_are_numbered() {
        let attempt = |n| {
            LookupEvent::Attempt(AttemptEvent {
                identifier: "X".into(),
                attempt: n,
                max_attempts: 5,
                timestamp: Local::now(),
            })
        };
        assert_eq!(attempt(1).describe(), None);
        assert_eq!(attempt(2).describe().as_deref(), Some("  Retry 1/4..."));
        assert_eq!(attempt(5).describe().as_deref(), Some("  Retry 4/4..."));
    }

    #[test]
    fn record_lines_use_status_glyph() {
        let record = |status: &str| {
            LookupEvent::Record(RecordEvent {
                identifier: "X".into(),
                serial: "00001000000500000001".into(),
                status: status.into(),
                timestamp: Local::now(),
            })
        };
        assert_eq!(
            record("Activo").describe().as_deref(),
            Some("    ✓ 00001000000500000001 - Activo")
        );
        assert!(record("Revocado").describe().unwrap().contains('○'));
        assert_eq!(warning("x").describe().as_deref(), Some("  Warning: x"));
    }

    #[test]
    fn identifier_sections_are_numbered_and_separated() {
        let started = LookupEvent::Identifier(IdentifierEvent {
            identifier: "ABC010101AAA".into(),
            position: 3,
            timestamp: Local::now(),
        });
        let completed = LookupEvent::Completed(CompletedEvent {
            identifier: "ABC010101AAA".into(),
            records: 1,
            timestamp: Local::now(),
        });
        assert_eq!(started.describe().as_deref(), Some("[3] ABC010101AAA"));
        assert_eq!(completed.describe().as_deref(), Some(""));
        assert!(!completed.is_error());
    }
}
