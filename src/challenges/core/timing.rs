//! Fixed settle pauses.
//!
//! The portal renders client-side and exposes no completion signal, so the
//! retrieval flow waits a fixed interval after each page transition.

use std::fmt;
use std::time::Duration;

use tokio::time::sleep;

/// Transition after which a pause is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseKind {
    AfterNavigation,
    AfterRecovery,
    AfterSubmit,
    BetweenIdentifiers,
}

impl fmt::Display for PauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PauseKind::AfterNavigation => "after navigation",
            PauseKind::AfterRecovery => "after recovery",
            PauseKind::AfterSubmit => "after submit",
            PauseKind::BetweenIdentifiers => "between identifiers",
        };
        f.write_str(label)
    }
}

/// Durations used for every [`PauseKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseSchedule {
    pub after_navigation: Duration,
    pub after_recovery: Duration,
    pub after_submit: Duration,
    pub between_identifiers: Duration,
}

impl PauseSchedule {
    /// Schedule with every pause disabled.
    pub const fn none() -> Self {
        Self {
            after_navigation: Duration::ZERO,
            after_recovery: Duration::ZERO,
            after_submit: Duration::ZERO,
            between_identifiers: Duration::ZERO,
        }
    }

    pub fn with_after_navigation(mut self, duration: Duration) -> Self {
        self.after_navigation = duration;
        self
    }

    pub fn with_after_recovery(mut self, duration: Duration) -> Self {
        self.after_recovery = duration;
        self
    }

    pub fn with_after_submit(mut self, duration: Duration) -> Self {
        self.after_submit = duration;
        self
    }

    pub fn with_between_identifiers(mut self, duration: Duration) -> Self {
        self.between_identifiers = duration;
        self
    }

    pub fn duration(&self, kind: PauseKind) -> Duration {
        match kind {
            PauseKind::AfterNavigation => self.after_navigation,
            PauseKind::AfterRecovery => self.after_recovery,
            PauseKind::AfterSubmit => self.after_submit,
            PauseKind::BetweenIdentifiers => self.between_identifiers,
        }
    }

    /// Sleep for the configured duration of `kind`. Zero durations return
    /// immediately without yielding to the timer.
    pub async fn wait(&self, kind: PauseKind) {
        let duration = self.duration(kind);
        if duration.is_zero() {
            return;
        }
        log::debug!("waiting {:.1}s ({kind})", duration.as_secs_f64());
        sleep(duration).await;
    }
}

impl Default for PauseSchedule {
    fn default() -> Self {
        Self {
            after_navigation: Duration::from_secs(2),
            after_recovery: Duration::from_secs(2),
            after_submit: Duration::from_secs(3),
            between_identifiers: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_matches_portal_timings() {
        let schedule = PauseSchedule::default();
        assert_eq!(schedule.duration(PauseKind::AfterNavigation), Duration::from_secs(2));
        assert_eq!(schedule.duration(PauseKind::AfterSubmit), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn zero_schedule_does_not_sleep() {
        let schedule = PauseSchedule::none().with_after_submit(Duration::ZERO);
        let started = std::time::Instant::now();
        schedule.wait(PauseKind::AfterSubmit).await;
        assert!(started.elapsed() < Duration::from_millis(50));
    }
}
