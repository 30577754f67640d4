//! Run statistics.
//!
//! Counts attempts, solver outcomes and record statuses over one batch so the
//! run can end with a short summary.

use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Aggregated counters for one run.
#[derive(Debug, Clone)]
pub struct RunStats {
    pub started_at: DateTime<Local>,
    pub attempts: u64,
    pub challenges_solved: u64,
    pub solver_exhausted: u64,
    pub answers_accepted: u64,
    pub answers_rejected: u64,
    pub identifiers_exhausted: u64,
    pub identifiers_errored: u64,
    pub records_by_status: BTreeMap<String, u64>,
}

impl Default for RunStats {
    fn default() -> Self {
        Self {
            started_at: Local::now(),
            attempts: 0,
            challenges_solved: 0,
            solver_exhausted: 0,
            answers_accepted: 0,
            answers_rejected: 0,
            identifiers_exhausted: 0,
            identifiers_errored: 0,
            records_by_status: BTreeMap::new(),
        }
    }
}

impl RunStats {
    pub fn total_records(&self) -> u64 {
        self.records_by_status.values().sum()
    }

    /// Share of submitted answers the portal accepted.
    pub fn acceptance_rate(&self) -> Option<f64> {
        let submitted = self.answers_accepted + self.answers_rejected;
        (submitted > 0).then(|| self.answers_accepted as f64 / submitted as f64)
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempt(s), {} solved, {} unsolved, {}/{} answers accepted",
            self.attempts,
            self.challenges_solved,
            self.solver_exhausted,
            self.answers_accepted,
            self.answers_accepted + self.answers_rejected,
        )?;
        if let Some(rate) = self.acceptance_rate() {
            write!(f, " ({:.0}%)", rate * 100.0)?;
        }
        if !self.records_by_status.is_empty() {
            let statuses = self
                .records_by_status
                .iter()
                .map(|(status, count)| format!("{status}={count}"))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "; records: {statuses}")?;
        }
        Ok(())
    }
}

/// Thread-safe statistics collector shared with event handlers.
#[derive(Clone, Debug, Default)]
pub struct StatsCollector {
    inner: Arc<Mutex<RunStats>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, apply: impl FnOnce(&mut RunStats)) {
        let mut guard = self.inner.lock().expect("stats lock poisoned");
        apply(&mut guard);
    }

    pub fn record_attempt(&self) {
        self.update(|stats| stats.attempts += 1);
    }

    pub fn record_solve(&self, solved: bool) {
        self.update(|stats| {
            if solved {
                stats.challenges_solved += 1;
            } else {
                stats.solver_exhausted += 1;
            }
        });
    }

    pub fn record_submission(&self, accepted: bool) {
        self.update(|stats| {
            if accepted {
                stats.answers_accepted += 1;
            } else {
                stats.answers_rejected += 1;
            }
        });
    }

    pub fn record_exhausted(&self) {
        self.update(|stats| stats.identifiers_exhausted += 1);
    }

    pub fn record_error(&self) {
        self.update(|stats| stats.identifiers_errored += 1);
    }

    pub fn record_status(&self, status: &str) {
        // Collapse every "ERROR: <message>" row into one bucket.
        let bucket = if status.starts_with("ERROR") { "ERROR" } else { status };
        self.update(|stats| {
            *stats.records_by_status.entry(bucket.to_string()).or_default() += 1;
        });
    }

    pub fn snapshot(&self) -> RunStats {
        self.inner.lock().expect("stats lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_submissions_and_statuses() {
        let stats = StatsCollector::new();
        stats.record_attempt();
        stats.record_attempt();
        stats.record_solve(true);
        stats.record_solve(false);
        stats.record_submission(false);
        stats.record_submission(true);
        stats.record_status("Activo");
        stats.record_status("ERROR: boom");
        stats.record_status("ERROR: other");

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.attempts, 2);
        assert_eq!(snapshot.acceptance_rate(), Some(0.5));
        assert_eq!(snapshot.records_by_status.get("ERROR"), Some(&2));
        assert_eq!(snapshot.total_records(), 3);
        let summary = snapshot.to_string();
        assert!(summary.starts_with("2 attempt(s), 1 solved, 1 unsolved, 1/2 answers accepted (50%)"));
        assert!(summary.ends_with("records: Activo=1, ERROR=2"));
    }

    #[test]
    fn empty_run_has_no_acceptance_rate() {
        assert_eq!(RunStats::default().acceptance_rate(), None);
    }
}
