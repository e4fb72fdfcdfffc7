use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::error::AuthFailure;

type StatusCounts = HashMap<u16, u64>;

/// Minutes of history kept per subject.
pub const RETENTION_MINUTES: u64 = 60;

/// In-memory per-minute response status counts keyed by subject.
///
/// Only the last [`RETENTION_MINUTES`] minutes are kept per subject.
///
/// A subject is the authenticated username, or a failure label such as
/// `<no_match>` when the request never resolved to an account. Raw keys
/// are never used as subjects.
#[derive(Default)]
pub struct Metrics {
    counts: Mutex<HashMap<String, HashMap<u64, StatusCounts>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a status code for `subject` at the current wall-clock time.
    pub fn record(&self, subject: &str, status: u16) {
        self.record_at(subject, status, SystemTime::now());
    }

    /// Record a rejected request under its failure label.
    pub fn record_failure(&self, reason: AuthFailure, status: u16) {
        self.record(reason.label(), status);
    }

    /// Record a status code at a provided time (useful for tests).
    pub fn record_at(&self, subject: &str, status: u16, at: SystemTime) {
        let minute = Self::minute_bucket(at);
        let Ok(mut guard) = self.counts.lock() else {
            log::error!("metrics store poisoned; dropping sample");
            return;
        };
        let per_subject = guard.entry(subject.to_string()).or_default();
        *per_subject
            .entry(minute)
            .or_default()
            .entry(status)
            .or_insert(0) += 1;

        let newest = per_subject.keys().copied().max().unwrap_or(minute);
        per_subject.retain(|bucket, _| bucket + RETENTION_MINUTES > newest);
    }

    /// Snapshot counts for a subject. Empty when the subject is unknown.
    pub fn snapshot(&self, subject: &str) -> HashMap<u64, StatusCounts> {
        self.counts
            .lock()
            .ok()
            .and_then(|guard| guard.get(subject).cloned())
            .unwrap_or_default()
    }

    /// Counts for a subject summed over all minutes.
    pub fn totals(&self, subject: &str) -> StatusCounts {
        let mut totals = StatusCounts::new();
        for minute in self.snapshot(subject).values() {
            for (status, count) in minute {
                *totals.entry(*status).or_insert(0) += count;
            }
        }
        totals
    }

    fn minute_bucket(at: SystemTime) -> u64 {
        at.duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs()
            / 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minute_bucket_groups_by_60_seconds() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(59);
        let t1 = SystemTime::UNIX_EPOCH + Duration::from_secs(60);
        assert_eq!(Metrics::minute_bucket(t0), 0);
        assert_eq!(Metrics::minute_bucket(t1), 1);
    }

    #[test]
    fn record_and_total_per_subject() {
        let metrics = Metrics::new();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(5);
        let t1 = SystemTime::UNIX_EPOCH + Duration::from_secs(65);

        metrics.record_at("alice", 200, t0);
        metrics.record_at("alice", 404, t0);
        metrics.record_at("alice", 200, t1);
        metrics.record_at("bob", 200, t1);

        let snap = metrics.snapshot("alice");
        assert_eq!(snap.len(), 2);

        let totals = metrics.totals("alice");
        assert_eq!(totals.get(&200), Some(&2));
        assert_eq!(totals.get(&404), Some(&1));
        assert_eq!(metrics.totals("bob").get(&200), Some(&1));
    }

    #[test]
    fn failures_are_recorded_under_labels() {
        let metrics = Metrics::new();
        metrics.record_failure(AuthFailure::Missing, 401);
        metrics.record_failure(AuthFailure::NoMatch, 401);
        metrics.record_failure(AuthFailure::NoMatch, 401);

        assert_eq!(metrics.totals("<missing>").get(&401), Some(&1));
        assert_eq!(metrics.totals("<no_match>").get(&401), Some(&2));
        assert!(metrics.snapshot("<malformed>").is_empty());
    }

    #[test]
    fn old_minutes_are_evicted() {
        let metrics = Metrics::new();
        let minute = |m: u64| SystemTime::UNIX_EPOCH + Duration::from_secs(m * 60);

        metrics.record_at("alice", 200, minute(0));
        metrics.record_at("alice", 200, minute(RETENTION_MINUTES - 1));
        assert_eq!(metrics.snapshot("alice").len(), 2);

        metrics.record_at("alice", 500, minute(RETENTION_MINUTES));
        let snap = metrics.snapshot("alice");
        assert_eq!(snap.len(), 2);
        assert!(!snap.contains_key(&0));

        // A late sample older than the window is dropped straight away
        metrics.record_at("alice", 200, minute(0));
        assert!(!metrics.snapshot("alice").contains_key(&0));
        assert_eq!(metrics.totals("alice").get(&500), Some(&1));
    }
}
