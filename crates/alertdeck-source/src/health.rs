//! Per-source success/failure bookkeeping and the exponential backoff gate.

use alertdeck_common::types::{SourceHealth, SourceKind};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

const BACKOFF_BASE_SECS: u64 = 30;
const BACKOFF_CAP_SECS: u64 = 900;

/// One health entry as returned by [`HealthTracker::list`].
#[derive(Debug, Clone)]
pub struct HealthEntry {
    pub kind: SourceKind,
    pub source_id: String,
    pub health: SourceHealth,
}

/// Shared, keyed health state for all configured sources.
///
/// Rows are created lazily on the first recorded attempt and never deleted;
/// a row that stops succeeding is the staleness signal. Writes for different
/// sources never contend on row state; writes for the same source serialize
/// through the map lock.
#[derive(Default)]
pub struct HealthTracker {
    rows: RwLock<HashMap<(SourceKind, String), SourceHealth>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the failure streak and the backoff window.
    pub fn record_success(&self, kind: SourceKind, source_id: &str) {
        let mut rows = self.rows.write().expect("health lock poisoned");
        let row = rows.entry((kind, source_id.to_string())).or_default();
        row.fail_count = 0;
        row.last_success_at = Some(Utc::now());
        row.next_retry_at = None;
    }

    /// Increments the failure streak and schedules the next retry window.
    pub fn record_failure(&self, kind: SourceKind, source_id: &str, message: &str) {
        let now = Utc::now();
        let mut rows = self.rows.write().expect("health lock poisoned");
        let row = rows.entry((kind, source_id.to_string())).or_default();
        row.fail_count += 1;
        row.last_error_at = Some(now);
        row.last_error_message = Some(message.to_string());
        row.next_retry_at = Some(now + Duration::seconds(backoff_secs(row.fail_count) as i64));
    }

    /// Returns the end of the backoff window iff the source is still inside
    /// it.
    pub fn backoff_until(&self, kind: SourceKind, source_id: &str) -> Option<DateTime<Utc>> {
        let rows = self.rows.read().expect("health lock poisoned");
        rows.get(&(kind, source_id.to_string()))
            .and_then(|row| row.next_retry_at)
            .filter(|until| *until > Utc::now())
    }

    pub fn get(&self, kind: SourceKind, source_id: &str) -> Option<SourceHealth> {
        let rows = self.rows.read().expect("health lock poisoned");
        rows.get(&(kind, source_id.to_string())).cloned()
    }

    pub fn list(&self) -> Vec<HealthEntry> {
        let rows = self.rows.read().expect("health lock poisoned");
        let mut entries: Vec<HealthEntry> = rows
            .iter()
            .map(|((kind, source_id), health)| HealthEntry {
                kind: *kind,
                source_id: source_id.clone(),
                health: health.clone(),
            })
            .collect();
        entries.sort_by(|a, b| (a.kind.to_string(), &a.source_id).cmp(&(b.kind.to_string(), &b.source_id)));
        entries
    }
}

/// Doubles per consecutive failure, capped: 30s, 60s, 120s, ... 900s.
fn backoff_secs(fail_count: u32) -> u64 {
    let exponent = fail_count.saturating_sub(1).min(10);
    (BACKOFF_BASE_SECS << exponent).min(BACKOFF_CAP_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_monotonically_and_caps() {
        let mut previous = 0;
        for fail_count in 1..=12 {
            let secs = backoff_secs(fail_count);
            assert!(secs >= previous, "backoff must be non-decreasing");
            assert!(secs <= BACKOFF_CAP_SECS);
            previous = secs;
        }
        assert_eq!(backoff_secs(1), 30);
        assert_eq!(backoff_secs(2), 60);
        assert_eq!(backoff_secs(6), BACKOFF_CAP_SECS);
    }

    #[test]
    fn failure_sets_backoff_and_success_clears_it() {
        let tracker = HealthTracker::new();
        let kind = SourceKind::MetricsAlerting;

        assert!(tracker.backoff_until(kind, "m1").is_none());
        assert!(tracker.get(kind, "m1").is_none());

        tracker.record_failure(kind, "m1", "connection refused");
        let health = tracker.get(kind, "m1").unwrap();
        assert_eq!(health.fail_count, 1);
        assert_eq!(health.last_error_message.as_deref(), Some("connection refused"));
        let until = tracker.backoff_until(kind, "m1").expect("should be in backoff");
        assert!(until > Utc::now());

        tracker.record_success(kind, "m1");
        let health = tracker.get(kind, "m1").unwrap();
        assert_eq!(health.fail_count, 0);
        assert!(health.next_retry_at.is_none());
        assert!(health.last_success_at.is_some());
        assert!(tracker.backoff_until(kind, "m1").is_none());
    }

    #[test]
    fn consecutive_failures_push_retry_further_out() {
        let tracker = HealthTracker::new();
        let kind = SourceKind::TriggerSystem;

        tracker.record_failure(kind, "t1", "boom");
        let first = tracker.get(kind, "t1").unwrap().next_retry_at.unwrap();
        tracker.record_failure(kind, "t1", "boom");
        let second = tracker.get(kind, "t1").unwrap().next_retry_at.unwrap();
        tracker.record_failure(kind, "t1", "boom");
        let third = tracker.get(kind, "t1").unwrap().next_retry_at.unwrap();

        assert!(second > first);
        assert!(third > second);
        assert_eq!(tracker.get(kind, "t1").unwrap().fail_count, 3);
    }

    #[test]
    fn rows_are_keyed_per_source() {
        let tracker = HealthTracker::new();
        tracker.record_failure(SourceKind::UptimeCheck, "u1", "down");
        tracker.record_success(SourceKind::UptimeCheck, "u2");
        tracker.record_success(SourceKind::MetricsAlerting, "u1");

        assert_eq!(tracker.get(SourceKind::UptimeCheck, "u1").unwrap().fail_count, 1);
        assert_eq!(tracker.get(SourceKind::UptimeCheck, "u2").unwrap().fail_count, 0);
        assert!(tracker.backoff_until(SourceKind::MetricsAlerting, "u1").is_none());
        assert_eq!(tracker.list().len(), 3);
    }
}
