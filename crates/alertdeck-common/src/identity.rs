//! Deterministic identity hashing for alerts and groups.
//!
//! Ids are content hashes over fields that stay stable across repeated polls
//! of the same upstream event. Re-polling must yield the same id, otherwise
//! acknowledgment state and grouping would reset on every refresh.

use crate::types::SourceKind;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Hex length of the ids produced here (half of a SHA-256 digest).
const ID_HEX_LEN: usize = 32;

/// Compute the deterministic id for an alert.
///
/// `upstream_key` is the backend's own stable identifier for the event
/// (fingerprint, trigger id, monitor name) when one exists; pass an empty
/// string otherwise. The event timestamp is bucketed to the minute so that
/// sub-minute jitter in upstream-reported start times does not split an
/// event into new identities.
pub fn alert_id(
    kind: SourceKind,
    source_id: &str,
    upstream_key: &str,
    name: &str,
    instance: &str,
    timestamp: DateTime<Utc>,
) -> String {
    let bucket = timestamp.timestamp().div_euclid(60);
    digest(&[
        &kind.to_string(),
        source_id,
        upstream_key,
        name,
        instance,
        &bucket.to_string(),
    ])
}

/// Compute a grouping key from its basis parts. Callers prefix the parts
/// with a branch tag so different key schemes cannot collide.
pub fn group_key(parts: &[&str]) -> String {
    digest(parts)
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.as_bytes());
    }
    let mut out = hex::encode(hasher.finalize());
    out.truncate(ID_HEX_LEN);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn same_event_yields_same_id() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();
        let a = alert_id(SourceKind::MetricsAlerting, "prod", "f1", "HighCPU", "web-01", ts);
        let b = alert_id(SourceKind::MetricsAlerting, "prod", "f1", "HighCPU", "web-01", ts);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn id_survives_sub_minute_jitter() {
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 42).unwrap();
        let a = alert_id(SourceKind::UptimeCheck, "uk1", "mon-3", "api down", "api", t1);
        let b = alert_id(SourceKind::UptimeCheck, "uk1", "mon-3", "api down", "api", t2);
        assert_eq!(a, b);
    }

    #[test]
    fn id_changes_with_identifying_fields() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let base = alert_id(SourceKind::TriggerSystem, "z1", "100", "disk full", "db-01", ts);
        assert_ne!(
            base,
            alert_id(SourceKind::TriggerSystem, "z2", "100", "disk full", "db-01", ts)
        );
        assert_ne!(
            base,
            alert_id(SourceKind::TriggerSystem, "z1", "101", "disk full", "db-01", ts)
        );
        assert_ne!(
            base,
            alert_id(
                SourceKind::TriggerSystem,
                "z1",
                "100",
                "disk full",
                "db-01",
                ts + chrono::Duration::minutes(2)
            )
        );
    }

    #[test]
    fn group_key_is_order_sensitive_and_stable() {
        let a = group_key(&["fp", "prod", "f1"]);
        let b = group_key(&["fp", "prod", "f1"]);
        let c = group_key(&["fp", "f1", "prod"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
