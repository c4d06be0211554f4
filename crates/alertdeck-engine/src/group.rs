//! Deduplication and grouping of polled alerts.

use alertdeck_common::identity;
use alertdeck_common::types::{Alert, AlertGroup};
use std::collections::HashMap;

/// Collapse a flat alert list into one group per logical incident.
///
/// Pure function of its input: no I/O, no state, recomputed on every poll.
/// Members are sorted newest-first within each group; the representative is
/// the newest member; groups are sorted by the representative's timestamp,
/// newest first. Ties break on alert id so the output is deterministic.
pub fn group_alerts(alerts: &[Alert]) -> Vec<AlertGroup> {
    let mut buckets: HashMap<String, Vec<&Alert>> = HashMap::new();
    for alert in alerts {
        buckets.entry(grouping_key(alert)).or_default().push(alert);
    }

    let mut groups: Vec<AlertGroup> = buckets
        .into_iter()
        .map(|(group_key, mut members)| {
            members.sort_by(|a, b| {
                b.timestamp
                    .cmp(&a.timestamp)
                    .then_with(|| a.id.cmp(&b.id))
            });
            AlertGroup {
                alert: members[0].clone(),
                group_key,
                group_size: members.len(),
                grouped_alert_ids: members.iter().map(|m| m.id.clone()).collect(),
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        b.alert
            .timestamp
            .cmp(&a.alert.timestamp)
            .then_with(|| a.alert.id.cmp(&b.alert.id))
    });
    groups
}

/// Grouping key for one alert. An upstream fingerprint wins; otherwise the
/// key is derived from the inferred service and environment. The branch tags
/// keep the two schemes from colliding.
pub fn grouping_key(alert: &Alert) -> String {
    let kind = alert.source.to_string();
    if let Some(fingerprint) = alert.fingerprint.as_deref().filter(|s| !s.is_empty()) {
        return identity::group_key(&["fp", &kind, &alert.source_id, fingerprint]);
    }

    let service = [
        alert.service.as_deref().unwrap_or(""),
        &alert.instance,
        &alert.name,
    ]
    .into_iter()
    .find(|s| !s.is_empty())
    .unwrap_or("unknown");

    identity::group_key(&[
        "svc",
        &kind,
        &alert.source_id,
        service,
        alert.environment.as_deref().unwrap_or(""),
    ])
}
