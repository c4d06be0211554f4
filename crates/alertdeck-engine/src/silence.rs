//! Evaluation of temporary suppression rules against polled alerts.

use alertdeck_common::types::{Alert, SilenceRule};
use chrono::{DateTime, Utc};

/// Return the alerts not currently suppressed by any active rule.
///
/// An alert is suppressed when at least one active rule matches on all of
/// its specified criteria; evaluation short-circuits on the first matching
/// rule. Underlying state is untouched; suppression only filters the view.
pub fn apply_silences(
    alerts: Vec<Alert>,
    rules: &[SilenceRule],
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let active: Vec<&SilenceRule> = rules.iter().filter(|r| rule_is_active(r, now)).collect();
    if active.is_empty() {
        return alerts;
    }

    alerts
        .into_iter()
        .filter(|alert| !active.iter().any(|rule| rule_matches(rule, alert)))
        .collect()
}

/// A rule is active while enabled and inside its time window (inclusive).
pub fn rule_is_active(rule: &SilenceRule, now: DateTime<Utc>) -> bool {
    rule.enabled && rule.starts_at <= now && now <= rule.ends_at
}

/// All specified (non-empty) criteria must match; unspecified criteria
/// always match.
pub fn rule_matches(rule: &SilenceRule, alert: &Alert) -> bool {
    if let Some(kind) = rule.source_kind {
        if kind != alert.source {
            return false;
        }
    }
    if let Some(source_id) = rule.source_id.as_deref().filter(|s| !s.is_empty()) {
        if source_id != alert.source_id {
            return false;
        }
    }
    if let Some(label) = rule.source_label.as_deref().filter(|s| !s.is_empty()) {
        if !label.eq_ignore_ascii_case(&alert.source_label) {
            return false;
        }
    }
    if let Some(severity) = rule.severity {
        if severity != alert.severity {
            return false;
        }
    }

    pattern_matches(&rule.service_pattern, alert.service.as_deref().unwrap_or(""))
        && pattern_matches(
            &rule.environment_pattern,
            alert.environment.as_deref().unwrap_or(""),
        )
        && pattern_matches(&rule.alert_name_pattern, &alert.name)
        && pattern_matches(&rule.instance_pattern, &alert.instance)
}

/// Anchored, case-insensitive glob match (`*` any sequence, `?` any single
/// character). An empty pattern matches everything, including an empty
/// subject; a non-empty pattern never matches an empty subject.
pub fn pattern_matches(pattern: &str, subject: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    if subject.is_empty() {
        return false;
    }
    glob_match::glob_match(&pattern.to_lowercase(), &subject.to_lowercase())
}
