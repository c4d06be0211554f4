use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use alertdeck_common::types::Severity;
///
/// let sev: Severity = "warning".parse().unwrap();
/// assert_eq!(sev, Severity::Warning);
/// assert_eq!(sev.to_string(), "warning");
/// assert!(Severity::Critical > Severity::Info);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Map an upstream severity keyword to a canonical level.
    ///
    /// `critical`/`disaster` map to [`Severity::Critical`],
    /// `warning`/`average` to [`Severity::Warning`], anything else to
    /// [`Severity::Info`]. Matching is case-insensitive.
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.to_lowercase().as_str() {
            "critical" | "disaster" => Severity::Critical,
            "warning" | "average" => Severity::Warning,
            _ => Severity::Info,
        }
    }

    /// Map an upstream numeric priority (0-5 scale) to a canonical level:
    /// 4-5 critical, 2-3 warning, everything else info.
    pub fn from_priority(priority: i64) -> Self {
        match priority {
            4..=5 => Severity::Critical,
            2..=3 => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Which monitoring backend family a source (and its alerts) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    MetricsAlerting,
    TriggerSystem,
    UptimeCheck,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::MetricsAlerting => write!(f, "Metrics alerting"),
            SourceKind::TriggerSystem => write!(f, "Trigger system"),
            SourceKind::UptimeCheck => write!(f, "Uptime check"),
        }
    }
}

/// A normalized alert as produced by a source adapter for one poll.
///
/// The `id` is a content hash over fields that are stable across repeated
/// polls of the same upstream event (see [`crate::identity::alert_id`]), so
/// acknowledgment state and grouping survive re-polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub source: SourceKind,
    /// Which configured source instance produced this alert.
    pub source_id: String,
    pub source_label: String,
    pub name: String,
    pub severity: Severity,
    pub message: String,
    pub instance: String,
    pub service: Option<String>,
    pub environment: Option<String>,
    /// Upstream-provided stable dedup key, when the backend supplies one.
    pub fingerprint: Option<String>,
    /// Event start time.
    pub timestamp: DateTime<Utc>,
}

/// Per-source success/failure bookkeeping. One row per
/// `(SourceKind, source_id)`, created lazily on the first fetch attempt and
/// never deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceHealth {
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_error_message: Option<String>,
    /// Consecutive failures; reset to 0 on success.
    pub fail_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl SourceHealth {
    /// A source is stale when it has never succeeded but has failed at least
    /// once, or when the last success is older than
    /// `max(5 minutes, 3 x refresh interval)`.
    pub fn is_stale(&self, now: DateTime<Utc>, refresh_interval_secs: u64) -> bool {
        match self.last_success_at {
            None => self.fail_count > 0,
            Some(last_success) => {
                let threshold = (3 * refresh_interval_secs).max(300);
                now - last_success > chrono::Duration::seconds(threshold as i64)
            }
        }
    }
}

/// Operator-managed alert lifecycle status, independent of the upstream's
/// own state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl std::fmt::Display for AckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AckStatus::Active => write!(f, "active"),
            AckStatus::Acknowledged => write!(f, "acknowledged"),
            AckStatus::Resolved => write!(f, "resolved"),
        }
    }
}

impl std::str::FromStr for AckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AckStatus::Active),
            "acknowledged" => Ok(AckStatus::Acknowledged),
            "resolved" => Ok(AckStatus::Resolved),
            _ => Err(format!("unknown ack status: {s}")),
        }
    }
}

/// Acknowledgment state for one alert identity. `acknowledged_at` and
/// `resolved_at` record the last time the alert entered that status; a later
/// transition back to active does not clear them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckState {
    pub status: AckStatus,
    pub note: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// A time-bounded, pattern-scoped suppression rule.
///
/// `None` for `source_kind`/`severity` means "any"; empty pattern strings
/// match everything. A rule is active when `enabled` and
/// `starts_at <= now <= ends_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SilenceRule {
    pub name: String,
    #[serde(default)]
    pub source_kind: Option<SourceKind>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub source_label: Option<String>,
    #[serde(default)]
    pub service_pattern: String,
    #[serde(default)]
    pub environment_pattern: String,
    #[serde(default)]
    pub alert_name_pattern: String,
    #[serde(default)]
    pub instance_pattern: String,
    #[serde(default)]
    pub severity: Option<Severity>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub enabled: bool,
}

/// One logical incident: the newest member as representative plus group
/// metadata. Derived from a poll result, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertGroup {
    pub alert: Alert,
    pub group_key: String,
    pub group_size: usize,
    /// All member ids, newest first.
    pub grouped_alert_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn severity_keyword_mapping() {
        assert_eq!(Severity::from_keyword("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::from_keyword("disaster"), Severity::Critical);
        assert_eq!(Severity::from_keyword("warning"), Severity::Warning);
        assert_eq!(Severity::from_keyword("average"), Severity::Warning);
        assert_eq!(Severity::from_keyword("ok"), Severity::Info);
        assert_eq!(Severity::from_keyword(""), Severity::Info);
    }

    #[test]
    fn severity_priority_mapping() {
        assert_eq!(Severity::from_priority(5), Severity::Critical);
        assert_eq!(Severity::from_priority(4), Severity::Critical);
        assert_eq!(Severity::from_priority(3), Severity::Warning);
        assert_eq!(Severity::from_priority(2), Severity::Warning);
        assert_eq!(Severity::from_priority(1), Severity::Info);
        assert_eq!(Severity::from_priority(0), Severity::Info);
        assert_eq!(Severity::from_priority(-1), Severity::Info);
    }

    #[test]
    fn health_stale_when_never_succeeded_with_failures() {
        let health = SourceHealth {
            fail_count: 1,
            ..Default::default()
        };
        assert!(health.is_stale(Utc::now(), 60));

        let untouched = SourceHealth::default();
        assert!(!untouched.is_stale(Utc::now(), 60));
    }

    #[test]
    fn health_stale_threshold_uses_refresh_interval() {
        let now = Utc::now();
        let health = SourceHealth {
            last_success_at: Some(now - Duration::seconds(400)),
            ..Default::default()
        };
        // 3 x 60s = 180s < 300s floor, so the 5 minute floor applies
        assert!(health.is_stale(now, 60));
        // 3 x 200s = 600s > 400s elapsed
        assert!(!health.is_stale(now, 200));
    }

    #[test]
    fn ack_status_round_trip() {
        for status in [AckStatus::Active, AckStatus::Acknowledged, AckStatus::Resolved] {
            let parsed: AckStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("gone".parse::<AckStatus>().is_err());
    }
}
