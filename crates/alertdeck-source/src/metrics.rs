//! Adapter for metrics-alerting backends exposing an
//! Alertmanager-compatible `/api/v2/alerts` endpoint.

use crate::error::{Result, SourceError};
use crate::{parse_json_body, parse_timestamp_or_now, truncate_body, MetricsAuthMode, MetricsSourceConfig};
use alertdeck_common::identity;
use alertdeck_common::types::{Alert, Severity, SourceKind};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

pub struct MetricsAlertingSource {
    config: MetricsSourceConfig,
    client: Client,
}

impl MetricsAlertingSource {
    pub fn new(config: MetricsSourceConfig) -> Result<Self> {
        let client = crate::build_client()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl crate::AlertSource for MetricsAlertingSource {
    fn kind(&self) -> SourceKind {
        SourceKind::MetricsAlerting
    }

    fn source_id(&self) -> &str {
        &self.config.id
    }

    fn label(&self) -> &str {
        &self.config.name
    }

    async fn fetch(&self) -> Result<Vec<Alert>> {
        let url = format!("{}/api/v2/alerts", self.config.url.trim_end_matches('/'));
        let mut request = self.client.get(&url);
        request = match self.config.auth {
            MetricsAuthMode::None => request,
            MetricsAuthMode::Basic => {
                request.basic_auth(&self.config.username, Some(&self.config.password))
            }
            MetricsAuthMode::Bearer => request.bearer_auth(&self.config.token),
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SourceError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let json = parse_json_body(&body)?;
        Ok(parse_alerts(&self.config.id, &self.config.name, &json))
    }
}

/// Map an Alertmanager-style alert array to canonical alerts. Fields are
/// extracted defensively; upstream shapes vary between vendors.
fn parse_alerts(source_id: &str, source_label: &str, json: &Value) -> Vec<Alert> {
    let Some(items) = json.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| parse_alert(source_id, source_label, item))
        .collect()
}

fn parse_alert(source_id: &str, source_label: &str, item: &Value) -> Option<Alert> {
    let labels = item.get("labels")?;
    let label = |key: &str| {
        labels
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };

    let name = label("alertname").unwrap_or("Unnamed alert").to_string();
    let severity = Severity::from_keyword(label("severity").unwrap_or(""));
    let instance = label("instance").unwrap_or("").to_string();
    let service = label("service").map(str::to_string);
    let environment = label("environment")
        .or_else(|| label("env"))
        .map(str::to_string);

    let annotations = item.get("annotations");
    let annotation = |key: &str| {
        annotations
            .and_then(|a| a.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };
    let message = annotation("summary")
        .or_else(|| annotation("description"))
        .unwrap_or(&name)
        .to_string();

    let fingerprint = item
        .get("fingerprint")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let timestamp = parse_timestamp_or_now(item.get("startsAt").and_then(Value::as_str));

    let id = identity::alert_id(
        SourceKind::MetricsAlerting,
        source_id,
        fingerprint.as_deref().unwrap_or(""),
        &name,
        &instance,
        timestamp,
    );

    Some(Alert {
        id,
        source: SourceKind::MetricsAlerting,
        source_id: source_id.to_string(),
        source_label: source_label.to_string(),
        name,
        severity,
        message,
        instance,
        service,
        environment,
        fingerprint,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_alertmanager_payload() {
        let payload = json!([
            {
                "fingerprint": "abc123",
                "labels": {
                    "alertname": "HighCPU",
                    "severity": "critical",
                    "instance": "web-01:9100",
                    "service": "checkout",
                    "env": "prod"
                },
                "annotations": {"summary": "CPU above 95% for 10m"},
                "startsAt": "2024-05-01T12:00:00Z"
            },
            {
                "labels": {"alertname": "DiskFilling", "severity": "average"},
                "annotations": {"description": "Disk 80% full"}
            }
        ]);

        let alerts = parse_alerts("m1", "Prod Grafana", &payload);
        assert_eq!(alerts.len(), 2);

        let first = &alerts[0];
        assert_eq!(first.name, "HighCPU");
        assert_eq!(first.severity, Severity::Critical);
        assert_eq!(first.message, "CPU above 95% for 10m");
        assert_eq!(first.instance, "web-01:9100");
        assert_eq!(first.service.as_deref(), Some("checkout"));
        assert_eq!(first.environment.as_deref(), Some("prod"));
        assert_eq!(first.fingerprint.as_deref(), Some("abc123"));
        assert_eq!(first.timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");

        let second = &alerts[1];
        assert_eq!(second.severity, Severity::Warning);
        assert_eq!(second.message, "Disk 80% full");
        assert!(second.fingerprint.is_none());
    }

    #[test]
    fn repolling_the_same_event_yields_the_same_id() {
        let payload = json!([{
            "fingerprint": "abc123",
            "labels": {"alertname": "HighCPU", "instance": "web-01"},
            "startsAt": "2024-05-01T12:00:00Z"
        }]);

        let first = parse_alerts("m1", "Prod", &payload);
        let second = parse_alerts("m1", "Prod", &payload);
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let payload = json!([{"no_labels": true}, 42, {"labels": {"alertname": "Ok"}}]);
        let alerts = parse_alerts("m1", "Prod", &payload);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].name, "Ok");
    }

    #[test]
    fn non_array_payload_yields_no_alerts() {
        assert!(parse_alerts("m1", "Prod", &json!({"status": "ok"})).is_empty());
    }
}
