//! Adapter for uptime-check services.
//!
//! Two operating modes: *status page* polls the public status-page
//! definition together with its heartbeat map and reports every monitor
//! whose latest heartbeat is down; *API key* polls the authenticated
//! metrics export and reports every monitor whose latest status sample is 0.

use crate::error::{Result, SourceError};
use crate::{parse_json_body, truncate_body, UptimeAuthOrder, UptimeMode, UptimeSourceConfig};
use alertdeck_common::identity;
use alertdeck_common::types::{Alert, Severity, SourceKind};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde_json::Value;

pub struct UptimeCheckSource {
    config: UptimeSourceConfig,
    client: Client,
}

#[derive(Debug, Clone, Copy)]
enum KeyScheme {
    Bearer,
    Basic,
}

impl UptimeCheckSource {
    pub fn new(config: UptimeSourceConfig) -> Result<Self> {
        let client = crate::build_client()?;
        Ok(Self { config, client })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    async fn fetch_status_page(&self) -> Result<Vec<Alert>> {
        let slug = self.config.status_page_slug.trim();
        if slug.is_empty() {
            return Err(SourceError::ConfigInvalid(
                "status-page mode requires a status page slug".to_string(),
            ));
        }

        let page_url = format!("{}/api/status-page/{slug}", self.base_url());
        let heartbeat_url = format!("{}/api/status-page/heartbeat/{slug}", self.base_url());

        // Both sub-requests must complete; either failure fails the poll.
        let (page, heartbeats) = tokio::try_join!(
            self.get_json(&page_url),
            self.get_json(&heartbeat_url)
        )?;

        Ok(parse_down_monitors(
            &self.config.id,
            &self.config.name,
            &page,
            &heartbeats,
        ))
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SourceError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }
        parse_json_body(&body)
    }

    async fn fetch_metrics_export(&self) -> Result<Vec<Alert>> {
        let url = format!("{}/metrics", self.base_url());
        let key = self.config.api_key.trim();

        let (primary, fallback) = match self.config.auth_order {
            UptimeAuthOrder::BearerFirst => (KeyScheme::Bearer, KeyScheme::Basic),
            UptimeAuthOrder::BasicFirst => (KeyScheme::Basic, KeyScheme::Bearer),
        };

        let mut response = self.metrics_request(&url, key, primary).await?;
        if !key.is_empty() && matches!(response.status().as_u16(), 401 | 403) {
            tracing::debug!(
                source_id = %self.config.id,
                "Primary auth scheme rejected, retrying with the other one"
            );
            response = self.metrics_request(&url, key, fallback).await?;
        }

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SourceError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }
        if body.trim_start().starts_with('<') {
            return Err(SourceError::Malformed(
                "got HTML instead of a metrics export, check URL and auth".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(parse_metrics_export(&body)
            .into_iter()
            .filter(|monitor| monitor.value == 0.0)
            .map(|monitor| down_alert(
                &self.config.id,
                &self.config.name,
                &monitor.name,
                monitor.url.as_deref().unwrap_or(&monitor.name),
                &monitor.name,
                now,
            ))
            .collect())
    }

    async fn metrics_request(
        &self,
        url: &str,
        key: &str,
        scheme: KeyScheme,
    ) -> Result<reqwest::Response> {
        let mut request = self.client.get(url);
        if !key.is_empty() {
            request = match scheme {
                KeyScheme::Bearer => request.bearer_auth(key),
                // the export endpoint expects the key as the basic-auth password
                KeyScheme::Basic => request.basic_auth("", Some(key)),
            };
        }
        Ok(request.send().await?)
    }
}

#[async_trait]
impl crate::AlertSource for UptimeCheckSource {
    fn kind(&self) -> SourceKind {
        SourceKind::UptimeCheck
    }

    fn source_id(&self) -> &str {
        &self.config.id
    }

    fn label(&self) -> &str {
        &self.config.name
    }

    async fn fetch(&self) -> Result<Vec<Alert>> {
        match self.config.mode {
            UptimeMode::StatusPage => self.fetch_status_page().await,
            UptimeMode::ApiKey => self.fetch_metrics_export().await,
        }
    }
}

/// One alert per monitor whose most recent heartbeat is down.
fn parse_down_monitors(
    source_id: &str,
    source_label: &str,
    page: &Value,
    heartbeats: &Value,
) -> Vec<Alert> {
    let heartbeat_map = heartbeats.get("heartbeatList");
    let mut alerts = Vec::new();

    for (monitor_id, monitor_name) in status_page_monitors(page) {
        let Some(beat) = heartbeat_map
            .and_then(|map| map.get(&monitor_id))
            .and_then(Value::as_array)
            .and_then(|beats| beats.last())
        else {
            continue;
        };

        if !heartbeat_is_down(beat.get("status")) {
            continue;
        }

        let timestamp = beat
            .get("time")
            .and_then(Value::as_str)
            .and_then(parse_heartbeat_time)
            .unwrap_or_else(Utc::now);

        alerts.push(down_alert(
            source_id,
            source_label,
            &monitor_name,
            &monitor_name,
            &monitor_id,
            timestamp,
        ));
    }

    alerts
}

fn status_page_monitors(page: &Value) -> Vec<(String, String)> {
    let Some(groups) = page.get("publicGroupList").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut monitors = Vec::new();
    for group in groups {
        let Some(list) = group.get("monitorList").and_then(Value::as_array) else {
            continue;
        };
        for monitor in list {
            let id = match monitor.get("id") {
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::String(s)) => s.clone(),
                _ => continue,
            };
            let name = monitor
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("Unnamed monitor")
                .to_string();
            monitors.push((id, name));
        }
    }
    monitors
}

/// Down is encoded as the number 0 or the boolean false depending on the
/// upstream shape; both count.
fn heartbeat_is_down(status: Option<&Value>) -> bool {
    match status {
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(Value::Bool(b)) => !b,
        _ => false,
    }
}

/// Heartbeat times arrive as `YYYY-MM-DD HH:MM:SS.fff` in UTC; some
/// deployments emit RFC3339 instead.
fn parse_heartbeat_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn down_alert(
    source_id: &str,
    source_label: &str,
    monitor_name: &str,
    instance: &str,
    upstream_key: &str,
    timestamp: DateTime<Utc>,
) -> Alert {
    let id = identity::alert_id(
        SourceKind::UptimeCheck,
        source_id,
        upstream_key,
        monitor_name,
        instance,
        timestamp,
    );
    Alert {
        id,
        source: SourceKind::UptimeCheck,
        source_id: source_id.to_string(),
        source_label: source_label.to_string(),
        name: monitor_name.to_string(),
        severity: Severity::Critical,
        message: format!("Monitor \"{monitor_name}\" is down"),
        instance: instance.to_string(),
        service: None,
        environment: None,
        fingerprint: Some(upstream_key.to_string()),
        timestamp,
    }
}

struct MonitorSample {
    name: String,
    url: Option<String>,
    value: f64,
}

/// Extract `monitor_status` samples from a plaintext metrics export.
/// Later samples for the same monitor name overwrite earlier ones, so each
/// monitor appears at most once per poll.
fn parse_metrics_export(body: &str) -> Vec<MonitorSample> {
    let mut order = Vec::new();
    let mut by_name: std::collections::HashMap<String, MonitorSample> =
        std::collections::HashMap::new();

    for line in body.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix("monitor_status{") else {
            continue;
        };
        let Some(end) = rest.rfind('}') else {
            continue;
        };
        let labels = &rest[..end];
        let Some(value) = rest[end + 1..].split_whitespace().next() else {
            continue;
        };
        let Ok(value) = value.parse::<f64>() else {
            continue;
        };
        let Some(name) = parse_label(labels, "monitor_name") else {
            continue;
        };
        let url = parse_label(labels, "monitor_url").filter(|u| !u.is_empty() && u != "null");

        if !by_name.contains_key(&name) {
            order.push(name.clone());
        }
        by_name.insert(name.clone(), MonitorSample { name, url, value });
    }

    order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect()
}

/// Pull one quoted label value out of a Prometheus-style label section,
/// honoring backslash escapes.
fn parse_label(labels: &str, key: &str) -> Option<String> {
    let needle = format!("{key}=\"");
    let start = labels.find(&needle)? + needle.len();
    let mut out = String::new();
    let mut chars = labels[start..].chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '"' => return Some(out),
            _ => out.push(c),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_page_reports_down_monitors_only() {
        let page = json!({
            "publicGroupList": [
                {"monitorList": [
                    {"id": 1, "name": "API"},
                    {"id": 2, "name": "Website"},
                    {"id": 3, "name": "Database"}
                ]}
            ]
        });
        let heartbeats = json!({
            "heartbeatList": {
                "1": [{"status": 1, "time": "2024-05-01 11:59:00.000"},
                      {"status": 0, "time": "2024-05-01 12:00:00.000"}],
                "2": [{"status": 1, "time": "2024-05-01 12:00:00.000"}],
                "3": [{"status": false, "time": "2024-05-01 12:00:30.000"}]
            }
        });

        let alerts = parse_down_monitors("u1", "Edge", &page, &heartbeats);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].name, "API");
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
        assert_eq!(alerts[1].name, "Database");
    }

    #[test]
    fn monitor_without_heartbeats_is_ignored() {
        let page = json!({
            "publicGroupList": [{"monitorList": [{"id": 9, "name": "Orphan"}]}]
        });
        let heartbeats = json!({"heartbeatList": {}});
        assert!(parse_down_monitors("u1", "Edge", &page, &heartbeats).is_empty());
    }

    #[test]
    fn heartbeat_down_encodings() {
        assert!(heartbeat_is_down(Some(&json!(0))));
        assert!(heartbeat_is_down(Some(&json!(false))));
        assert!(!heartbeat_is_down(Some(&json!(1))));
        assert!(!heartbeat_is_down(Some(&json!(true))));
        assert!(!heartbeat_is_down(Some(&json!(2))));
        assert!(!heartbeat_is_down(None));
    }

    #[test]
    fn metrics_export_parses_and_dedupes_by_monitor_name() {
        let body = r#"
# HELP monitor_status Monitor Status (1 = UP, 0 = DOWN)
# TYPE monitor_status gauge
monitor_status{monitor_name="API",monitor_type="http",monitor_url="https://api.local"} 1
monitor_status{monitor_name="Website",monitor_type="http",monitor_url="https://web.local"} 0
monitor_status{monitor_name="Website",monitor_type="http",monitor_url="https://web.local"} 0
monitor_status{monitor_name="Queue",monitor_type="port",monitor_url="null"} 0
monitor_other{monitor_name="Ignored"} 0
"#;

        let samples = parse_metrics_export(body);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].name, "API");
        assert_eq!(samples[0].value, 1.0);
        assert_eq!(samples[1].name, "Website");
        assert_eq!(samples[1].url.as_deref(), Some("https://web.local"));
        assert_eq!(samples[2].name, "Queue");
        assert!(samples[2].url.is_none());
    }

    #[test]
    fn label_parsing_handles_escapes() {
        let labels = r#"monitor_name="A \"quoted\" name",monitor_url="https://x""#;
        assert_eq!(parse_label(labels, "monitor_name").unwrap(), "A \"quoted\" name");
        assert_eq!(parse_label(labels, "monitor_url").unwrap(), "https://x");
        assert!(parse_label(labels, "missing").is_none());
    }

    #[test]
    fn heartbeat_time_formats() {
        assert_eq!(
            parse_heartbeat_time("2024-05-01 12:00:00.000").unwrap().to_rfc3339(),
            "2024-05-01T12:00:00+00:00"
        );
        assert_eq!(
            parse_heartbeat_time("2024-05-01T12:00:00Z").unwrap().to_rfc3339(),
            "2024-05-01T12:00:00+00:00"
        );
        assert!(parse_heartbeat_time("whenever").is_none());
    }
}
