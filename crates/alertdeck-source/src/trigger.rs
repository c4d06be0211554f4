//! Adapter for ticketing-style trigger systems speaking JSON-RPC
//! (`trigger.get` with a static API token).

use crate::error::{Result, SourceError};
use crate::{parse_json_body, truncate_body, TriggerSourceConfig};
use alertdeck_common::identity;
use alertdeck_common::types::{Alert, Severity, SourceKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{json, Value};

pub struct TriggerSystemSource {
    config: TriggerSourceConfig,
    client: Client,
}

impl TriggerSystemSource {
    pub fn new(config: TriggerSourceConfig) -> Result<Self> {
        let client = crate::build_client()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl crate::AlertSource for TriggerSystemSource {
    fn kind(&self) -> SourceKind {
        SourceKind::TriggerSystem
    }

    fn source_id(&self) -> &str {
        &self.config.id
    }

    fn label(&self) -> &str {
        &self.config.name
    }

    async fn fetch(&self) -> Result<Vec<Alert>> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": "trigger.get",
            "params": {
                "output": "extend",
                "selectHosts": ["host"],
                "filter": {"value": 1},
                "expandDescription": 1,
                "sortfield": "lastchange",
                "sortorder": "DESC"
            },
            "id": 1
        });

        let response = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json-rpc")
            .bearer_auth(&self.config.token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SourceError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let json = parse_json_body(&body)?;
        if let Some(error) = json.get("error") {
            let code = error
                .get("code")
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let message = [error.get("message"), error.get("data")]
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ");
            return Err(SourceError::Api { code, message });
        }

        Ok(parse_triggers(&self.config.id, &self.config.name, &json))
    }
}

fn parse_triggers(source_id: &str, source_label: &str, json: &Value) -> Vec<Alert> {
    let Some(items) = json.get("result").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| parse_trigger(source_id, source_label, item))
        .collect()
}

fn parse_trigger(source_id: &str, source_label: &str, item: &Value) -> Option<Alert> {
    let trigger_id = item.get("triggerid").and_then(Value::as_str)?.to_string();

    let name = item
        .get("description")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("Unnamed trigger")
        .to_string();

    // priority arrives as a number or a numeric string depending on version
    let severity = match item.get("priority") {
        Some(Value::Number(n)) => Severity::from_priority(n.as_i64().unwrap_or(0)),
        Some(Value::String(s)) => match s.parse::<i64>() {
            Ok(n) => Severity::from_priority(n),
            Err(_) => Severity::from_keyword(s),
        },
        _ => Severity::Info,
    };

    let instance = item
        .get("hosts")
        .and_then(Value::as_array)
        .and_then(|hosts| hosts.first())
        .and_then(|host| host.get("host"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let timestamp = parse_unix_seconds(item.get("lastchange")).unwrap_or_else(Utc::now);

    let id = identity::alert_id(
        SourceKind::TriggerSystem,
        source_id,
        &trigger_id,
        &name,
        &instance,
        timestamp,
    );

    Some(Alert {
        id,
        source: SourceKind::TriggerSystem,
        source_id: source_id.to_string(),
        source_label: source_label.to_string(),
        message: name.clone(),
        name,
        severity,
        instance,
        service: None,
        environment: None,
        fingerprint: Some(trigger_id),
        timestamp,
    })
}

fn parse_unix_seconds(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let secs = match value? {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_trigger_result() {
        let payload = json!({
            "jsonrpc": "2.0",
            "result": [
                {
                    "triggerid": "13491",
                    "description": "Disk space critically low on /data",
                    "priority": "5",
                    "lastchange": "1714564800",
                    "hosts": [{"host": "db-01"}]
                },
                {
                    "triggerid": "13492",
                    "description": "Load average high",
                    "priority": 2,
                    "lastchange": 1714564900,
                    "hosts": []
                }
            ],
            "id": 1
        });

        let alerts = parse_triggers("t1", "Ops Zabbix", &payload);
        assert_eq!(alerts.len(), 2);

        let first = &alerts[0];
        assert_eq!(first.severity, Severity::Critical);
        assert_eq!(first.instance, "db-01");
        assert_eq!(first.fingerprint.as_deref(), Some("13491"));
        assert_eq!(first.timestamp.timestamp(), 1714564800);

        let second = &alerts[1];
        assert_eq!(second.severity, Severity::Warning);
        assert_eq!(second.instance, "");
    }

    #[test]
    fn trigger_without_id_is_skipped() {
        let payload = json!({"result": [{"description": "orphan"}]});
        assert!(parse_triggers("t1", "Ops", &payload).is_empty());
    }

    #[test]
    fn same_trigger_maps_to_same_id_across_polls() {
        let payload = json!({
            "result": [{
                "triggerid": "42",
                "description": "Service down",
                "priority": "4",
                "lastchange": "1714564800",
                "hosts": [{"host": "app-02"}]
            }]
        });

        let first = parse_triggers("t1", "Ops", &payload);
        let second = parse_triggers("t1", "Ops", &payload);
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn unix_seconds_accept_number_and_string() {
        assert_eq!(
            parse_unix_seconds(Some(&json!("1714564800"))).unwrap().timestamp(),
            1714564800
        );
        assert_eq!(
            parse_unix_seconds(Some(&json!(1714564800))).unwrap().timestamp(),
            1714564800
        );
        assert!(parse_unix_seconds(Some(&json!("soon"))).is_none());
        assert!(parse_unix_seconds(None).is_none());
    }
}
