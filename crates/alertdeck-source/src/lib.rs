//! Source adapters for heterogeneous monitoring backends.
//!
//! Each adapter implements [`AlertSource`]: given one configured endpoint it
//! fetches raw alert/trigger state and maps it to the canonical
//! [`Alert`](alertdeck_common::types::Alert) model. The
//! [`orchestrator`] polls all configured sources concurrently with
//! per-source failure isolation, consulting the [`health`] tracker's
//! backoff gate.

pub mod error;
pub mod health;
pub mod metrics;
pub mod orchestrator;
pub mod trigger;
pub mod uptime;

use alertdeck_common::types::{Alert, SourceKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A configured monitoring backend that can be polled for alerts.
///
/// Implementations build the upstream request, validate and normalize the
/// response, and compute deterministic alert ids. They must not apply side
/// effects on failure; health bookkeeping belongs to the orchestrator.
#[async_trait]
pub trait AlertSource: Send + Sync {
    /// Which backend family this source belongs to.
    fn kind(&self) -> SourceKind;

    /// Id of the configured source instance.
    fn source_id(&self) -> &str;

    /// Human-readable label of the configured source instance.
    fn label(&self) -> &str;

    /// Polls the upstream once and returns the normalized alerts.
    ///
    /// # Errors
    ///
    /// Returns a [`error::SourceError`] describing the transport, HTTP,
    /// payload, or configuration failure.
    async fn fetch(&self) -> error::Result<Vec<Alert>>;
}

/// Auth mode for a metrics-alerting source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsAuthMode {
    #[default]
    None,
    Basic,
    Bearer,
}

/// One configured metrics-alerting endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSourceConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub auth: MetricsAuthMode,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub token: String,
}

/// One configured trigger-system endpoint. Auth is a static API token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSourceConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: String,
}

/// Operating mode for an uptime-check source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UptimeMode {
    /// Poll the public status-page definition plus its heartbeat map.
    #[default]
    StatusPage,
    /// Poll the authenticated metrics export.
    ApiKey,
}

/// Which auth scheme to try first when an uptime API key is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UptimeAuthOrder {
    #[default]
    BearerFirst,
    BasicFirst,
}

/// One configured uptime-check endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UptimeSourceConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub mode: UptimeMode,
    /// Required in status-page mode.
    #[serde(default)]
    pub status_page_slug: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub auth_order: UptimeAuthOrder,
}

/// Full source settings consumed by the orchestrator. Supplied by an
/// external collaborator (settings storage); the engine only reads it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub metrics_sources: Vec<MetricsSourceConfig>,
    #[serde(default)]
    pub trigger_sources: Vec<TriggerSourceConfig>,
    #[serde(default)]
    pub uptime_sources: Vec<UptimeSourceConfig>,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

fn default_refresh_interval_secs() -> u64 {
    60
}

/// Build adapter instances for every configured, non-empty source.
///
/// Sources with an empty URL are skipped. Order is metrics, then trigger,
/// then uptime, each in configuration order; the orchestrator's error list
/// ordering follows from it.
pub fn build_sources(settings: &Settings) -> Vec<Arc<dyn AlertSource>> {
    let mut sources: Vec<Arc<dyn AlertSource>> = Vec::new();

    for config in &settings.metrics_sources {
        if config.url.trim().is_empty() {
            continue;
        }
        match metrics::MetricsAlertingSource::new(config.clone()) {
            Ok(source) => sources.push(Arc::new(source)),
            Err(e) => tracing::warn!(source_id = %config.id, error = %e, "Skipping metrics source"),
        }
    }
    for config in &settings.trigger_sources {
        if config.url.trim().is_empty() {
            continue;
        }
        match trigger::TriggerSystemSource::new(config.clone()) {
            Ok(source) => sources.push(Arc::new(source)),
            Err(e) => tracing::warn!(source_id = %config.id, error = %e, "Skipping trigger source"),
        }
    }
    for config in &settings.uptime_sources {
        if config.url.trim().is_empty() {
            continue;
        }
        match uptime::UptimeCheckSource::new(config.clone()) {
            Ok(source) => sources.push(Arc::new(source)),
            Err(e) => tracing::warn!(source_id = %config.id, error = %e, "Skipping uptime source"),
        }
    }

    sources
}

const MAX_ERROR_BODY_LEN: usize = 256;

pub(crate) fn build_client() -> error::Result<reqwest::Client> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| error::SourceError::ConfigInvalid(format!("failed to build HTTP client: {e}")))
}

/// Parse a response body as JSON, rejecting HTML-shaped bodies with a
/// distinguished error instead of a bare parse failure. Login pages and
/// reverse-proxy error pages are the usual culprits.
pub(crate) fn parse_json_body(body: &str) -> error::Result<serde_json::Value> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        return Err(error::SourceError::Malformed(
            "got HTML instead of JSON, check URL and auth".to_string(),
        ));
    }
    serde_json::from_str(trimmed)
        .map_err(|e| error::SourceError::Malformed(format!("invalid JSON: {e}")))
}

/// Normalize an optional upstream timestamp to UTC, defaulting to now.
pub(crate) fn parse_timestamp_or_now(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LEN {
        body.to_string()
    } else {
        let mut end = MAX_ERROR_BODY_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}
