//! Concurrent fetch orchestration across all configured sources.
//!
//! Fan-out/fan-in with full collection: every source is attempted
//! independently, failures are converted into error entries, and no failure
//! or backoff skip prevents collection from the other sources.

use crate::error::SourceError;
use crate::health::HealthTracker;
use crate::{build_sources, AlertSource, Settings};
use alertdeck_common::types::Alert;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// One entry of the aggregate error list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIssue {
    /// `"<Kind> (<label>)"` of the source that produced the error.
    pub source: String,
    pub message: String,
}

/// Best-effort poll result: alerts from every reachable source plus one
/// error entry per source that failed or was skipped.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub alerts: Vec<Alert>,
    pub errors: Vec<SourceIssue>,
}

pub struct Orchestrator {
    tracker: Arc<HealthTracker>,
    timeout_secs: u64,
}

impl Orchestrator {
    pub fn new(tracker: Arc<HealthTracker>) -> Self {
        Self {
            tracker,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Per-source time budget; a hung upstream surfaces as a failure
    /// instead of wedging the poll.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn tracker(&self) -> &Arc<HealthTracker> {
        &self.tracker
    }

    /// Build adapters for the settings and poll them all once.
    pub async fn fetch_all(&self, settings: &Settings) -> FetchOutcome {
        self.fetch_sources(build_sources(settings)).await
    }

    /// Poll the given sources concurrently and merge after all have settled.
    ///
    /// A source inside its backoff window is not called; it contributes a
    /// synthetic "Backoff active until ..." error and its health row is left
    /// untouched. The error list is ordered like the input source list.
    pub async fn fetch_sources(&self, sources: Vec<Arc<dyn AlertSource>>) -> FetchOutcome {
        let mut tasks = Vec::new();

        for source in sources {
            let tracker = Arc::clone(&self.tracker);
            let timeout_secs = self.timeout_secs;
            let source_label = format!("{} ({})", source.kind(), source.label());

            let task = tokio::spawn(async move {
                let kind = source.kind();
                let source_id = source.source_id().to_string();

                if let Some(until) = tracker.backoff_until(kind, &source_id) {
                    return Err(SourceError::BackoffActive { until });
                }

                match timeout(Duration::from_secs(timeout_secs), source.fetch()).await {
                    Ok(Ok(alerts)) => {
                        tracker.record_success(kind, &source_id);
                        tracing::debug!(%kind, %source_id, count = alerts.len(), "Source poll succeeded");
                        Ok(alerts)
                    }
                    Ok(Err(e)) => {
                        tracker.record_failure(kind, &source_id, &e.to_string());
                        Err(e)
                    }
                    Err(_) => {
                        let e = SourceError::Timeout { secs: timeout_secs };
                        tracker.record_failure(kind, &source_id, &e.to_string());
                        Err(e)
                    }
                }
            });

            tasks.push((source_label, task));
        }

        let mut outcome = FetchOutcome::default();
        for (source_label, task) in tasks {
            match task.await {
                Ok(Ok(alerts)) => outcome.alerts.extend(alerts),
                Ok(Err(e)) => {
                    tracing::warn!(source = %source_label, error = %e, "Source poll failed");
                    outcome.errors.push(SourceIssue {
                        source: source_label,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::error!(source = %source_label, error = %e, "Source poll task panicked");
                    outcome.errors.push(SourceIssue {
                        source: source_label,
                        message: format!("internal error: {e}"),
                    });
                }
            }
        }

        tracing::info!(
            alerts = outcome.alerts.len(),
            errors = outcome.errors.len(),
            "Poll complete"
        );
        outcome
    }
}
