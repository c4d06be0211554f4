use chrono::{DateTime, Utc};

/// Errors that can occur when polling an upstream monitoring backend.
///
/// Adapter failures never escape the orchestrator: each one is caught per
/// source and converted into an entry of the aggregate error list, so a
/// failing source cannot abort collection from the others.
///
/// # Examples
///
/// ```rust
/// use alertdeck_source::error::SourceError;
///
/// let err = SourceError::Rejected { status: 503, body: "overloaded".to_string() };
/// assert!(err.to_string().contains("503"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Transport-level failure reaching the upstream endpoint.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The adapter call exceeded the orchestrator's per-source budget.
    #[error("Upstream timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Non-2xx status code from the upstream API.
    #[error("Upstream rejected request: status={status}, body={body}")]
    Rejected { status: u16, body: String },

    /// The upstream returned a 2xx status but the payload carries a logical
    /// error (e.g. a JSON-RPC error member).
    #[error("Upstream API error: code={code}, message={message}")]
    Api { code: String, message: String },

    /// The response body could not be interpreted, including the HTML case.
    #[error("Malformed upstream response: {0}")]
    Malformed(String),

    /// Source configuration is missing a required field.
    #[error("Invalid source configuration: {0}")]
    ConfigInvalid(String),

    /// Synthetic error emitted by the orchestrator while a source sits in
    /// its backoff window; the adapter is not called and health is not
    /// touched.
    #[error("Backoff active until {}", .until.to_rfc3339())]
    BackoffActive { until: DateTime<Utc> },
}

/// Convenience type alias so callers can write `error::Result<T>`.
pub type Result<T> = std::result::Result<T, SourceError>;
