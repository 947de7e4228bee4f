use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle state of a probe job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Stopped,
    Running,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Stopped => write!(f, "stopped"),
            JobStatus::Running => write!(f, "running"),
        }
    }
}

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// URL that was probed
    pub url: String,

    /// When the probe was dispatched
    pub timestamp: DateTime<Utc>,

    /// HTTP status code, 0 when no response was received
    pub status_code: u16,

    /// Declared response body length, if any
    pub content_length: Option<u64>,

    /// Time from dispatch to response head (or error), in milliseconds
    pub duration_ms: u64,

    /// Transport error, empty when the request succeeded
    pub error: String,
}

impl Observation {
    /// Create an observation for a probe starting now
    pub fn new(url: impl Into<String>) -> Self {
        Self::at(url, Utc::now())
    }

    /// Create an observation for a probe that started at `timestamp`
    pub fn at(url: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            timestamp,
            status_code: 0,
            content_length: None,
            duration_ms: 0,
            error: String::new(),
        }
    }

    /// Record a received response
    pub fn response(mut self, status_code: u16, content_length: Option<u64>, duration: Duration) -> Self {
        self.status_code = status_code;
        self.content_length = content_length;
        self.duration_ms = millis(duration);
        self
    }

    /// Record a transport failure
    pub fn failure(mut self, error: impl Into<String>, duration: Duration) -> Self {
        self.status_code = 0;
        self.error = error.into();
        self.duration_ms = millis(duration);
        self
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Point-in-time copy of a job, as handed out by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    pub url: String,
    /// Probe interval rendered as a duration string, e.g. `200ms`
    pub period: String,
    pub status: JobStatus,
}

/// Whole milliseconds, saturating at `u64::MAX`
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Render a period as compact unit groups (`200ms`, `1m30s`, `1h30m`)
pub fn format_period(period: Duration) -> String {
    humantime::format_duration(period).to_string().replace(' ', "")
}
