//! Query facade over stored observations.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use super::repository::ObservationStore;
use crate::monitoring::Observation;

/// Criteria for reading observations back; every field is optional and
/// set fields are AND-ed together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservationFilter {
    /// Exact URL match
    pub url: Option<String>,
    /// Only observations timestamped at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Exact status code match
    pub status_code: Option<u16>,
}

impl ObservationFilter {
    pub fn matches(&self, observation: &Observation) -> bool {
        self.url.as_ref().is_none_or(|url| *url == observation.url)
            && self.since.is_none_or(|since| observation.timestamp >= since)
            && self.status_code.is_none_or(|code| code == observation.status_code)
    }
}

/// Raw search parameters, as they arrive on a query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub url: Option<String>,
    /// Window size such as `1h` or `15m`
    pub last: Option<String>,
    #[serde(alias = "statusCode", alias = "status_code")]
    pub statuscode: Option<String>,
}

impl SearchParams {
    /// Build a filter relative to `now`; malformed values are ignored
    pub fn into_filter(self, now: DateTime<Utc>) -> ObservationFilter {
        let url = self.url.filter(|url| !url.is_empty());

        let since = self
            .last
            .as_deref()
            .map(str::trim)
            .filter(|last| !last.is_empty())
            .and_then(|last| humantime::parse_duration(last).ok())
            .and_then(|window| chrono::Duration::from_std(window).ok())
            .and_then(|window| now.checked_sub_signed(window));

        let status_code = self.statuscode.as_deref().and_then(|code| code.trim().parse().ok());

        ObservationFilter { url, since, status_code }
    }
}

/// Read side of the observation log
pub struct PingSearch {
    store: Arc<dyn ObservationStore>,
}

impl PingSearch {
    pub fn new(store: Arc<dyn ObservationStore>) -> Self {
        Self { store }
    }

    pub async fn search(&self, filter: &ObservationFilter) -> Result<Vec<Observation>> {
        self.store.find(filter).await
    }

    /// Resolve raw parameters against the current time and search
    pub async fn search_params(&self, params: SearchParams) -> Result<Vec<Observation>> {
        let filter = params.into_filter(Utc::now());
        tracing::debug!(?filter, "searching observations");
        self.search(&filter).await
    }
}
