use std::time::Duration;
use url::Url;

use crate::error::JobError;

/// Validation results with specific error messages
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self { is_valid: true, error: None }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { is_valid: false, error: Some(msg.into()) }
    }

    pub fn to_result(&self) -> Result<(), JobError> {
        if self.is_valid {
            Ok(())
        } else {
            Err(JobError::bad_request(
                self.error.clone().unwrap_or_else(|| "Validation failed".to_string()),
            ))
        }
    }
}

/// Validate HTTP/HTTPS URL endpoint
pub fn validate_http_endpoint(target: &str) -> ValidationResult {
    if target.trim().is_empty() {
        return ValidationResult::err("URL cannot be empty");
    }

    match Url::parse(target) {
        Ok(url) => {
            let scheme = url.scheme();
            if scheme != "http" && scheme != "https" {
                return ValidationResult::err(format!(
                    "Invalid scheme '{scheme}'. Must be http or https"
                ));
            }

            if url.host_str().is_none() {
                return ValidationResult::err("URL must have a valid host");
            }

            ValidationResult::ok()
        }
        Err(e) => {
            // If it fails to parse, check if it's missing a scheme
            if !target.contains("://") {
                ValidationResult::err("URL must include scheme (http:// or https://)")
            } else {
                ValidationResult::err(format!("Invalid URL: {e}"))
            }
        }
    }
}

/// Validate probe period
pub fn validate_period(period: Duration) -> ValidationResult {
    if period.is_zero() {
        return ValidationResult::err("Period must be greater than zero");
    }

    ValidationResult::ok()
}

/// Parse a period such as `200ms`, `30s`, `1h30m` or `1h 30m`
pub fn parse_period(raw: &str) -> Result<Duration, JobError> {
    let period = humantime::parse_duration(raw.trim())
        .map_err(|e| JobError::bad_request(format!("Invalid period '{raw}': {e}")))?;

    validate_period(period).to_result()?;
    Ok(period)
}
