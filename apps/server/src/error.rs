use std::io::Error as IoError;

use actix_web::{HttpResponse, ResponseError, http::StatusCode, http::header};
use pinger_service::JobError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Errors that end the process
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("Address parsing error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    #[error("Startup failed: {0:#}")]
    Startup(#[from] anyhow::Error),
    #[error("Sink pump stopped: {0}")]
    Pump(#[from] pinger_service::pipeline::PumpError),
}

/// Errors surfaced to HTTP clients
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("internal server error")]
    Internal(#[source] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::NotFound(_) => Self::NotFound(e.to_string()),
            JobError::BadRequest(msg) => Self::BadRequest(msg),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let Self::Internal(e) = self {
            error!("Request failed: {e:#}");
        }

        let mut response = HttpResponse::build(self.status_code());
        if matches!(self, Self::Unauthorized(_)) {
            response.insert_header((header::WWW_AUTHENTICATE, "Basic"));
        }
        response.json(ErrorBody { error: self.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_of(e: ApiError) -> serde_json::Value {
        let bytes = to_bytes(e.error_response().into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[actix_web::test]
    async fn test_job_errors_map_to_statuses() {
        let not_found = ApiError::from(JobError::NotFound("42".into()));
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(not_found).await["error"], "could not find job 42");

        let bad = ApiError::from(JobError::bad_request("Period must be greater than zero"));
        assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_unauthorized_challenges_for_basic() {
        let response = ApiError::Unauthorized("Unauthorized".into()).error_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Basic");
    }

    #[actix_web::test]
    async fn test_internal_hides_cause() {
        let e = ApiError::from(anyhow::anyhow!("disk I/O error"));
        assert_eq!(body_of(e).await["error"], "internal server error");
    }
}
