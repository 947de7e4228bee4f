use thiserror::Error;

/// Errors returned by job management operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    /// No job is registered under this id
    #[error("could not find job {0}")]
    NotFound(String),

    /// The request was rejected before touching any state
    #[error("{0}")]
    BadRequest(String),
}

impl JobError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}
