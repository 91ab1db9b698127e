//! Error types for lf-trainer

use thiserror::Error;

/// Errors talking to the external training service.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// T001: Service unreachable or the request could not be sent
    #[error("[T001] Training service request failed: {0}")]
    Transport(String),

    /// T002: No response within the configured timeout
    #[error("[T002] Training service timed out: {0}")]
    Timeout(String),

    /// T003: Non-success HTTP status
    #[error("[T003] Training service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// T004: Response body did not match the expected payload
    #[error("[T004] Malformed training service payload: {0}")]
    MalformedPayload(String),

    /// T005: The service accepted the call but refused the job
    #[error("[T005] Training service rejected the request: {0}")]
    Rejected(String),

    /// T006: Track id the service does not know
    #[error("[T006] Unknown training job '{track_id}'")]
    UnknownJob { track_id: String },
}

/// Result type alias for ServiceError
pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout(err.to_string())
        } else if err.is_decode() {
            ServiceError::MalformedPayload(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}
