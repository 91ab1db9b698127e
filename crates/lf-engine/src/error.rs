//! Error taxonomy for engine operations.
//!
//! Every failure maps onto one [`ErrorKind`] so a controller layer can render
//! `{kind, message}` without matching on variants.

use lf_core::CoreError;
use lf_store::StoreError;
use lf_trainer::ServiceError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Closed set of error categories exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    ExternalService,
    PartialFailure,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::ExternalService => "external_service",
            ErrorKind::PartialFailure => "partial_failure",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// L001: Missing project, snapshot, training record, model, image, or class
    #[error("[L001] {entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// L002: Operation collides with existing state
    #[error("[L002] Conflict: {0}")]
    Conflict(String),

    /// L003: Request rejected before any state changed
    #[error("[L003] Validation failed: {0}")]
    Validation(String),

    /// L004: Training service unreachable or misbehaving
    #[error("[L004] {0}")]
    ExternalService(#[from] ServiceError),

    /// L005: Some units of a batch failed
    #[error("[L005] {failed} of {total} failed: {}", errors.join("; "))]
    PartialFailure {
        failed: usize,
        total: usize,
        errors: Vec<String>,
    },

    /// L006: Dataset store failure
    #[error("[L006] {0}")]
    Store(#[from] StoreError),

    /// L007: Domain value rejected by lf-core
    #[error("[L007] {0}")]
    Core(#[from] CoreError),

    /// L008: Dataset archive could not be built
    #[error("[L008] Dataset export failed: {0}")]
    Export(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Validation(_) | EngineError::Core(_) => ErrorKind::Validation,
            EngineError::ExternalService(_) => ErrorKind::ExternalService,
            EngineError::PartialFailure { .. } => ErrorKind::PartialFailure,
            EngineError::Store(_) | EngineError::Export(_) => ErrorKind::Internal,
        }
    }
}

/// Aggregate outcome of a batch (multi-config training, poller tick).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub total_records: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Units examined but left for a later run
    pub pending_count: usize,
    pub errors: Vec<String>,
}

impl ProcessingResult {
    pub fn record_success(&mut self) {
        self.total_records += 1;
        self.success_count += 1;
    }

    pub fn record_pending(&mut self) {
        self.total_records += 1;
        self.pending_count += 1;
    }

    pub fn record_failure(&mut self, message: String) {
        self.total_records += 1;
        self.failure_count += 1;
        self.errors.push(message);
    }

    /// `PartialFailure` when any unit failed.
    pub fn into_result(self) -> EngineResult<ProcessingResult> {
        if self.failure_count == 0 {
            Ok(self)
        } else {
            Err(EngineError::PartialFailure {
                failed: self.failure_count,
                total: self.total_records,
                errors: self.errors,
            })
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
