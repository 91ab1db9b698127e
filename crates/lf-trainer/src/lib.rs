//! lf-trainer - External training service client for Labelforge
//!
//! Training runs on a separate service. This crate defines the
//! [`TrainingService`] seam the orchestrator and poller talk to, the JSON
//! payloads exchanged with it, and an HTTP implementation.

pub mod error;
pub mod http;
pub mod service;
pub mod wire;

#[cfg(any(test, feature = "test-support"))]
pub mod scripted;

pub use error::{ServiceError, ServiceResult};
pub use http::HttpTrainingService;
pub use service::TrainingService;
pub use wire::{
    JobState, JobStatus, PredictedLabel, PredictionImage, ResultMetrics, ResultPayload,
    SubmitRequest,
};

#[cfg(any(test, feature = "test-support"))]
pub use scripted::ScriptedTrainingService;
