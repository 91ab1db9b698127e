//! The training service seam.

use crate::error::ServiceResult;
use crate::wire::{JobStatus, ResultPayload, SubmitRequest};
use async_trait::async_trait;

/// External training service.
///
/// Implementations must be Send + Sync so one instance can be shared by
/// request handlers and the result poller.
#[async_trait]
pub trait TrainingService: Send + Sync {
    /// Submit a dataset archive with its model configuration, returning the track id
    async fn submit(&self, archive: Vec<u8>, request: &SubmitRequest) -> ServiceResult<String>;

    /// Current job state; progress fields are hints only
    async fn status(&self, track_id: &str) -> ServiceResult<JobStatus>;

    /// Fetch results. `ready == false` means ask again later
    async fn poll_result(&self, track_id: &str) -> ServiceResult<ResultPayload>;

    /// Ask the service to stop a job. Best effort
    async fn cancel(&self, track_id: &str) -> ServiceResult<()>;

    /// Implementation name for logging
    fn name(&self) -> &'static str;
}
