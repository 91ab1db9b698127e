//! In-memory training service driven by a script, for orchestrator and
//! poller tests.

use crate::error::{ServiceError, ServiceResult};
use crate::service::TrainingService;
use crate::wire::{JobStatus, ResultPayload, SubmitRequest};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// What `poll_result` answers for a track id.
#[derive(Debug, Clone)]
pub enum ScriptedResult {
    NotReady,
    Ready(ResultPayload),
    /// Fail the call with a transport error carrying this message
    Error(String),
}

/// A submission the service received.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub track_id: String,
    pub request: SubmitRequest,
    pub archive: Vec<u8>,
}

#[derive(Default)]
struct State {
    next_track: u32,
    submissions: Vec<RecordedSubmission>,
    rejected_aliases: HashSet<String>,
    statuses: HashMap<String, JobStatus>,
    status_errors: HashSet<String>,
    results: HashMap<String, ScriptedResult>,
    cancelled: Vec<String>,
    cancel_fails: bool,
}

#[derive(Default)]
pub struct ScriptedTrainingService {
    state: Mutex<State>,
}

impl ScriptedTrainingService {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Refuse every submission for `model_alias`.
    pub fn reject_alias(&self, model_alias: &str) {
        self.state().rejected_aliases.insert(model_alias.to_string());
    }

    pub fn set_status(&self, track_id: &str, status: JobStatus) {
        self.state().statuses.insert(track_id.to_string(), status);
    }

    /// Make `status(track_id)` fail.
    pub fn fail_status(&self, track_id: &str) {
        self.state().status_errors.insert(track_id.to_string());
    }

    pub fn set_result(&self, track_id: &str, result: ScriptedResult) {
        self.state().results.insert(track_id.to_string(), result);
    }

    /// Make `cancel` fail for every track id.
    pub fn fail_cancel(&self) {
        self.state().cancel_fails = true;
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.state().submissions.clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state().cancelled.clone()
    }
}

#[async_trait]
impl TrainingService for ScriptedTrainingService {
    async fn submit(&self, archive: Vec<u8>, request: &SubmitRequest) -> ServiceResult<String> {
        let mut state = self.state();
        if state.rejected_aliases.contains(&request.model_alias) {
            return Err(ServiceError::Rejected(format!(
                "alias '{}' is not accepted",
                request.model_alias
            )));
        }
        state.next_track += 1;
        let track_id = format!("track-{}", state.next_track);
        state.submissions.push(RecordedSubmission {
            track_id: track_id.clone(),
            request: request.clone(),
            archive,
        });
        Ok(track_id)
    }

    async fn status(&self, track_id: &str) -> ServiceResult<JobStatus> {
        let state = self.state();
        if state.status_errors.contains(track_id) {
            return Err(ServiceError::Transport(format!(
                "status for {track_id} unavailable"
            )));
        }
        Ok(state
            .statuses
            .get(track_id)
            .cloned()
            .unwrap_or_else(JobStatus::running))
    }

    async fn poll_result(&self, track_id: &str) -> ServiceResult<ResultPayload> {
        match self.state().results.get(track_id) {
            None | Some(ScriptedResult::NotReady) => Ok(ResultPayload::not_ready()),
            Some(ScriptedResult::Ready(payload)) => Ok(payload.clone()),
            Some(ScriptedResult::Error(message)) => Err(ServiceError::Transport(message.clone())),
        }
    }

    async fn cancel(&self, track_id: &str) -> ServiceResult<()> {
        let mut state = self.state();
        if state.cancel_fails {
            return Err(ServiceError::Transport("cancel endpoint down".to_string()));
        }
        state.cancelled.push(track_id.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
