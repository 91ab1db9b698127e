//! Training Orchestrator.
//!
//! Each model configuration becomes one training record that walks
//! `PENDING -> SUBMITTED -> WAITFORRESULT`. Only the poller moves a record
//! out of `WAITFORRESULT` into `COMPLETE` or `FAILED`.

use crate::blobs::ImageBlobStore;
use crate::error::{EngineError, EngineResult, ProcessingResult};
use crate::export::{export_dataset, DatasetExport};
use chrono::{DateTime, Utc};
use duckdb::Connection;
use lf_core::{CoreError, ModelConfig, Project, ProjectType, TrainingRecord, TrainingStatus};
use lf_store::repo::training::{self, NewTrainingRecord, SubmittedCounts};
use lf_store::repo::{models, projects, snapshots};
use lf_store::{DatasetScope, StoreDb};
use lf_trainer::{JobState, SubmitRequest, TrainingService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTrainingRequest {
    pub project_id: i64,
    /// Train on this snapshot instead of the live dataset
    #[serde(default)]
    pub snapshot_id: Option<i64>,
    pub configs: Vec<ModelConfig>,
}

/// Outcome of one configuration of a multi-config start.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOutcome {
    pub model_alias: String,
    /// Absent when the configuration was rejected before a record existed
    pub record: Option<TrainingRecord>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiTrainingResult {
    pub outcomes: Vec<ConfigOutcome>,
    pub summary: ProcessingResult,
}

impl MultiTrainingResult {
    /// Records that were created, in configuration order.
    pub fn records(&self) -> impl Iterator<Item = &TrainingRecord> {
        self.outcomes.iter().filter_map(|o| o.record.as_ref())
    }
}

/// Best-effort progress view. Missing progress is not a failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingStatusView {
    pub id: i64,
    pub status: TrainingStatus,
    pub progress: Option<f64>,
    pub current_phase: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub estimated_completion_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Models produced by a `COMPLETE` record
    pub model_ids: Vec<i64>,
}

/// A launch that stopped early, with the record it left behind if any.
struct LaunchFailure {
    record_id: Option<i64>,
    error: EngineError,
}

impl From<EngineError> for LaunchFailure {
    fn from(error: EngineError) -> Self {
        LaunchFailure {
            record_id: None,
            error,
        }
    }
}

impl From<CoreError> for LaunchFailure {
    fn from(err: CoreError) -> Self {
        EngineError::from(err).into()
    }
}

fn require_project(conn: &Connection, project_id: i64) -> EngineResult<Project> {
    projects::get_project(conn, project_id)?
        .ok_or_else(|| EngineError::not_found("project", project_id))
}

fn require_record(conn: &Connection, id: i64) -> EngineResult<TrainingRecord> {
    training::get_training_record(conn, id)?
        .ok_or_else(|| EngineError::not_found("training record", id))
}

/// Check that `snapshot_id`, when given, belongs to `project_id`.
fn check_snapshot(conn: &Connection, project_id: i64, snapshot_id: Option<i64>) -> EngineResult<()> {
    let Some(snapshot_id) = snapshot_id else {
        return Ok(());
    };
    let snapshot = snapshots::get_snapshot(conn, snapshot_id)?
        .ok_or_else(|| EngineError::not_found("snapshot", snapshot_id))?;
    if snapshot.project_id != project_id {
        return Err(EngineError::Validation(format!(
            "snapshot {snapshot_id} belongs to project {}, not {project_id}",
            snapshot.project_id
        )));
    }
    Ok(())
}

fn json_text(value: &Option<serde_json::Value>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

/// Ask the service whether a `SUBMITTED` job is alive and move the record on.
///
/// A live job moves to `WAITFORRESULT`, a failed one to `FAILED`. When the
/// service cannot answer the record stays `SUBMITTED` for a later attempt.
pub(crate) async fn confirm_submission(
    store: &StoreDb,
    service: &dyn TrainingService,
    record_id: i64,
    track_id: &str,
) -> EngineResult<TrainingStatus> {
    let status = match service.status(track_id).await {
        Ok(status) => status,
        Err(e) => {
            log::warn!("Could not confirm training job {track_id} of record {record_id}: {e}");
            return Ok(TrainingStatus::Submitted);
        }
    };
    let (target, message) = if status.state.is_alive() {
        (TrainingStatus::WaitForResult, None)
    } else {
        let message = status
            .message
            .unwrap_or_else(|| format!("training job {track_id} reported {:?}", status.state));
        (TrainingStatus::Failed, Some(message))
    };
    let moved = store.with_conn(|conn| {
        training::transition_status(
            conn,
            record_id,
            TrainingStatus::Submitted,
            target,
            message.as_deref(),
            None,
        )
    })?;
    if moved {
        log::debug!("Training record {record_id} is now {target}");
        Ok(target)
    } else {
        Ok(store.with_conn(|conn| require_record(conn, record_id))?.status)
    }
}

pub struct TrainingOrchestrator {
    store: Arc<StoreDb>,
    blobs: Arc<dyn ImageBlobStore>,
    service: Arc<dyn TrainingService>,
}

impl TrainingOrchestrator {
    pub fn new(
        store: Arc<StoreDb>,
        blobs: Arc<dyn ImageBlobStore>,
        service: Arc<dyn TrainingService>,
    ) -> Self {
        Self {
            store,
            blobs,
            service,
        }
    }

    /// Launch one training record per configuration.
    ///
    /// A failing configuration never stops its siblings; each outcome is
    /// reported on its own and tallied in the summary.
    pub async fn start_multi_config_training(
        &self,
        request: &StartTrainingRequest,
        user: &str,
    ) -> EngineResult<MultiTrainingResult> {
        if request.configs.is_empty() {
            return Err(EngineError::Validation(
                "at least one model configuration is required".to_string(),
            ));
        }
        self.store.with_conn(|conn| {
            require_project(conn, request.project_id)?;
            check_snapshot(conn, request.project_id, request.snapshot_id)
        })?;

        let mut outcomes = Vec::with_capacity(request.configs.len());
        let mut summary = ProcessingResult::default();
        for config in &request.configs {
            let outcome = match self
                .launch(request.project_id, request.snapshot_id, config, user)
                .await
            {
                Ok(record) => {
                    summary.record_success();
                    ConfigOutcome {
                        model_alias: config.model_alias.clone(),
                        record: Some(record),
                        error: None,
                    }
                }
                Err(failure) => {
                    let message = failure.error.to_string();
                    log::warn!(
                        "Training configuration '{}' of project {} failed: {message}",
                        config.model_alias,
                        request.project_id
                    );
                    summary.record_failure(format!("{}: {message}", config.model_alias));
                    let record = match failure.record_id {
                        Some(id) => self
                            .store
                            .with_conn(|conn| training::get_training_record(conn, id))?,
                        None => None,
                    };
                    ConfigOutcome {
                        model_alias: config.model_alias.clone(),
                        record,
                        error: Some(message),
                    }
                }
            };
            outcomes.push(outcome);
        }

        log::info!(
            "Started training for project {} by {user}: {} of {} configurations submitted",
            request.project_id,
            summary.success_count,
            summary.total_records
        );
        Ok(MultiTrainingResult { outcomes, summary })
    }

    /// Export the dataset, submit it with `config`, and store the track id.
    pub async fn create_training_record(
        &self,
        project_id: i64,
        snapshot_id: Option<i64>,
        config: &ModelConfig,
        user: &str,
    ) -> EngineResult<TrainingRecord> {
        self.launch(project_id, snapshot_id, config, user)
            .await
            .map_err(|failure| failure.error)
    }

    async fn launch(
        &self,
        project_id: i64,
        snapshot_id: Option<i64>,
        config: &ModelConfig,
        user: &str,
    ) -> Result<TrainingRecord, LaunchFailure> {
        let resolved = config.resolve()?;
        let epochs = i32::try_from(resolved.epochs).map_err(|_| {
            EngineError::Validation(format!("epochs {} out of range", resolved.epochs))
        })?;

        let (record, project_type) = self.store.with_conn(|conn| {
            let project = require_project(conn, project_id)?;
            check_snapshot(conn, project_id, snapshot_id)?;
            let new = NewTrainingRecord {
                project_id,
                snapshot_id,
                model_alias: resolved.model_alias.clone(),
                epochs,
                model_size: resolved.model_size.clone(),
                transform_param: json_text(&resolved.transform_param),
                augmentation_param: json_text(&resolved.augmentation_param),
            };
            let record = training::insert_training_record(conn, &new, user)?;
            Ok::<_, EngineError>((record, project.project_type))
        })?;
        log::debug!(
            "Created training record {} ({}) for project {project_id}",
            record.id,
            record.model_track_key
        );

        match self
            .submit_record(&record, &resolved, project_type, user)
            .await
        {
            Ok(record) => Ok(record),
            Err(error) => {
                self.fail_if_unconfirmed(record.id, &error.to_string());
                Err(LaunchFailure {
                    record_id: Some(record.id),
                    error,
                })
            }
        }
    }

    async fn submit_record(
        &self,
        record: &TrainingRecord,
        config: &ModelConfig,
        project_type: ProjectType,
        user: &str,
    ) -> EngineResult<TrainingRecord> {
        let scope = DatasetScope::of(record.project_id, record.snapshot_id);
        let DatasetExport {
            archive,
            summary,
            class_names,
            class_ids,
        } = self
            .store
            .with_conn(|conn| export_dataset(conn, scope, project_type, self.blobs.as_ref()))?;
        if summary.image_count() == 0 {
            return Err(EngineError::Validation(format!(
                "{scope} has no images assigned to training, dev, or test"
            )));
        }

        let request = SubmitRequest {
            project_id: record.project_id,
            model_track_key: record.model_track_key.clone(),
            model_alias: config.model_alias.clone(),
            project_type,
            epochs: config.epochs,
            model_size: config.model_size.clone(),
            transform_param: config.transform_param.clone(),
            augmentation_param: config.augmentation_param.clone(),
            class_names,
        };
        let track_id = self.service.submit(archive, &request).await?;

        let counts = SubmittedCounts {
            training: summary.training,
            dev: summary.dev,
            test: summary.test,
            labels: summary.labels,
            class_ids,
        };
        let submitted = self.store.with_conn(|conn| {
            training::mark_submitted(conn, record.id, &track_id, counts, user)
        })?;
        if !submitted {
            log::warn!(
                "Training record {} left PENDING before submission finished; withdrawing job {track_id}",
                record.id
            );
            self.notify_cancel(record.id, &track_id).await;
            return self.store.with_conn(|conn| require_record(conn, record.id));
        }
        log::info!(
            "Submitted training record {} as job {track_id} on {} ({} images, {} labels)",
            record.id,
            self.service.name(),
            summary.image_count(),
            summary.labels
        );

        confirm_submission(&self.store, self.service.as_ref(), record.id, &track_id).await?;
        self.store.with_conn(|conn| require_record(conn, record.id))
    }

    /// Mark a record that never got past submission as `FAILED`.
    fn fail_if_unconfirmed(&self, record_id: i64, message: &str) {
        let result = self.store.with_conn(|conn| {
            let record = require_record(conn, record_id)?;
            if matches!(
                record.status,
                TrainingStatus::Pending | TrainingStatus::Submitted
            ) {
                training::transition_status(
                    conn,
                    record_id,
                    record.status,
                    TrainingStatus::Failed,
                    Some(message),
                    None,
                )?;
            }
            Ok::<_, EngineError>(())
        });
        if let Err(e) = result {
            log::error!("Could not mark training record {record_id} as failed: {e}");
        }
    }

    async fn notify_cancel(&self, record_id: i64, track_id: &str) {
        if let Err(e) = self.service.cancel(track_id).await {
            log::warn!("Training service did not acknowledge cancel of job {track_id} (record {record_id}): {e}");
        }
    }

    pub async fn get_training_status(&self, id: i64) -> EngineResult<TrainingStatusView> {
        let record = self.store.with_conn(|conn| require_record(conn, id))?;
        let mut view = TrainingStatusView {
            id: record.id,
            status: record.status,
            progress: None,
            current_phase: None,
            started_at: record.started_at,
            estimated_completion_at: None,
            error_message: record.error_message.clone(),
            model_ids: Vec::new(),
        };
        match (record.status, record.track_id.as_deref()) {
            (TrainingStatus::Submitted | TrainingStatus::WaitForResult, Some(track_id)) => {
                match self.service.status(track_id).await {
                    Ok(status) => {
                        view.progress = status.progress;
                        view.current_phase = status.phase;
                        view.estimated_completion_at = status.estimated_completion_at;
                        if status.state == JobState::Finished {
                            view.current_phase.get_or_insert_with(|| "awaiting results".to_string());
                        }
                    }
                    Err(e) => log::debug!("No progress for job {track_id}: {e}"),
                }
            }
            (TrainingStatus::Complete, _) => {
                view.progress = Some(1.0);
                view.model_ids = self
                    .store
                    .with_conn(|conn| models::models_for_training_record(conn, id))?
                    .iter()
                    .map(|m| m.id)
                    .collect();
            }
            _ => {}
        }
        Ok(view)
    }

    /// Cancel a non-terminal record and tell the service, best effort.
    pub async fn cancel_training(&self, id: i64, user: &str) -> EngineResult<TrainingRecord> {
        let record = self.store.with_conn(|conn| {
            let record = require_record(conn, id)?;
            if record.status.is_terminal() {
                return Err(EngineError::Conflict(format!(
                    "training record {id} is already {}",
                    record.status
                )));
            }
            let moved = training::transition_status(
                conn,
                id,
                record.status,
                TrainingStatus::Cancelled,
                None,
                Some(user),
            )?;
            if !moved {
                return Err(EngineError::Conflict(format!(
                    "training record {id} changed state during cancel"
                )));
            }
            require_record(conn, id)
        })?;
        log::info!("Training record {id} cancelled by {user}");

        if let Some(track_id) = record.track_id.as_deref() {
            self.notify_cancel(id, track_id).await;
        }
        Ok(record)
    }

    pub fn list_training_records(&self, project_id: i64) -> EngineResult<Vec<TrainingRecord>> {
        self.store.with_conn(|conn| {
            require_project(conn, project_id)?;
            Ok(training::list_training_records(conn, project_id)?)
        })
    }

    pub fn get_training_record(&self, id: i64) -> EngineResult<TrainingRecord> {
        self.store.with_conn(|conn| require_record(conn, id))
    }
}

#[cfg(test)]
#[path = "training_test.rs"]
mod tests;
