//! Training Result Poller.
//!
//! A tick first promotes `SUBMITTED` records whose job is confirmed, then
//! asks the service for the result of every `WAITFORRESULT` record,
//! oldest-started first. Ready results are persisted in one transaction per
//! record. A record that errors is marked `FAILED` and the tick moves on.

use crate::error::{EngineError, EngineResult, ProcessingResult};
use crate::training::confirm_submission;
use duckdb::Connection;
use lf_core::{TrainingRecord, TrainingStatus};
use lf_store::repo::models::{self, ChartKind, NewModel, NewPrediction, NewReport};
use lf_store::repo::{images, training};
use lf_store::{DatasetScope, StoreDb};
use lf_trainer::{ResultPayload, ServiceError, TrainingService};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

/// What happened to one `WAITFORRESULT` record during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollOutcome {
    Completed { model_id: i64 },
    NotReady,
    /// Another writer moved the record while its result was fetched
    Superseded,
}

pub struct ResultPoller {
    store: Arc<StoreDb>,
    service: Arc<dyn TrainingService>,
    batch_limit: Option<usize>,
    running: Mutex<()>,
}

impl ResultPoller {
    pub fn new(
        store: Arc<StoreDb>,
        service: Arc<dyn TrainingService>,
        batch_limit: Option<usize>,
    ) -> Self {
        Self {
            store,
            service,
            batch_limit,
            running: Mutex::new(()),
        }
    }

    /// Run one tick. Returns `None` when a previous tick is still running.
    pub async fn run_once(&self) -> EngineResult<Option<ProcessingResult>> {
        let Ok(_tick) = self.running.try_lock() else {
            log::debug!("Previous poll still running, skipping tick");
            return Ok(None);
        };

        self.promote_submitted().await?;

        let records = self.store.with_conn(|conn| {
            training::list_by_status(conn, TrainingStatus::WaitForResult, self.batch_limit)
        })?;
        let mut result = ProcessingResult::default();
        for record in &records {
            match self.process_record(record).await {
                Ok(PollOutcome::Completed { model_id }) => {
                    log::info!(
                        "Training record {} complete, model {model_id} created",
                        record.id
                    );
                    result.record_success();
                }
                Ok(PollOutcome::NotReady) => result.record_pending(),
                Ok(PollOutcome::Superseded) => {
                    log::debug!("Training record {} changed state during poll", record.id)
                }
                Err(e) => {
                    let message = e.to_string();
                    log::warn!("Training record {} failed: {message}", record.id);
                    self.mark_failed(record.id, &message);
                    result.record_failure(format!("training record {}: {message}", record.id));
                }
            }
        }

        log::info!(
            "Poll tick: {} records, {} completed, {} pending, {} failed",
            result.total_records,
            result.success_count,
            result.pending_count,
            result.failure_count
        );
        Ok(Some(result))
    }

    /// Tick every `period` until `shutdown` resolves. Late ticks are skipped.
    pub async fn run_forever<F>(&self, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        log::info!(
            "Result poller started against {} every {}s",
            self.service.name(),
            period.as_secs()
        );
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Result poller stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        log::error!("Poll tick aborted: {e}");
                    }
                }
            }
        }
    }

    async fn promote_submitted(&self) -> EngineResult<()> {
        let submitted = self.store.with_conn(|conn| {
            training::list_by_status(conn, TrainingStatus::Submitted, self.batch_limit)
        })?;
        for record in submitted {
            let Some(track_id) = record.track_id.as_deref() else {
                continue;
            };
            let status =
                confirm_submission(&self.store, self.service.as_ref(), record.id, track_id).await?;
            if status != TrainingStatus::Submitted {
                log::debug!("Promoted training record {} to {status}", record.id);
            }
        }
        Ok(())
    }

    async fn process_record(&self, record: &TrainingRecord) -> EngineResult<PollOutcome> {
        let track_id = record.track_id.as_deref().ok_or_else(|| {
            EngineError::Validation(format!("training record {} has no track id", record.id))
        })?;
        let payload = self.service.poll_result(track_id).await?;
        if !payload.ready {
            return Ok(PollOutcome::NotReady);
        }
        self.store
            .transaction(|conn| persist_result(conn, record, track_id, &payload))
    }

    fn mark_failed(&self, record_id: i64, message: &str) {
        let result = self.store.with_conn(|conn| {
            training::transition_status(
                conn,
                record_id,
                TrainingStatus::WaitForResult,
                TrainingStatus::Failed,
                Some(message),
                None,
            )
        });
        match result {
            Ok(true) => {}
            Ok(false) => log::debug!("Training record {record_id} left WAITFORRESULT before failing"),
            Err(e) => log::error!("Could not mark training record {record_id} as failed: {e}"),
        }
    }
}

fn malformed(message: String) -> EngineError {
    EngineError::ExternalService(ServiceError::MalformedPayload(message))
}

/// Write model, report, charts, and predictions, then complete the record.
fn persist_result(
    conn: &Connection,
    record: &TrainingRecord,
    track_id: &str,
    payload: &ResultPayload,
) -> EngineResult<PollOutcome> {
    match training::get_training_record(conn, record.id)? {
        Some(current) if current.status == TrainingStatus::WaitForResult => {}
        _ => return Ok(PollOutcome::Superseded),
    }
    let metrics = payload
        .metrics
        .as_ref()
        .ok_or_else(|| malformed(format!("result for {track_id} is ready but has no metrics")))?;

    let scope = DatasetScope::of(record.project_id, record.snapshot_id);
    // Label index -> class id, fixed when the archive was exported
    let class_ids = training::submitted_class_ids(conn, record.id)?.ok_or_else(|| {
        malformed(format!(
            "training record {} has no exported class order",
            record.id
        ))
    })?;
    let known_images: HashSet<i64> = images::list_images(conn, scope)?
        .iter()
        .map(|img| img.id)
        .collect();

    let mut predictions = Vec::new();
    let mut skipped = 0usize;
    for image in payload.prediction_images.iter().flatten() {
        if !known_images.contains(&image.image_id) {
            skipped += 1;
            continue;
        }
        for label in &image.labels {
            let class_id = class_ids.get(label.class_seq).copied().ok_or_else(|| {
                malformed(format!(
                    "prediction for image {} uses class index {} but the export had {} classes",
                    image.image_id,
                    label.class_seq,
                    class_ids.len()
                ))
            })?;
            predictions.push(NewPrediction {
                image_id: image.image_id,
                class_id,
                position: label.position.to_string(),
                confidence_rate: label.confidence,
            });
        }
    }
    if skipped > 0 {
        log::warn!(
            "Result for training record {} references {skipped} unknown images, their predictions were dropped",
            record.id
        );
    }

    let model = models::insert_model(
        conn,
        &NewModel {
            project_id: record.project_id,
            training_record_id: record.id,
            model_alias: record.model_alias.clone(),
            track_id: track_id.to_string(),
            image_count: record.training_count + record.dev_count + record.test_count,
            label_count: training::submitted_label_count(conn, record.id)?,
            training: metrics.training,
            dev: metrics.dev,
            test: metrics.test,
        },
    )?;
    models::insert_report(
        conn,
        model.id,
        NewReport {
            training_correct_rate: metrics.training_correct_rate,
            dev_correct_rate: metrics.dev_correct_rate,
            test_correct_rate: metrics.test_correct_rate,
            confidence_threshold: metrics.confidence_threshold,
        },
    )?;
    if let Some(points) = &payload.loss_chart {
        models::insert_chart_points(conn, model.id, ChartKind::Loss, points)?;
    }
    if let Some(points) = &payload.validation_chart {
        models::insert_chart_points(conn, model.id, ChartKind::Validation, points)?;
    }
    models::insert_predictions(conn, model.id, &predictions)?;

    let completed = training::transition_status(
        conn,
        record.id,
        TrainingStatus::WaitForResult,
        TrainingStatus::Complete,
        None,
        None,
    )?;
    if !completed {
        return Err(EngineError::Conflict(format!(
            "training record {} changed state while its result was stored",
            record.id
        )));
    }
    Ok(PollOutcome::Completed { model_id: model.id })
}

#[cfg(test)]
#[path = "poller_test.rs"]
mod tests;
