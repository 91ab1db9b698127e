//! Shared test utilities for lf-engine

use crate::blobs::ImageBlobStore;
use crate::error::EngineResult;
use lf_core::{ChartPoint, ProjectType, SetScores, Split, TrainingStatus};
use lf_store::repo::images::NewImage;
use lf_store::repo::training::{self, NewTrainingRecord, SubmittedCounts};
use lf_store::repo::{classes, images, labels, projects};
use lf_store::{DatasetScope, StoreDb, StoreError};
use lf_trainer::{PredictedLabel, PredictionImage, ResultMetrics, ResultPayload};
use std::sync::Arc;

/// A 10x10 box at the origin, valid for any image at least that large.
pub const BOX_JSON: &str = r#"{"x":0,"y":0,"width":10,"height":10}"#;

/// Image storage with no files in it.
pub struct NoBlobs;

impl ImageBlobStore for NoBlobs {
    fn read(&self, _project_id: i64, _file_name: &str) -> EngineResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn copy_to_project(&self, _from: i64, _to: i64, _file_name: &str) -> EngineResult<bool> {
        Ok(false)
    }
}

pub fn no_blobs() -> Arc<dyn ImageBlobStore> {
    Arc::new(NoBlobs)
}

pub fn memory_store() -> Arc<StoreDb> {
    Arc::new(StoreDb::open_memory().unwrap())
}

pub fn seed_project(store: &StoreDb, name: &str, project_type: ProjectType) -> i64 {
    store
        .with_conn(|conn| projects::insert_project(conn, name, project_type, "tester"))
        .unwrap()
        .id
}

pub fn add_class(store: &StoreDb, project_id: i64, name: &str) -> i64 {
    store
        .with_conn(|conn| classes::insert_class(conn, project_id, name, "#808080", None, "tester"))
        .unwrap()
}

/// An image carrying one box label per entry of `class_ids`.
pub fn add_labeled_image(
    store: &StoreDb,
    project_id: i64,
    file_name: &str,
    class_ids: &[i64],
    split: Split,
) -> i64 {
    store
        .transaction(|conn| -> Result<i64, StoreError> {
            let image = NewImage {
                split,
                ..NewImage::named(file_name, 100, 100)
            };
            let id = images::insert_image(conn, project_id, &image, "tester")?;
            for class_id in class_ids {
                labels::insert_label(conn, id, *class_id, BOX_JSON, "tester")?;
            }
            Ok(id)
        })
        .unwrap()
}

/// An image marked as showing none of the project's classes.
pub fn add_no_class_image(store: &StoreDb, project_id: i64, file_name: &str, split: Split) -> i64 {
    store
        .with_conn(|conn| -> Result<i64, StoreError> {
            let image = NewImage {
                split,
                is_labeled: true,
                is_no_class: true,
                ..NewImage::named(file_name, 100, 100)
            };
            images::insert_image(conn, project_id, &image, "tester")
        })
        .unwrap()
}

pub fn add_unlabeled_image(store: &StoreDb, project_id: i64, file_name: &str) -> i64 {
    store
        .with_conn(|conn| {
            images::insert_image(conn, project_id, &NewImage::named(file_name, 100, 100), "tester")
        })
        .unwrap()
}

/// `count` images labeled with `class_id`, named `{prefix}{n}.jpg`.
pub fn add_class_images(
    store: &StoreDb,
    project_id: i64,
    class_id: i64,
    prefix: &str,
    count: usize,
) -> Vec<i64> {
    (0..count)
        .map(|n| {
            add_labeled_image(
                store,
                project_id,
                &format!("{prefix}{n}.jpg"),
                &[class_id],
                Split::Unassigned,
            )
        })
        .collect()
}

/// A training record already submitted as `track_id` and waiting for its
/// result, as the orchestrator leaves it.
pub fn add_waiting_record(
    store: &StoreDb,
    project_id: i64,
    snapshot_id: Option<i64>,
    model_alias: &str,
    track_id: &str,
) -> i64 {
    store
        .transaction(|conn| -> Result<i64, StoreError> {
            let new = NewTrainingRecord {
                project_id,
                snapshot_id,
                model_alias: model_alias.to_string(),
                epochs: 10,
                model_size: "s".to_string(),
                transform_param: None,
                augmentation_param: None,
            };
            let record = training::insert_training_record(conn, &new, "tester")?;
            let scope = DatasetScope::of(project_id, snapshot_id);
            let counts = SubmittedCounts {
                training: 3,
                dev: 1,
                test: 1,
                labels: 6,
                class_ids: classes::list_classes(conn, scope)?
                    .iter()
                    .map(|c| c.id)
                    .collect(),
            };
            training::mark_submitted(conn, record.id, track_id, counts, "tester")?;
            training::transition_status(
                conn,
                record.id,
                TrainingStatus::Submitted,
                TrainingStatus::WaitForResult,
                None,
                None,
            )?;
            Ok(record.id)
        })
        .unwrap()
}

/// One predicted box for `image_id` at label index `class_seq`.
pub fn prediction(image_id: i64, class_seqs: &[(usize, f64)]) -> PredictionImage {
    PredictionImage {
        image_id,
        labels: class_seqs
            .iter()
            .map(|(class_seq, confidence)| PredictedLabel {
                class_seq: *class_seq,
                position: serde_json::json!({"x": 1, "y": 1, "width": 5, "height": 5}),
                confidence: *confidence,
            })
            .collect(),
    }
}

/// A ready result with fixed rates, two-epoch charts, and `predictions`.
pub fn ready_result(confidence_threshold: f64, predictions: Vec<PredictionImage>) -> ResultPayload {
    let scores = SetScores {
        f1: Some(0.8),
        precision: Some(0.9),
        recall: Some(0.7),
    };
    ResultPayload {
        ready: true,
        metrics: Some(ResultMetrics {
            training_correct_rate: 0.95,
            dev_correct_rate: 0.85,
            test_correct_rate: 0.8,
            confidence_threshold,
            training: scores,
            dev: scores,
            test: scores,
        }),
        loss_chart: Some(vec![
            ChartPoint { epoch: 2, value: 0.4 },
            ChartPoint { epoch: 1, value: 0.9 },
        ]),
        validation_chart: Some(vec![ChartPoint { epoch: 1, value: 0.5 }]),
        prediction_images: Some(predictions),
    }
}
