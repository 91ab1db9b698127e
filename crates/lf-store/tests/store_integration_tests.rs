//! Integration tests for the dataset store repositories.
//!
//! Each test builds a small project in an in-memory store and checks the
//! repository functions against it, including the live/snapshot scoping.

use lf_core::{ChartPoint, ModelStatus, ProjectType, SetScores, Split, SplitRatio, TrainingStatus};
use lf_store::repo::classes::{self, ClassDeletion};
use lf_store::repo::images::{self, NewImage};
use lf_store::repo::models::{self, ChartKind, NewModel, NewPrediction, NewReport};
use lf_store::repo::training::{self, NewTrainingRecord, SubmittedCounts};
use lf_store::repo::{labels, projects, snapshots, splits, tags};
use lf_store::{DatasetScope, StoreDb, StoreError};

// ── Helpers ────────────────────────────────────────────────────────────

const BOX: &str = r#"{"x":1,"y":1,"width":4,"height":4}"#;

struct Fixture {
    db: StoreDb,
    project_id: i64,
    cat: i64,
    dog: i64,
    images: Vec<i64>,
}

/// Four images: two cats, one cat+dog, one no-class.
fn fixture() -> Fixture {
    let db = StoreDb::open_memory().unwrap();
    let (project_id, cat, dog, images) = db
        .transaction(|conn| -> Result<_, StoreError> {
            let project = projects::insert_project(conn, "pets", ProjectType::Detection, "u")?;
            let cat = classes::insert_class(conn, project.id, "cat", "#f00", None, "u")?;
            let dog = classes::insert_class(conn, project.id, "dog", "#0f0", Some("good"), "u")?;
            let mut ids = Vec::new();
            for name in ["1.jpg", "2.jpg", "3.jpg", "4.jpg"] {
                ids.push(images::insert_image(
                    conn,
                    project.id,
                    &NewImage::named(name, 100, 100),
                    "u",
                )?);
            }
            labels::insert_label(conn, ids[0], cat, BOX, "u")?;
            labels::insert_label(conn, ids[1], cat, BOX, "u")?;
            labels::insert_label(conn, ids[2], cat, BOX, "u")?;
            labels::insert_label(conn, ids[2], dog, BOX, "u")?;
            images::set_label_state(conn, ids[3], true, true)?;
            tags::insert_tag(conn, project.id, "outdoor", "#00f", "u")?;
            tags::insert_metadata(conn, project.id, "camera", Some("dslr"), "u")?;
            splits::upsert_split(conn, project.id, None, SplitRatio::default())?;
            Ok((project.id, cat, dog, ids))
        })
        .unwrap();
    Fixture {
        db,
        project_id,
        cat,
        dog,
        images,
    }
}

fn live(f: &Fixture) -> DatasetScope {
    DatasetScope::Live {
        project_id: f.project_id,
    }
}

// ── Images and counts ──────────────────────────────────────────────────

#[test]
fn dataset_counts_partition_images() {
    let f = fixture();
    f.db
        .with_conn(|conn| images::update_split(conn, f.images[0], Split::Training))
        .unwrap();
    let counts = f
        .db
        .with_conn(|conn| images::dataset_counts(conn, live(&f)))
        .unwrap();
    assert_eq!(counts.labeled, 3);
    assert_eq!(counts.no_class, 1);
    assert_eq!(counts.unlabeled, 0);
    assert_eq!(counts.train_count, 1);
    assert_eq!(counts.unassigned_count, 3);
}

#[test]
fn class_split_counts_count_distinct_images() {
    let f = fixture();
    let rows = f
        .db
        .with_conn(|conn| images::class_split_counts(conn, live(&f)))
        .unwrap();
    let cat = rows.iter().find(|r| r.class_id == f.cat).unwrap();
    let dog = rows.iter().find(|r| r.class_id == f.dog).unwrap();
    assert_eq!(cat.image_count, 3);
    assert_eq!(cat.split, Split::Unassigned);
    assert_eq!(dog.image_count, 1);
}

#[test]
fn update_splits_writes_every_row() {
    let f = fixture();
    let written = f
        .db
        .transaction(|conn| {
            images::update_splits(
                conn,
                &[(f.images[0], Split::Dev), (f.images[1], Split::Test)],
            )
        })
        .unwrap();
    assert_eq!(written, 2);
    let img = f
        .db
        .with_conn(|conn| images::get_image(conn, f.images[1]))
        .unwrap()
        .unwrap();
    assert_eq!(img.split, Split::Test);
}

// ── Classes and splits ─────────────────────────────────────────────────

#[test]
fn class_in_use_is_not_deleted() {
    let f = fixture();
    let outcome = f
        .db
        .with_conn(|conn| classes::delete_class(conn, f.dog))
        .unwrap();
    assert_eq!(
        outcome,
        ClassDeletion::InUse {
            label_count: 1,
            split_count: 0
        }
    );
}

#[test]
fn unused_class_is_deleted() {
    let f = fixture();
    let outcome = f
        .db
        .with_conn(|conn| {
            let id = classes::insert_class(conn, f.project_id, "bird", "#fff", None, "u")?;
            classes::delete_class(conn, id)
        })
        .unwrap();
    assert_eq!(outcome, ClassDeletion::Deleted);
    assert_eq!(
        f.db.with_conn(|conn| classes::delete_class(conn, 9999)).unwrap(),
        ClassDeletion::NotFound
    );
}

#[test]
fn upsert_split_replaces_existing_row() {
    let f = fixture();
    let ratio = SplitRatio::new(80, 10, 10).unwrap();
    f.db
        .with_conn(|conn| splits::upsert_split(conn, f.project_id, None, ratio))
        .unwrap();
    f.db
        .with_conn(|conn| splits::upsert_split(conn, f.project_id, Some(f.cat), ratio))
        .unwrap();
    let rows = f
        .db
        .with_conn(|conn| splits::list_splits(conn, live(&f)))
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.ratio == ratio));
}

// ── Snapshots ──────────────────────────────────────────────────────────

#[test]
fn snapshot_copy_is_independent_of_live_rows() {
    let f = fixture();
    let snapshot = f
        .db
        .transaction(|conn| {
            let s = snapshots::insert_snapshot(conn, f.project_id, "v1", None, "u")?;
            snapshots::copy_live_into_snapshot(conn, f.project_id, s.id)?;
            Ok::<_, StoreError>(s)
        })
        .unwrap();
    let scope = DatasetScope::Snapshot {
        snapshot_id: snapshot.id,
    };

    f.db
        .with_conn(|conn| images::delete_image(conn, f.images[0]))
        .unwrap();

    let frozen = f
        .db
        .with_conn(|conn| images::list_images(conn, scope))
        .unwrap();
    assert_eq!(frozen.len(), 4);
    assert_eq!(frozen[0].id, f.images[0]);
    let frozen_labels = f
        .db
        .with_conn(|conn| labels::list_labels(conn, scope))
        .unwrap();
    assert_eq!(frozen_labels.len(), 4);
    let frozen_tags = f.db.with_conn(|conn| tags::list_tags(conn, scope)).unwrap();
    assert_eq!(frozen_tags.len(), 1);
}

#[test]
fn restore_brings_back_original_ids() {
    let f = fixture();
    let snapshot_id = f
        .db
        .transaction(|conn| {
            let s = snapshots::insert_snapshot(conn, f.project_id, "v1", None, "u")?;
            snapshots::copy_live_into_snapshot(conn, f.project_id, s.id)?;
            images::delete_image(conn, f.images[2])?;
            Ok::<_, StoreError>(s.id)
        })
        .unwrap();

    f.db
        .transaction(|conn| snapshots::restore_into_live(conn, f.project_id, snapshot_id))
        .unwrap();

    let ids: Vec<i64> = f
        .db
        .with_conn(|conn| images::list_images(conn, live(&f)))
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(ids, f.images);
}

#[test]
fn snapshot_lookup_by_name_is_case_sensitive() {
    let f = fixture();
    f.db
        .with_conn(|conn| snapshots::insert_snapshot(conn, f.project_id, "Baseline", None, "u"))
        .unwrap();
    let exact = f
        .db
        .with_conn(|conn| snapshots::find_snapshot_by_name(conn, f.project_id, "Baseline"))
        .unwrap();
    let lower = f
        .db
        .with_conn(|conn| snapshots::find_snapshot_by_name(conn, f.project_id, "baseline"))
        .unwrap();
    assert!(exact.is_some());
    assert!(lower.is_none());
}

#[test]
fn delete_snapshot_rows_removes_children() {
    let f = fixture();
    let snapshot_id = f
        .db
        .transaction(|conn| {
            let s = snapshots::insert_snapshot(conn, f.project_id, "v1", None, "u")?;
            snapshots::copy_live_into_snapshot(conn, f.project_id, s.id)?;
            Ok::<_, StoreError>(s.id)
        })
        .unwrap();
    f.db
        .transaction(|conn| snapshots::delete_snapshot_rows(conn, snapshot_id))
        .unwrap();
    let remaining = f
        .db
        .with_conn(|conn| {
            images::list_images(
                conn,
                DatasetScope::Snapshot { snapshot_id },
            )
        })
        .unwrap();
    assert!(remaining.is_empty());
    assert!(f
        .db
        .with_conn(|conn| snapshots::get_snapshot(conn, snapshot_id))
        .unwrap()
        .is_none());
}

// ── Training records ───────────────────────────────────────────────────

fn new_record(project_id: i64) -> NewTrainingRecord {
    NewTrainingRecord {
        project_id,
        snapshot_id: None,
        model_alias: "yolo".to_string(),
        epochs: 10,
        model_size: "s".to_string(),
        transform_param: None,
        augmentation_param: None,
    }
}

#[test]
fn record_walks_the_state_machine() {
    let f = fixture();
    let record = f
        .db
        .with_conn(|conn| training::insert_training_record(conn, &new_record(f.project_id), "u"))
        .unwrap();
    assert_eq!(record.status, TrainingStatus::Pending);
    assert_eq!(
        record.model_track_key,
        format!("{}-yolo-{}", f.project_id, record.id)
    );

    let before = f
        .db
        .with_conn(|conn| training::submitted_class_ids(conn, record.id))
        .unwrap();
    assert_eq!(before, None);

    let counts = SubmittedCounts {
        class_ids: vec![7, 3],
        ..SubmittedCounts::default()
    };
    let submitted = f
        .db
        .with_conn(|conn| training::mark_submitted(conn, record.id, "trk-1", counts, "u"))
        .unwrap();
    assert!(submitted);
    let order = f
        .db
        .with_conn(|conn| training::submitted_class_ids(conn, record.id))
        .unwrap();
    assert_eq!(order, Some(vec![7, 3]));

    let moved = f
        .db
        .with_conn(|conn| {
            training::transition_status(
                conn,
                record.id,
                TrainingStatus::Submitted,
                TrainingStatus::WaitForResult,
                None,
                None,
            )
        })
        .unwrap();
    assert!(moved);

    let loaded = f
        .db
        .with_conn(|conn| training::get_training_record(conn, record.id))
        .unwrap()
        .unwrap();
    assert_eq!(loaded.status, TrainingStatus::WaitForResult);
    assert_eq!(loaded.track_id.as_deref(), Some("trk-1"));
    assert!(loaded.started_at.is_some());
    assert!(loaded.completed_at.is_none());
}

#[test]
fn stale_transition_reports_false() {
    let f = fixture();
    let record = f
        .db
        .with_conn(|conn| training::insert_training_record(conn, &new_record(f.project_id), "u"))
        .unwrap();
    let moved = f
        .db
        .with_conn(|conn| {
            training::transition_status(
                conn,
                record.id,
                TrainingStatus::Submitted,
                TrainingStatus::Failed,
                Some("late"),
                None,
            )
        })
        .unwrap();
    assert!(!moved);
}

#[test]
fn illegal_transition_is_rejected() {
    let f = fixture();
    let result = f.db.with_conn(|conn| {
        training::transition_status(
            conn,
            1,
            TrainingStatus::Complete,
            TrainingStatus::Pending,
            None,
            None,
        )
    });
    assert!(matches!(result, Err(StoreError::IllegalTransition { .. })));
}

#[test]
fn list_by_status_orders_oldest_started_first() {
    let f = fixture();
    let ids: Vec<i64> = (0..3)
        .map(|_| {
            let r = f
                .db
                .with_conn(|conn| {
                    training::insert_training_record(conn, &new_record(f.project_id), "u")
                })
                .unwrap();
            f.db
                .with_conn(|conn| {
                    training::mark_submitted(conn, r.id, "t", SubmittedCounts::default(), "u")
                })
                .unwrap();
            r.id
        })
        .collect();
    let listed: Vec<i64> = f
        .db
        .with_conn(|conn| training::list_by_status(conn, TrainingStatus::Submitted, None))
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(listed, ids);

    let limited = f
        .db
        .with_conn(|conn| training::list_by_status(conn, TrainingStatus::Submitted, Some(2)))
        .unwrap();
    assert_eq!(limited.len(), 2);
}

// ── Models ─────────────────────────────────────────────────────────────

fn new_model(project_id: i64) -> NewModel {
    NewModel {
        project_id,
        training_record_id: 1,
        model_alias: "yolo".to_string(),
        track_id: "trk".to_string(),
        image_count: 4,
        label_count: 4,
        training: SetScores {
            f1: Some(0.9),
            precision: Some(0.8),
            recall: None,
        },
        dev: SetScores::default(),
        test: SetScores::default(),
    }
}

#[test]
fn model_versions_increase_per_alias() {
    let f = fixture();
    let (first, second) = f
        .db
        .with_conn(|conn| {
            let a = models::insert_model(conn, &new_model(f.project_id))?;
            let b = models::insert_model(conn, &new_model(f.project_id))?;
            Ok::<_, StoreError>((a, b))
        })
        .unwrap();
    assert_eq!(first.model_version, 1);
    assert_eq!(second.model_version, 2);
    assert_eq!(first.training.recall, None);
    assert_eq!(first.status, ModelStatus::Active);
}

#[test]
fn inactive_models_are_hidden_by_default() {
    let f = fixture();
    let model = f
        .db
        .with_conn(|conn| models::insert_model(conn, &new_model(f.project_id)))
        .unwrap();
    f.db
        .with_conn(|conn| models::set_model_status(conn, model.id, ModelStatus::Inactive))
        .unwrap();
    let active = f
        .db
        .with_conn(|conn| models::list_models(conn, f.project_id, false))
        .unwrap();
    let all = f
        .db
        .with_conn(|conn| models::list_models(conn, f.project_id, true))
        .unwrap();
    assert!(active.is_empty());
    assert_eq!(all.len(), 1);
}

#[test]
fn charts_and_predictions_copy_to_new_model() {
    let f = fixture();
    let (source, target) = f
        .db
        .transaction(|conn| {
            let source = models::insert_model(conn, &new_model(f.project_id))?;
            models::insert_report(
                conn,
                source.id,
                NewReport {
                    confidence_threshold: 0.5,
                    ..NewReport::default()
                },
            )?;
            models::insert_chart_points(
                conn,
                source.id,
                ChartKind::Loss,
                &[
                    ChartPoint { epoch: 2, value: 0.4 },
                    ChartPoint { epoch: 1, value: 0.9 },
                ],
            )?;
            models::insert_predictions(
                conn,
                source.id,
                &[NewPrediction {
                    image_id: f.images[0],
                    class_id: f.cat,
                    position: BOX.to_string(),
                    confidence_rate: 0.7,
                }],
            )?;
            let target = models::insert_model(conn, &NewModel::from(&source))?;
            models::copy_chart_points(conn, source.id, target.id)?;
            models::copy_predictions(conn, source.id, target.id)?;
            Ok::<_, StoreError>((source, target))
        })
        .unwrap();

    let loss = f
        .db
        .with_conn(|conn| models::list_chart_points(conn, target.id, ChartKind::Loss))
        .unwrap();
    assert_eq!(loss.iter().map(|p| p.epoch).collect::<Vec<_>>(), vec![1, 2]);
    let preds = f
        .db
        .with_conn(|conn| models::list_predictions(conn, target.id))
        .unwrap();
    assert_eq!(preds.len(), 1);
    assert_eq!(preds[0].model_id, target.id);

    let source_report = f
        .db
        .with_conn(|conn| models::get_report_for_model(conn, source.id))
        .unwrap()
        .unwrap();
    assert_eq!(source_report.confidence_threshold, 0.5);
    assert!(f
        .db
        .with_conn(|conn| models::get_report_for_model(conn, target.id))
        .unwrap()
        .is_none());
}
