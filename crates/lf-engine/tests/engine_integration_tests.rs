//! End-to-end tests across the engines against an on-disk store.
//!
//! Each test builds a small project, drives it through the public engine
//! API, and checks the properties callers rely on: split totals, snapshot
//! immutability, revert idempotence, poller isolation, and matrix row sums.

use flate2::read::GzDecoder;
use lf_core::{ModelConfig, ProjectType, Split, SplitRatio, TrainingStatus};
use lf_engine::split::AssignSplitsRequest;
use lf_engine::test_utils::*;
use lf_engine::training::StartTrainingRequest;
use lf_engine::{
    DatasetService, ErrorKind, FsImageBlobStore, ImageBlobStore, MetricsAggregator, ResultPoller,
    SnapshotEngine, SplitEngine, TrainingOrchestrator,
};
use lf_store::repo::{classes, images, labels, splits};
use lf_store::{DatasetScope, StoreDb};
use lf_trainer::scripted::{ScriptedResult, ScriptedTrainingService};
use lf_trainer::TrainingService;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use tempfile::TempDir;

// ── Helpers ────────────────────────────────────────────────────────────

struct Workspace {
    _dir: TempDir,
    store: Arc<StoreDb>,
    blobs: Arc<FsImageBlobStore>,
}

fn workspace() -> Workspace {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(StoreDb::open(&dir.path().join("labelforge.duckdb")).unwrap());
    let blobs = Arc::new(FsImageBlobStore::new(dir.path().join("images")));
    Workspace {
        _dir: dir,
        store,
        blobs,
    }
}

fn write_image(blobs: &FsImageBlobStore, project_id: i64, file_name: &str) {
    let path = blobs.path_for(project_id, file_name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, format!("jpeg:{file_name}")).unwrap();
}

fn live_dataset(store: &StoreDb, project_id: i64) -> (Vec<lf_core::Image>, Vec<lf_core::ImageLabel>) {
    let scope = DatasetScope::Live { project_id };
    store
        .with_conn(|conn| -> Result<_, lf_store::StoreError> {
            Ok((images::list_images(conn, scope)?, labels::list_labels(conn, scope)?))
        })
        .unwrap()
}

fn archive_entries(archive: &[u8]) -> Vec<String> {
    let mut entries = Vec::new();
    let mut reader = tar::Archive::new(GzDecoder::new(archive));
    for entry in reader.entries().unwrap() {
        let mut entry = entry.unwrap();
        let mut sink = Vec::new();
        entry.read_to_end(&mut sink).unwrap();
        entries.push(entry.path().unwrap().to_string_lossy().into_owned());
    }
    entries.sort();
    entries
}

// ── Split assignment ───────────────────────────────────────────────────

#[test]
fn split_sixty_forty_example() {
    let ws = workspace();
    let project_id = seed_project(&ws.store, "ab", ProjectType::Detection);
    let a = add_class(&ws.store, project_id, "A");
    let b = add_class(&ws.store, project_id, "B");
    add_class_images(&ws.store, project_id, a, "a", 60);
    add_class_images(&ws.store, project_id, b, "b", 40);

    let engine = SplitEngine::new(Arc::clone(&ws.store), SplitRatio::default());
    let request = AssignSplitsRequest {
        project_id,
        ratio: Some(SplitRatio::new(70, 20, 10).unwrap()),
        ..AssignSplitsRequest::default()
    };
    let result = engine.assign_splits(&request, "u").unwrap();

    assert_eq!(result.updated_count, 100);
    let sizes: Vec<(usize, usize, usize)> = result
        .classes
        .iter()
        .map(|c| (c.sizes.training, c.sizes.dev, c.sizes.test))
        .collect();
    assert_eq!(sizes, vec![(42, 12, 6), (28, 8, 4)]);
    for class in &result.classes {
        assert_eq!(class.sizes.total(), class.candidates);
    }

    let preview = engine.get_split_preview(project_id).unwrap();
    assert_eq!(preview.by_class[0].training, 42);
    assert_eq!(preview.by_class[1].test, 4);
    assert_eq!(preview.by_class[0].unassigned, 0);
}

#[test]
fn split_totals_hold_for_uneven_classes() {
    let ws = workspace();
    let project_id = seed_project(&ws.store, "odd", ProjectType::Detection);
    let ratio = SplitRatio::new(33, 33, 34).unwrap();
    let mut expected = HashMap::new();
    for (name, count) in [("x", 7), ("y", 1), ("z", 0), ("w", 13)] {
        let class_id = add_class(&ws.store, project_id, name);
        add_class_images(&ws.store, project_id, class_id, name, count);
        expected.insert(class_id, count);
    }
    let engine = SplitEngine::new(Arc::clone(&ws.store), ratio);
    let result = engine
        .assign_splits(
            &AssignSplitsRequest {
                project_id,
                ..AssignSplitsRequest::default()
            },
            "u",
        )
        .unwrap();
    for class in &result.classes {
        assert_eq!(class.sizes.total(), expected[&class.class_id]);
    }
    assert_eq!(result.updated_count, 21);
}

// ── Snapshots ──────────────────────────────────────────────────────────

#[test]
fn snapshot_keeps_all_images_after_live_deletes() {
    let ws = workspace();
    let project_id = seed_project(&ws.store, "ten", ProjectType::Detection);
    let class_id = add_class(&ws.store, project_id, "c");
    let ids = add_class_images(&ws.store, project_id, class_id, "img", 10);

    let engine = SnapshotEngine::new(Arc::clone(&ws.store), ws.blobs.clone());
    let snapshot = engine
        .create_snapshot(project_id, "baseline", None, "u")
        .unwrap();
    let frozen_labels = engine.snapshot_labels(snapshot.id).unwrap();

    ws.store
        .transaction(|conn| -> Result<(), lf_store::StoreError> {
            for id in &ids[..3] {
                images::delete_image(conn, *id)?;
            }
            images::update_split(conn, ids[5], Split::Test)?;
            Ok(())
        })
        .unwrap();

    assert_eq!(live_dataset(&ws.store, project_id).0.len(), 7);
    let frozen = engine.snapshot_images(snapshot.id).unwrap();
    assert_eq!(frozen.len(), 10);
    assert!(frozen.iter().all(|img| img.split == Split::Unassigned));
    assert_eq!(engine.snapshot_labels(snapshot.id).unwrap(), frozen_labels);
}

#[test]
fn revert_twice_yields_identical_live_dataset() {
    let ws = workspace();
    let project_id = seed_project(&ws.store, "rev", ProjectType::Detection);
    let class_id = add_class(&ws.store, project_id, "c");
    let ids = add_class_images(&ws.store, project_id, class_id, "img", 4);
    add_no_class_image(&ws.store, project_id, "bg.jpg", Split::Dev);
    ws.store
        .with_conn(|conn| {
            splits::upsert_split(conn, project_id, Some(class_id), SplitRatio::default())
        })
        .unwrap();

    let engine = SnapshotEngine::new(Arc::clone(&ws.store), ws.blobs.clone());
    let snapshot = engine.create_snapshot(project_id, "v1", None, "u").unwrap();
    let before = live_dataset(&ws.store, project_id);

    ws.store
        .transaction(|conn| -> Result<(), lf_store::StoreError> {
            images::delete_image(conn, ids[0])?;
            labels::insert_label(conn, ids[1], class_id, BOX_JSON, "u")?;
            images::update_split(conn, ids[2], Split::Training)?;
            classes::insert_class(conn, project_id, "late", "#000000", None, "u")?;
            Ok(())
        })
        .unwrap();

    engine
        .revert_project_to_snapshot(snapshot.id, project_id, "u")
        .unwrap();
    let first = live_dataset(&ws.store, project_id);
    engine
        .revert_project_to_snapshot(snapshot.id, project_id, "u")
        .unwrap();
    let second = live_dataset(&ws.store, project_id);

    assert_eq!(first, before);
    assert_eq!(second, first);
    let live_classes = ws
        .store
        .with_conn(|conn| classes::list_classes(conn, DatasetScope::Live { project_id }))
        .unwrap();
    assert_eq!(live_classes.len(), 1);
}

#[test]
fn forked_project_gets_files_and_fresh_ids() {
    let ws = workspace();
    let project_id = seed_project(&ws.store, "src", ProjectType::Detection);
    let class_id = add_class(&ws.store, project_id, "c");
    let image_id = add_labeled_image(&ws.store, project_id, "f.jpg", &[class_id], Split::Training);
    write_image(&ws.blobs, project_id, "f.jpg");

    let engine = SnapshotEngine::new(Arc::clone(&ws.store), ws.blobs.clone());
    let snapshot = engine.create_snapshot(project_id, "s", None, "u").unwrap();
    let fork = engine
        .create_project_from_snapshot(snapshot.id, "copy", "u")
        .unwrap();

    let (fork_images, fork_labels) = live_dataset(&ws.store, fork.id);
    assert_eq!(fork_images.len(), 1);
    assert_ne!(fork_images[0].id, image_id);
    assert_eq!(fork_images[0].split, Split::Training);
    assert!(fork_images[0].is_labeled);
    assert_eq!(fork_labels[0].image_id, fork_images[0].id);
    assert!(ws.blobs.read(fork.id, "f.jpg").unwrap().is_some());
}

#[test]
fn class_in_use_cannot_be_deleted() {
    let ws = workspace();
    let project_id = seed_project(&ws.store, "cls", ProjectType::Detection);
    let used = add_class(&ws.store, project_id, "used");
    let unused = add_class(&ws.store, project_id, "unused");
    add_labeled_image(&ws.store, project_id, "u.jpg", &[used], Split::Unassigned);

    let service = DatasetService::new(Arc::clone(&ws.store));
    assert_eq!(
        service.delete_class(used, "u").unwrap_err().kind(),
        ErrorKind::Conflict
    );
    service.delete_class(unused, "u").unwrap();
    assert_eq!(
        service.delete_class(unused, "u").unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

// ── Training lifecycle ─────────────────────────────────────────────────

#[tokio::test]
async fn snapshot_training_round_trip() {
    let ws = workspace();
    let project_id = seed_project(&ws.store, "zoo", ProjectType::Detection);
    let cat = add_class(&ws.store, project_id, "cat");
    let dog = add_class(&ws.store, project_id, "dog");
    let c1 = add_labeled_image(&ws.store, project_id, "c1.jpg", &[cat], Split::Training);
    let d1 = add_labeled_image(&ws.store, project_id, "d1.jpg", &[dog], Split::Training);
    let both = add_labeled_image(&ws.store, project_id, "cd.jpg", &[cat, dog], Split::Dev);
    let bg = add_no_class_image(&ws.store, project_id, "bg.jpg", Split::Test);
    for name in ["c1.jpg", "d1.jpg", "cd.jpg", "bg.jpg"] {
        write_image(&ws.blobs, project_id, name);
    }

    let snapshots = SnapshotEngine::new(Arc::clone(&ws.store), ws.blobs.clone());
    let snapshot = snapshots
        .create_snapshot(project_id, "train-me", None, "u")
        .unwrap();
    // Live drifts after the snapshot; training must not see it
    add_labeled_image(&ws.store, project_id, "late.jpg", &[dog], Split::Training);

    let service = Arc::new(ScriptedTrainingService::new());
    let orchestrator = TrainingOrchestrator::new(
        Arc::clone(&ws.store),
        ws.blobs.clone(),
        Arc::clone(&service) as Arc<dyn TrainingService>,
    );
    let result = orchestrator
        .start_multi_config_training(
            &StartTrainingRequest {
                project_id,
                snapshot_id: Some(snapshot.id),
                configs: vec![ModelConfig::new("yolo-s", 5, "s")],
            },
            "u",
        )
        .await
        .unwrap();
    let record = result.records().next().unwrap().clone();
    assert_eq!(record.status, TrainingStatus::WaitForResult);
    assert_eq!(
        (record.training_count, record.dev_count, record.test_count),
        (2, 1, 1)
    );

    let submission = &service.submissions()[0];
    let entries = archive_entries(&submission.archive);
    assert!(entries.contains(&format!("training/0/{c1}_c1.jpg")));
    assert!(entries.contains(&format!("training/1/{d1}_d1.txt")));
    assert!(entries.contains(&format!("dev/0/{both}_cd.jpg")));
    assert!(entries.contains(&format!("test/_background/{bg}_bg.txt")));
    assert!(entries.contains(&"data.yaml".to_string()));
    assert!(!entries.iter().any(|e| e.contains("late")));

    service.set_result(
        record.track_id.as_deref().unwrap(),
        ScriptedResult::Ready(ready_result(
            0.5,
            vec![
                prediction(c1, &[(0, 0.9)]),
                prediction(d1, &[(0, 0.6)]),
                prediction(both, &[(1, 0.8), (0, 0.4)]),
                prediction(bg, &[(1, 0.7)]),
            ],
        )),
    );
    let poller = ResultPoller::new(
        Arc::clone(&ws.store),
        Arc::clone(&service) as Arc<dyn TrainingService>,
        None,
    );
    let tick = poller.run_once().await.unwrap().unwrap();
    assert_eq!(tick.success_count, 1);
    assert_eq!(
        orchestrator.get_training_record(record.id).unwrap().status,
        TrainingStatus::Complete
    );

    let metrics = MetricsAggregator::new(Arc::clone(&ws.store));
    let model = &metrics.list_models(project_id, false).unwrap()[0];
    assert_eq!(model.label_count, 4);
    let cm = metrics.compute_confusion_matrix(model.id).unwrap();
    // cat: c1 and cd carry it; dog: d1 and cd carry it
    assert_eq!(cm.row_sum(0), 2);
    assert_eq!(cm.row_sum(1), 2);
    assert_eq!(cm.matrix[0][0], 1);
    assert_eq!(cm.matrix[0][1], 1, "cd's cat goes to its top prediction, dog");
    assert_eq!(cm.matrix[1][0], 1);
    assert_eq!(cm.matrix[1][1], 1);
    assert_eq!(cm.matrix[cm.no_ground_truth_row()][1], 1);
}

#[tokio::test]
async fn poller_isolates_the_failing_record() {
    let ws = workspace();
    let project_id = seed_project(&ws.store, "iso", ProjectType::Classification);
    let class_id = add_class(&ws.store, project_id, "only");
    add_labeled_image(&ws.store, project_id, "1.jpg", &[class_id], Split::Training);

    let service = Arc::new(ScriptedTrainingService::new());
    let orchestrator = TrainingOrchestrator::new(
        Arc::clone(&ws.store),
        ws.blobs.clone(),
        Arc::clone(&service) as Arc<dyn TrainingService>,
    );
    let started = orchestrator
        .start_multi_config_training(
            &StartTrainingRequest {
                project_id,
                snapshot_id: None,
                configs: vec![
                    ModelConfig::new("one", 1, "s"),
                    ModelConfig::new("two", 1, "s"),
                    ModelConfig::new("three", 1, "s"),
                ],
            },
            "u",
        )
        .await
        .unwrap();
    let records: Vec<_> = started.records().cloned().collect();
    assert_eq!(records.len(), 3);

    let tracks: Vec<String> = records
        .iter()
        .map(|r| r.track_id.clone().unwrap())
        .collect();
    service.set_result(&tracks[0], ScriptedResult::Ready(ready_result(0.5, vec![])));
    service.set_result(&tracks[1], ScriptedResult::Error("boom".to_string()));
    service.set_result(&tracks[2], ScriptedResult::Ready(ready_result(0.5, vec![])));

    let poller = ResultPoller::new(
        Arc::clone(&ws.store),
        Arc::clone(&service) as Arc<dyn TrainingService>,
        None,
    );
    let tick = poller.run_once().await.unwrap().unwrap();
    assert_eq!(tick.failure_count, 1);
    assert_eq!(tick.success_count, 2);

    let statuses: Vec<TrainingStatus> = records
        .iter()
        .map(|r| orchestrator.get_training_record(r.id).unwrap().status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            TrainingStatus::Complete,
            TrainingStatus::Failed,
            TrainingStatus::Complete
        ]
    );
    assert!(tick.clone().into_result().is_err());
}
