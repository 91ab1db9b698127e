use super::*;
use crate::error::ErrorKind;
use crate::test_utils::*;
use lf_core::{ProjectType, Split};
use lf_store::repo::models::NewPrediction;
use lf_store::StoreError;

struct Fixture {
    store: Arc<StoreDb>,
    metrics: MetricsAggregator,
    project_id: i64,
    classes: [i64; 3],
    images: [i64; 5],
    model_id: i64,
}

fn predict(image_id: i64, class_id: i64, confidence_rate: f64) -> NewPrediction {
    NewPrediction {
        image_id,
        class_id,
        position: BOX_JSON.to_string(),
        confidence_rate,
    }
}

/// Classes a, b, c; images with ground truth {a}, {a}, {b}, {a, b}, {}.
fn fixture() -> Fixture {
    let store = memory_store();
    let project_id = seed_project(&store, "m", ProjectType::Detection);
    let a = add_class(&store, project_id, "a");
    let b = add_class(&store, project_id, "b");
    let c = add_class(&store, project_id, "c");
    let images = [
        add_labeled_image(&store, project_id, "1.jpg", &[a], Split::Training),
        add_labeled_image(&store, project_id, "2.jpg", &[a], Split::Training),
        add_labeled_image(&store, project_id, "3.jpg", &[b], Split::Dev),
        add_labeled_image(&store, project_id, "4.jpg", &[a, b], Split::Test),
        add_no_class_image(&store, project_id, "5.jpg", Split::Test),
    ];
    let record_id = add_waiting_record(&store, project_id, None, "yolo", "t-1");
    let model_id = store
        .transaction(|conn| -> Result<i64, StoreError> {
            let model = models::insert_model(
                conn,
                &NewModel {
                    project_id,
                    training_record_id: record_id,
                    model_alias: "yolo".to_string(),
                    track_id: "t-1".to_string(),
                    image_count: 5,
                    label_count: 5,
                    training: SetScores::default(),
                    dev: SetScores::default(),
                    test: SetScores::default(),
                },
            )?;
            models::insert_report(
                conn,
                model.id,
                NewReport {
                    confidence_threshold: 0.5,
                    ..NewReport::default()
                },
            )?;
            models::insert_predictions(
                conn,
                model.id,
                &[
                    predict(images[0], a, 0.9),
                    predict(images[1], b, 0.8),
                    predict(images[2], b, 0.3),
                    predict(images[3], a, 0.7),
                    predict(images[4], b, 0.9),
                ],
            )?;
            models::insert_chart_points(
                conn,
                model.id,
                ChartKind::Loss,
                &[ChartPoint { epoch: 1, value: 0.7 }],
            )?;
            Ok(model.id)
        })
        .unwrap();
    Fixture {
        metrics: MetricsAggregator::new(Arc::clone(&store)),
        store,
        project_id,
        classes: [a, b, c],
        images,
        model_id,
    }
}

#[test]
fn matrix_places_each_ground_truth_once() {
    let f = fixture();
    let cm = f.metrics.compute_confusion_matrix(f.model_id).unwrap();
    assert_eq!(cm.confidence_threshold, 0.5);
    assert_eq!(cm.classes.len(), 3);
    assert_eq!(cm.no_prediction_column(), 3);
    assert_eq!(
        cm.matrix,
        vec![
            vec![2, 1, 0, 0],
            vec![1, 0, 0, 1],
            vec![0, 0, 0, 0],
            vec![0, 1, 0, 0],
        ]
    );
    assert_eq!(cm.row_sum(0), 3);
    assert_eq!(cm.row_sum(1), 2);
    assert_eq!(cm.row_sum(2), 0);
    assert_eq!(cm.max_count, 2);
}

#[test]
fn per_class_metrics_leave_empty_denominators_null() {
    let f = fixture();
    let cm = f.metrics.compute_confusion_matrix(f.model_id).unwrap();
    let a = &cm.class_metrics[0];
    assert_eq!((a.true_positives, a.false_positives, a.false_negatives), (2, 0, 1));
    assert_eq!(a.precision, Some(1.0));
    assert_eq!(a.recall, Some(2.0 / 3.0));

    let b = &cm.class_metrics[1];
    assert_eq!((b.true_positives, b.false_positives, b.false_negatives), (0, 2, 2));
    assert_eq!(b.precision, Some(0.0));
    assert_eq!(b.recall, Some(0.0));

    let c = &cm.class_metrics[2];
    assert_eq!(c.class_id, f.classes[2]);
    assert_eq!(c.precision, None);
    assert_eq!(c.recall, None);
}

#[test]
fn threshold_is_inclusive() {
    let f = fixture();
    f.store
        .with_conn(|conn| {
            models::insert_predictions(conn, f.model_id, &[predict(f.images[2], f.classes[1], 0.5)])
        })
        .unwrap();
    let cm = f.metrics.compute_confusion_matrix(f.model_id).unwrap();
    assert_eq!(cm.matrix[1][1], 1);
    assert_eq!(cm.matrix[1][3], 0);
}

#[test]
fn top_class_prefers_confidence_then_lowest_index() {
    let mut preds = BTreeMap::new();
    preds.insert(2, 0.6);
    preds.insert(1, 0.9);
    preds.insert(0, 0.9);
    assert_eq!(top_class(&preds), Some(0));
    assert_eq!(top_class(&BTreeMap::new()), None);
}

#[test]
fn new_threshold_creates_new_model_and_keeps_source() {
    let f = fixture();
    let metrics = RecalculatedMetrics {
        training_correct_rate: 0.9,
        dev_correct_rate: 0.8,
        test_correct_rate: 0.7,
        ..RecalculatedMetrics::default()
    };
    let generated = f
        .metrics
        .generate_model_with_new_threshold(f.model_id, 0.2, metrics, "carol")
        .unwrap();

    assert_ne!(generated.model.id, f.model_id);
    assert_eq!(generated.model.model_version, 2);
    assert_eq!(generated.model.model_alias, "yolo");
    assert_eq!(generated.report.confidence_threshold, 0.2);
    assert_eq!(generated.copied_predictions, 5);
    assert_eq!(generated.copied_chart_points, 1);

    let source = f.metrics.get_model(f.model_id).unwrap();
    assert_eq!(source.report.unwrap().confidence_threshold, 0.5);
    let detail = f.metrics.get_model(generated.model.id).unwrap();
    assert_eq!(detail.loss_chart.len(), 1);

    let cm = f.metrics.compute_confusion_matrix(generated.model.id).unwrap();
    assert_eq!(cm.matrix[1][1], 1, "0.3 prediction survives at 0.2");
    let original = f.metrics.compute_confusion_matrix(f.model_id).unwrap();
    assert_eq!(original.matrix[1][1], 0);
}

#[test]
fn threshold_outside_unit_interval_is_rejected() {
    let f = fixture();
    for bad in [-0.1, 1.5, f64::NAN] {
        let err = f
            .metrics
            .generate_model_with_new_threshold(f.model_id, bad, RecalculatedMetrics::default(), "u")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    let missing = f
        .metrics
        .generate_model_with_new_threshold(404, 0.5, RecalculatedMetrics::default(), "u")
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[test]
fn deleted_models_are_hidden_but_kept() {
    let f = fixture();
    f.metrics.delete_model(f.model_id, "u").unwrap();
    assert!(f.metrics.list_models(f.project_id, false).unwrap().is_empty());
    let all = f.metrics.list_models(f.project_id, true).unwrap();
    assert_eq!(all[0].status, ModelStatus::Inactive);
    assert_eq!(
        f.metrics.delete_model(999, "u").unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn unknown_model_matrix_is_not_found() {
    let f = fixture();
    assert_eq!(
        f.metrics.compute_confusion_matrix(12345).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}
