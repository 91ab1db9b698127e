//! Metrics and confusion-matrix aggregation over trained models.
//!
//! Ground truth comes from the dataset the model was trained on (its
//! snapshot when there is one, else the live project). Predictions below
//! the model's confidence threshold are ignored; the comparison is
//! inclusive.

use crate::error::{EngineError, EngineResult};
use duckdb::Connection;
use lf_core::{
    ChartPoint, ConfidentialReport, ImagePredictionLabel, Model, ModelStatus, ProjectClass,
    SetScores,
};
use lf_store::repo::models::{self, ChartKind, NewModel, NewReport};
use lf_store::repo::{classes, images, labels, projects, training};
use lf_store::{DatasetScope, StoreDb};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixClass {
    pub class_id: i64,
    pub class_name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMetrics {
    pub class_id: i64,
    pub true_positives: i64,
    pub false_positives: i64,
    pub false_negatives: i64,
    /// `None` when nothing was predicted as this class
    pub precision: Option<f64>,
    /// `None` when no image carries this class
    pub recall: Option<f64>,
}

/// Ground truth by prediction counts for one model.
///
/// `matrix` has one row per class plus a trailing "no ground truth" row and
/// one column per class plus a trailing "no prediction" column. Each
/// `(image, ground-truth class)` pair lands in exactly one cell of its row,
/// so a row sums to the number of images carrying that class.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfusionMatrix {
    pub model_id: i64,
    pub confidence_threshold: f64,
    pub classes: Vec<MatrixClass>,
    pub matrix: Vec<Vec<i64>>,
    pub class_metrics: Vec<ClassMetrics>,
    pub max_count: i64,
}

impl ConfusionMatrix {
    pub fn no_prediction_column(&self) -> usize {
        self.classes.len()
    }

    pub fn no_ground_truth_row(&self) -> usize {
        self.classes.len()
    }

    pub fn row_sum(&self, row: usize) -> i64 {
        self.matrix.get(row).map_or(0, |r| r.iter().sum())
    }
}

/// Metrics recomputed by the caller at a new threshold.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculatedMetrics {
    pub training_correct_rate: f64,
    pub dev_correct_rate: f64,
    pub test_correct_rate: f64,
    /// Scores keep the source model's values when omitted
    #[serde(default)]
    pub training: Option<SetScores>,
    #[serde(default)]
    pub dev: Option<SetScores>,
    #[serde(default)]
    pub test: Option<SetScores>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedModel {
    pub source_model_id: i64,
    pub model: Model,
    pub report: ConfidentialReport,
    pub copied_predictions: usize,
    pub copied_chart_points: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDetail {
    pub model: Model,
    pub report: Option<ConfidentialReport>,
    pub loss_chart: Vec<ChartPoint>,
    pub validation_chart: Vec<ChartPoint>,
}

fn require_model(conn: &Connection, model_id: i64) -> EngineResult<Model> {
    models::get_model(conn, model_id)?.ok_or_else(|| EngineError::not_found("model", model_id))
}

fn check_unit(field: &str, value: f64) -> EngineResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::Validation(format!(
            "{field} must be between 0 and 1, got {value}"
        )))
    }
}

/// Predicted classes that survive `threshold`, with their best confidence.
fn surviving_predictions(
    predictions: &[ImagePredictionLabel],
    threshold: f64,
    index_of: &HashMap<i64, usize>,
) -> BTreeMap<i64, BTreeMap<usize, f64>> {
    let mut by_image: BTreeMap<i64, BTreeMap<usize, f64>> = BTreeMap::new();
    for p in predictions.iter().filter(|p| p.confidence_rate >= threshold) {
        let Some(&idx) = index_of.get(&p.class_id) else {
            log::debug!("Prediction {} has class {} outside the dataset", p.id, p.class_id);
            continue;
        };
        let best = by_image.entry(p.image_id).or_default().entry(idx).or_insert(p.confidence_rate);
        if p.confidence_rate > *best {
            *best = p.confidence_rate;
        }
    }
    by_image
}

/// Highest-confidence class; ties go to the lowest index.
fn top_class(predicted: &BTreeMap<usize, f64>) -> Option<usize> {
    predicted
        .iter()
        .fold(None, |best: Option<(usize, f64)>, (&idx, &conf)| match best {
            Some((_, best_conf)) if best_conf >= conf => best,
            _ => Some((idx, conf)),
        })
        .map(|(idx, _)| idx)
}

fn ratio(numerator: i64, denominator: i64) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

/// Build the matrix from ground-truth class sets and surviving predictions.
fn build_matrix(
    class_count: usize,
    truth: &BTreeMap<i64, BTreeSet<usize>>,
    predicted: &BTreeMap<i64, BTreeMap<usize, f64>>,
) -> (Vec<Vec<i64>>, Vec<(i64, i64, i64)>) {
    let mut matrix = vec![vec![0i64; class_count + 1]; class_count + 1];
    let mut tallies = vec![(0i64, 0i64, 0i64); class_count];
    let empty = BTreeMap::new();

    for (image_id, gt) in truth {
        let preds = predicted.get(image_id).unwrap_or(&empty);
        for &g in gt {
            let column = if preds.contains_key(&g) {
                tallies[g].0 += 1;
                g
            } else {
                tallies[g].2 += 1;
                top_class(preds).unwrap_or(class_count)
            };
            matrix[g][column] += 1;
        }
        for &p in preds.keys().filter(|p| !gt.contains(p)) {
            tallies[p].1 += 1;
        }
    }
    for (image_id, preds) in predicted {
        if truth.contains_key(image_id) {
            continue;
        }
        for &p in preds.keys() {
            tallies[p].1 += 1;
        }
        if let Some(top) = top_class(preds) {
            matrix[class_count][top] += 1;
        }
    }
    (matrix, tallies)
}

pub struct MetricsAggregator {
    store: Arc<StoreDb>,
}

impl MetricsAggregator {
    pub fn new(store: Arc<StoreDb>) -> Self {
        Self { store }
    }

    pub fn compute_confusion_matrix(&self, model_id: i64) -> EngineResult<ConfusionMatrix> {
        self.store.with_conn(|conn| {
            let model = require_model(conn, model_id)?;
            let record = training::get_training_record(conn, model.training_record_id)?;
            let scope = DatasetScope::of(model.project_id, record.and_then(|r| r.snapshot_id));
            let threshold = models::get_report_for_model(conn, model_id)?
                .map_or(0.0, |r| r.confidence_threshold);

            let mut class_rows: Vec<ProjectClass> = classes::list_classes(conn, scope)?;
            class_rows.sort_by_key(|c| c.id);
            let index_of: HashMap<i64, usize> = class_rows
                .iter()
                .enumerate()
                .map(|(idx, c)| (c.id, idx))
                .collect();
            let in_scope: HashSet<i64> = images::list_images(conn, scope)?
                .iter()
                .map(|img| img.id)
                .collect();

            let mut truth: BTreeMap<i64, BTreeSet<usize>> = BTreeMap::new();
            for (image_id, class_id) in labels::image_class_pairs(conn, scope)? {
                if let Some(&idx) = index_of.get(&class_id) {
                    truth.entry(image_id).or_default().insert(idx);
                }
            }
            let predictions: Vec<ImagePredictionLabel> = models::list_predictions(conn, model_id)?
                .into_iter()
                .filter(|p| in_scope.contains(&p.image_id))
                .collect();
            let predicted = surviving_predictions(&predictions, threshold, &index_of);

            let (matrix, tallies) = build_matrix(class_rows.len(), &truth, &predicted);
            let max_count = matrix.iter().flatten().copied().max().unwrap_or(0);
            let class_metrics = class_rows
                .iter()
                .zip(tallies)
                .map(|(c, (tp, fp, fn_))| ClassMetrics {
                    class_id: c.id,
                    true_positives: tp,
                    false_positives: fp,
                    false_negatives: fn_,
                    precision: ratio(tp, tp + fp),
                    recall: ratio(tp, tp + fn_),
                })
                .collect();

            Ok(ConfusionMatrix {
                model_id,
                confidence_threshold: threshold,
                classes: class_rows
                    .into_iter()
                    .map(|c| MatrixClass {
                        class_id: c.id,
                        class_name: c.class_name,
                        color: c.color_code,
                    })
                    .collect(),
                matrix,
                class_metrics,
                max_count,
            })
        })
    }

    /// Create a new model at `threshold`, leaving the source untouched.
    ///
    /// The new model copies the source's lineage, predictions, and charts
    /// and gets the next version for its alias.
    pub fn generate_model_with_new_threshold(
        &self,
        source_model_id: i64,
        threshold: f64,
        metrics: RecalculatedMetrics,
        user: &str,
    ) -> EngineResult<GeneratedModel> {
        check_unit("confidence threshold", threshold)?;
        check_unit("training correct rate", metrics.training_correct_rate)?;
        check_unit("dev correct rate", metrics.dev_correct_rate)?;
        check_unit("test correct rate", metrics.test_correct_rate)?;

        let generated = self.store.transaction(|conn| {
            let source = require_model(conn, source_model_id)?;
            let mut new = NewModel::from(&source);
            new.training = metrics.training.unwrap_or(source.training);
            new.dev = metrics.dev.unwrap_or(source.dev);
            new.test = metrics.test.unwrap_or(source.test);
            let model = models::insert_model(conn, &new)?;
            let report = models::insert_report(
                conn,
                model.id,
                NewReport {
                    training_correct_rate: metrics.training_correct_rate,
                    dev_correct_rate: metrics.dev_correct_rate,
                    test_correct_rate: metrics.test_correct_rate,
                    confidence_threshold: threshold,
                },
            )?;
            let copied_predictions = models::copy_predictions(conn, source.id, model.id)?;
            let copied_chart_points = models::copy_chart_points(conn, source.id, model.id)?;
            Ok::<_, EngineError>(GeneratedModel {
                source_model_id,
                model,
                report,
                copied_predictions,
                copied_chart_points,
            })
        })?;

        log::info!(
            "Model {} (v{}) generated from model {source_model_id} at threshold {threshold} by {user}",
            generated.model.id,
            generated.model.model_version
        );
        Ok(generated)
    }

    pub fn list_models(&self, project_id: i64, include_inactive: bool) -> EngineResult<Vec<Model>> {
        self.store.with_conn(|conn| {
            projects::get_project(conn, project_id)?
                .ok_or_else(|| EngineError::not_found("project", project_id))?;
            Ok(models::list_models(conn, project_id, include_inactive)?)
        })
    }

    pub fn get_model(&self, model_id: i64) -> EngineResult<ModelDetail> {
        self.store.with_conn(|conn| {
            let model = require_model(conn, model_id)?;
            Ok(ModelDetail {
                report: models::get_report_for_model(conn, model_id)?,
                loss_chart: models::list_chart_points(conn, model_id, ChartKind::Loss)?,
                validation_chart: models::list_chart_points(conn, model_id, ChartKind::Validation)?,
                model,
            })
        })
    }

    /// Deactivate a model. Its rows stay for lineage.
    pub fn delete_model(&self, model_id: i64, user: &str) -> EngineResult<()> {
        self.store.with_conn(|conn| {
            require_model(conn, model_id)?;
            models::set_model_status(conn, model_id, ModelStatus::Inactive)?;
            Ok::<_, EngineError>(())
        })?;
        log::info!("Model {model_id} deactivated by {user}");
        Ok(())
    }
}

#[cfg(test)]
#[path = "metrics_test.rs"]
mod tests;
