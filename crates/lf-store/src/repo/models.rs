//! Trained models, their reports, chart series, and prediction labels.

use crate::error::{StoreError, StoreResult, StoreResultExt};
use crate::row_helpers::{decode, next_id, now, query_all, query_opt};
use duckdb::{Connection, Row};
use lf_core::{ChartPoint, ConfidentialReport, ImagePredictionLabel, Model, ModelStatus, SetScores};
use std::fmt;

const MODEL_COLUMNS: &str = "id, project_id, training_record_id, model_alias, model_version, \
     track_id, status, image_count, label_count, is_favorite, \
     training_f1, training_precision, training_recall, \
     dev_f1, dev_precision, dev_recall, \
     test_f1, test_precision, test_recall, created_at";

fn scores_at(row: &Row<'_>, first: usize) -> duckdb::Result<SetScores> {
    Ok(SetScores {
        f1: row.get(first)?,
        precision: row.get(first + 1)?,
        recall: row.get(first + 2)?,
    })
}

fn model_from_row(row: &Row<'_>) -> duckdb::Result<Model> {
    Ok(Model {
        id: row.get(0)?,
        project_id: row.get(1)?,
        training_record_id: row.get(2)?,
        model_alias: row.get(3)?,
        model_version: row.get(4)?,
        track_id: row.get(5)?,
        status: decode(6, ModelStatus::parse(&row.get::<_, String>(6)?))?,
        image_count: row.get(7)?,
        label_count: row.get(8)?,
        is_favorite: row.get(9)?,
        training: scores_at(row, 10)?,
        dev: scores_at(row, 13)?,
        test: scores_at(row, 16)?,
        created_at: row.get(19)?,
    })
}

/// Fields supplied when a model is created. The version is assigned here.
#[derive(Debug, Clone)]
pub struct NewModel {
    pub project_id: i64,
    pub training_record_id: i64,
    pub model_alias: String,
    pub track_id: String,
    pub image_count: i64,
    pub label_count: i64,
    pub training: SetScores,
    pub dev: SetScores,
    pub test: SetScores,
}

impl From<&Model> for NewModel {
    fn from(model: &Model) -> Self {
        Self {
            project_id: model.project_id,
            training_record_id: model.training_record_id,
            model_alias: model.model_alias.clone(),
            track_id: model.track_id.clone(),
            image_count: model.image_count,
            label_count: model.label_count,
            training: model.training,
            dev: model.dev,
            test: model.test,
        }
    }
}

/// Insert an `ACTIVE` model with the next version for its project and alias.
pub fn insert_model(conn: &Connection, model: &NewModel) -> StoreResult<Model> {
    let id = next_id(conn, "lf.seq_models")?;
    let version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(model_version), 0) + 1 FROM lf.models
             WHERE project_id = ? AND model_alias = ?",
            duckdb::params![model.project_id, model.model_alias],
            |row| row.get(0),
        )
        .context("select next model_version")?;
    conn.execute(
        &format!(
            "INSERT INTO lf.models ({MODEL_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, false, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ),
        duckdb::params![
            id,
            model.project_id,
            model.training_record_id,
            model.model_alias,
            version,
            model.track_id,
            ModelStatus::Active.as_str(),
            model.image_count,
            model.label_count,
            model.training.f1,
            model.training.precision,
            model.training.recall,
            model.dev.f1,
            model.dev.precision,
            model.dev.recall,
            model.test.f1,
            model.test.precision,
            model.test.recall,
            now(),
        ],
    )
    .context("insert models")?;
    get_model(conn, id)?
        .ok_or_else(|| StoreError::QueryError(format!("model {id} vanished after insert")))
}

pub fn get_model(conn: &Connection, id: i64) -> StoreResult<Option<Model>> {
    query_opt(
        conn,
        &format!("SELECT {MODEL_COLUMNS} FROM lf.models WHERE id = ?"),
        duckdb::params![id],
        model_from_row,
        "select model",
    )
}

/// Models of a project ordered by alias then version.
pub fn list_models(
    conn: &Connection,
    project_id: i64,
    include_inactive: bool,
) -> StoreResult<Vec<Model>> {
    query_all(
        conn,
        &format!(
            "SELECT {MODEL_COLUMNS} FROM lf.models
             WHERE project_id = ? AND (? OR status = 'ACTIVE')
             ORDER BY model_alias, model_version"
        ),
        duckdb::params![project_id, include_inactive],
        model_from_row,
        "list models",
    )
}

pub fn models_for_training_record(
    conn: &Connection,
    training_record_id: i64,
) -> StoreResult<Vec<Model>> {
    query_all(
        conn,
        &format!(
            "SELECT {MODEL_COLUMNS} FROM lf.models WHERE training_record_id = ? ORDER BY id"
        ),
        duckdb::params![training_record_id],
        model_from_row,
        "list models by training record",
    )
}

pub fn set_model_status(conn: &Connection, id: i64, status: ModelStatus) -> StoreResult<usize> {
    conn.execute(
        "UPDATE lf.models SET status = ? WHERE id = ?",
        duckdb::params![status.as_str(), id],
    )
    .context("update models.status")
}

// ── Confidential reports ────────────────────────────────────────────────

/// Rates and threshold written once per model.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NewReport {
    pub training_correct_rate: f64,
    pub dev_correct_rate: f64,
    pub test_correct_rate: f64,
    pub confidence_threshold: f64,
}

pub fn insert_report(
    conn: &Connection,
    model_id: i64,
    report: NewReport,
) -> StoreResult<ConfidentialReport> {
    let id = next_id(conn, "lf.seq_confidential_reports")?;
    conn.execute(
        "INSERT INTO lf.confidential_reports (
             id, model_id, training_correct_rate, dev_correct_rate, test_correct_rate,
             confidence_threshold, created_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        duckdb::params![
            id,
            model_id,
            report.training_correct_rate,
            report.dev_correct_rate,
            report.test_correct_rate,
            report.confidence_threshold,
            now(),
        ],
    )
    .context("insert confidential_reports")?;
    Ok(ConfidentialReport {
        id,
        model_id,
        training_correct_rate: report.training_correct_rate,
        dev_correct_rate: report.dev_correct_rate,
        test_correct_rate: report.test_correct_rate,
        confidence_threshold: report.confidence_threshold,
    })
}

pub fn get_report_for_model(
    conn: &Connection,
    model_id: i64,
) -> StoreResult<Option<ConfidentialReport>> {
    query_opt(
        conn,
        "SELECT id, model_id, training_correct_rate, dev_correct_rate, test_correct_rate,
                confidence_threshold
         FROM lf.confidential_reports WHERE model_id = ? ORDER BY id LIMIT 1",
        duckdb::params![model_id],
        |row| {
            Ok(ConfidentialReport {
                id: row.get(0)?,
                model_id: row.get(1)?,
                training_correct_rate: row.get(2)?,
                dev_correct_rate: row.get(3)?,
                test_correct_rate: row.get(4)?,
                confidence_threshold: row.get(5)?,
            })
        },
        "select confidential_report",
    )
}

// ── Charts ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Loss,
    Validation,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Loss => "loss",
            ChartKind::Validation => "validation",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append a chart series. Points are stored in epoch order.
pub fn insert_chart_points(
    conn: &Connection,
    model_id: i64,
    kind: ChartKind,
    points: &[ChartPoint],
) -> StoreResult<usize> {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| p.epoch);
    let created_at = now();
    let mut stmt = conn
        .prepare(
            "INSERT INTO lf.model_chart_points (id, model_id, chart_type, epoch, value, created_at)
             VALUES (nextval('lf.seq_model_chart_points'), ?, ?, ?, ?, ?)",
        )
        .context("prepare insert model_chart_points")?;
    for point in &sorted {
        stmt.execute(duckdb::params![
            model_id,
            kind.as_str(),
            point.epoch,
            point.value,
            created_at
        ])
        .context("insert model_chart_points")?;
    }
    Ok(sorted.len())
}

pub fn list_chart_points(
    conn: &Connection,
    model_id: i64,
    kind: ChartKind,
) -> StoreResult<Vec<ChartPoint>> {
    query_all(
        conn,
        "SELECT epoch, value FROM lf.model_chart_points
         WHERE model_id = ? AND chart_type = ? ORDER BY epoch, id",
        duckdb::params![model_id, kind.as_str()],
        |row| {
            Ok(ChartPoint {
                epoch: row.get(0)?,
                value: row.get(1)?,
            })
        },
        "list model_chart_points",
    )
}

/// Copy both chart series of `source_model_id` onto `target_model_id`.
pub fn copy_chart_points(
    conn: &Connection,
    source_model_id: i64,
    target_model_id: i64,
) -> StoreResult<usize> {
    conn.execute(
        "INSERT INTO lf.model_chart_points (id, model_id, chart_type, epoch, value, created_at)
         SELECT nextval('lf.seq_model_chart_points'), ?, chart_type, epoch, value, ?
         FROM lf.model_chart_points WHERE model_id = ?
         ORDER BY chart_type, epoch, id",
        duckdb::params![target_model_id, now(), source_model_id],
    )
    .context("copy model_chart_points")
}

// ── Prediction labels ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct NewPrediction {
    pub image_id: i64,
    pub class_id: i64,
    pub position: String,
    pub confidence_rate: f64,
}

pub fn insert_predictions(
    conn: &Connection,
    model_id: i64,
    predictions: &[NewPrediction],
) -> StoreResult<usize> {
    let mut stmt = conn
        .prepare(
            "INSERT INTO lf.image_prediction_labels
                 (id, image_id, class_id, model_id, position, confidence_rate)
             VALUES (nextval('lf.seq_image_prediction_labels'), ?, ?, ?, ?, ?)",
        )
        .context("prepare insert image_prediction_labels")?;
    for p in predictions {
        stmt.execute(duckdb::params![
            p.image_id,
            p.class_id,
            model_id,
            p.position,
            p.confidence_rate
        ])
        .context("insert image_prediction_labels")?;
    }
    Ok(predictions.len())
}

pub fn list_predictions(conn: &Connection, model_id: i64) -> StoreResult<Vec<ImagePredictionLabel>> {
    query_all(
        conn,
        "SELECT id, image_id, class_id, model_id, position, confidence_rate
         FROM lf.image_prediction_labels WHERE model_id = ? ORDER BY image_id, id",
        duckdb::params![model_id],
        |row| {
            Ok(ImagePredictionLabel {
                id: row.get(0)?,
                image_id: row.get(1)?,
                class_id: row.get(2)?,
                model_id: row.get(3)?,
                position: row.get(4)?,
                confidence_rate: row.get(5)?,
            })
        },
        "list image_prediction_labels",
    )
}

pub fn copy_predictions(
    conn: &Connection,
    source_model_id: i64,
    target_model_id: i64,
) -> StoreResult<usize> {
    conn.execute(
        "INSERT INTO lf.image_prediction_labels
             (id, image_id, class_id, model_id, position, confidence_rate)
         SELECT nextval('lf.seq_image_prediction_labels'), image_id, class_id, ?, position, confidence_rate
         FROM lf.image_prediction_labels WHERE model_id = ?
         ORDER BY image_id, id",
        duckdb::params![target_model_id, source_model_id],
    )
    .context("copy image_prediction_labels")
}
