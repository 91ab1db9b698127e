//! Training records and their guarded status transitions.
//!
//! Every status write is a conditional `UPDATE ... WHERE status = ?` so two
//! writers racing on the same record cannot both win.

use crate::error::{StoreError, StoreResult, StoreResultExt};
use crate::row_helpers::{decode, next_id, now, query_all, query_opt};
use duckdb::{Connection, Row};
use lf_core::{TrainingRecord, TrainingStatus};

const RECORD_COLUMNS: &str = "id, project_id, snapshot_id, status, model_alias, track_id, epochs, \
     model_size, transform_param, augmentation_param, training_count, dev_count, test_count, \
     error_message, started_at, completed_at, created_at, created_by, model_track_key";

fn record_from_row(row: &Row<'_>) -> duckdb::Result<TrainingRecord> {
    Ok(TrainingRecord {
        id: row.get(0)?,
        project_id: row.get(1)?,
        snapshot_id: row.get(2)?,
        status: decode(3, TrainingStatus::parse(&row.get::<_, String>(3)?))?,
        model_alias: row.get(4)?,
        track_id: row.get(5)?,
        epochs: row.get(6)?,
        model_size: row.get(7)?,
        transform_param: row.get(8)?,
        augmentation_param: row.get(9)?,
        training_count: row.get(10)?,
        dev_count: row.get(11)?,
        test_count: row.get(12)?,
        error_message: row.get(13)?,
        started_at: row.get(14)?,
        completed_at: row.get(15)?,
        created_at: row.get(16)?,
        created_by: row.get(17)?,
        model_track_key: row.get(18)?,
    })
}

/// Fields fixed when a record is created.
#[derive(Debug, Clone)]
pub struct NewTrainingRecord {
    pub project_id: i64,
    pub snapshot_id: Option<i64>,
    pub model_alias: String,
    pub epochs: i32,
    pub model_size: String,
    pub transform_param: Option<String>,
    pub augmentation_param: Option<String>,
}

/// Exported dataset sizes stored on submission.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubmittedCounts {
    pub training: i64,
    pub dev: i64,
    pub test: i64,
    pub labels: i64,
    /// Class ids in label-index order of the exported archive
    pub class_ids: Vec<i64>,
}

/// Create a `PENDING` record.
pub fn insert_training_record(
    conn: &Connection,
    record: &NewTrainingRecord,
    user: &str,
) -> StoreResult<TrainingRecord> {
    let id = next_id(conn, "lf.seq_training_records")?;
    let track_key = format!("{}-{}-{}", record.project_id, record.model_alias, id);
    conn.execute(
        "INSERT INTO lf.training_records (
             id, project_id, snapshot_id, status, model_alias, epochs, model_size,
             transform_param, augmentation_param, created_at, created_by, model_track_key
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        duckdb::params![
            id,
            record.project_id,
            record.snapshot_id,
            TrainingStatus::Pending.as_str(),
            record.model_alias,
            record.epochs,
            record.model_size,
            record.transform_param,
            record.augmentation_param,
            now(),
            user,
            track_key,
        ],
    )
    .context("insert training_records")?;
    get_training_record(conn, id)?
        .ok_or_else(|| StoreError::QueryError(format!("training record {id} vanished after insert")))
}

pub fn get_training_record(conn: &Connection, id: i64) -> StoreResult<Option<TrainingRecord>> {
    query_opt(
        conn,
        &format!("SELECT {RECORD_COLUMNS} FROM lf.training_records WHERE id = ?"),
        duckdb::params![id],
        record_from_row,
        "select training_record",
    )
}

/// Records of a project, newest first.
pub fn list_training_records(
    conn: &Connection,
    project_id: i64,
) -> StoreResult<Vec<TrainingRecord>> {
    query_all(
        conn,
        &format!(
            "SELECT {RECORD_COLUMNS} FROM lf.training_records WHERE project_id = ? ORDER BY id DESC"
        ),
        duckdb::params![project_id],
        record_from_row,
        "list training_records",
    )
}

/// Records in `status`, oldest-started first. Never-started records sort last.
pub fn list_by_status(
    conn: &Connection,
    status: TrainingStatus,
    limit: Option<usize>,
) -> StoreResult<Vec<TrainingRecord>> {
    let limit_clause = limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default();
    query_all(
        conn,
        &format!(
            "SELECT {RECORD_COLUMNS} FROM lf.training_records
             WHERE status = ?
             ORDER BY started_at ASC NULLS LAST, id ASC{limit_clause}"
        ),
        duckdb::params![status.as_str()],
        record_from_row,
        "list training_records by status",
    )
}

/// `PENDING -> SUBMITTED`, storing the track id and exported counts.
///
/// Returns `false` when the record was no longer `PENDING`.
pub fn mark_submitted(
    conn: &Connection,
    id: i64,
    track_id: &str,
    counts: SubmittedCounts,
    user: &str,
) -> StoreResult<bool> {
    let class_ids = serde_json::to_string(&counts.class_ids)
        .map_err(|e| StoreError::QueryError(format!("encode training_records.class_ids: {e}")))?;
    let updated = conn
        .execute(
            "UPDATE lf.training_records
             SET status = ?, track_id = ?, training_count = ?, dev_count = ?, test_count = ?,
                 label_count = ?, class_ids = ?, started_at = ?, updated_by = ?
             WHERE id = ? AND status = ?",
            duckdb::params![
                TrainingStatus::Submitted.as_str(),
                track_id,
                counts.training,
                counts.dev,
                counts.test,
                counts.labels,
                class_ids,
                now(),
                user,
                id,
                TrainingStatus::Pending.as_str(),
            ],
        )
        .context("update training_records submitted")?;
    Ok(updated == 1)
}

/// Move a record from `from` to `to` if it is still in `from`.
///
/// Terminal targets stamp `completed_at`. Returns `false` when another
/// writer already moved the record.
pub fn transition_status(
    conn: &Connection,
    id: i64,
    from: TrainingStatus,
    to: TrainingStatus,
    error_message: Option<&str>,
    user: Option<&str>,
) -> StoreResult<bool> {
    if !from.can_transition_to(to) {
        return Err(StoreError::IllegalTransition { from, to });
    }
    let completed_at = to.is_terminal().then(now);
    let updated = conn
        .execute(
            "UPDATE lf.training_records
             SET status = ?,
                 error_message = COALESCE(?, error_message),
                 completed_at = COALESCE(?, completed_at),
                 updated_by = COALESCE(?, updated_by)
             WHERE id = ? AND status = ?",
            duckdb::params![
                to.as_str(),
                error_message,
                completed_at,
                user,
                id,
                from.as_str()
            ],
        )
        .context("update training_records status")?;
    Ok(updated == 1)
}

/// Number of labels exported with the record's dataset.
pub fn submitted_label_count(conn: &Connection, id: i64) -> StoreResult<i64> {
    conn.query_row(
        "SELECT label_count FROM lf.training_records WHERE id = ?",
        duckdb::params![id],
        |row| row.get(0),
    )
    .context("select training_records.label_count")
}

/// Class ids in the label-index order the record was exported with.
///
/// `None` when the record never reached `SUBMITTED`.
pub fn submitted_class_ids(conn: &Connection, id: i64) -> StoreResult<Option<Vec<i64>>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT class_ids FROM lf.training_records WHERE id = ?",
            duckdb::params![id],
            |row| row.get(0),
        )
        .context("select training_records.class_ids")?;
    raw.map(|text| {
        serde_json::from_str(&text).map_err(|e| StoreError::CorruptRow {
            table: "training_records",
            message: format!("class_ids of record {id}: {e}"),
        })
    })
    .transpose()
}
