//! Shared helpers for sequences, timestamps, and row collection.

use crate::error::{StoreResult, StoreResultExt};
use chrono::{NaiveDateTime, Utc};
use duckdb::{Connection, Params, Row};

/// Wrap a domain decoding error so it can be returned from a row mapper.
pub(crate) fn decode<T, E>(idx: usize, result: Result<T, E>) -> duckdb::Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    result.map_err(|e| {
        duckdb::Error::FromSqlConversionFailure(idx, duckdb::types::Type::Text, Box::new(e))
    })
}

/// Draw the next id from a sequence.
pub(crate) fn next_id(conn: &Connection, sequence: &str) -> StoreResult<i64> {
    conn.query_row(&format!("SELECT nextval('{sequence}')"), [], |row| {
        row.get(0)
    })
    .context(sequence)
}

/// Current UTC time in the form bound to TIMESTAMP columns.
pub(crate) fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Run a query and collect every mapped row.
pub(crate) fn query_all<T, P, F>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: F,
    what: &str,
) -> StoreResult<Vec<T>>
where
    P: Params,
    F: FnMut(&Row<'_>) -> duckdb::Result<T>,
{
    let mut stmt = conn.prepare(sql).context(what)?;
    let rows = stmt
        .query_map(params, map)
        .context(what)?
        .collect::<Result<Vec<_>, _>>()
        .context(what)?;
    Ok(rows)
}

/// Run a query expected to return at most one row.
pub(crate) fn query_opt<T, P, F>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: F,
    what: &str,
) -> StoreResult<Option<T>>
where
    P: Params,
    F: FnOnce(&Row<'_>) -> duckdb::Result<T>,
{
    match conn.query_row(sql, params, map) {
        Ok(value) => Ok(Some(value)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context(what),
    }
}
