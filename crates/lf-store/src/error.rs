//! Error types for the dataset store.

use thiserror::Error;

/// Dataset store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open or create the store (S001).
    #[error("[S001] Dataset store connection failed: {0}")]
    ConnectionError(String),

    /// Schema migration failed (S002).
    #[error("[S002] Dataset store migration failed: {0}")]
    MigrationError(String),

    /// SQL execution error (S003).
    #[error("[S003] Dataset store query failed: {0}")]
    QueryError(String),

    /// Transaction management error (S004).
    #[error("[S004] Dataset store transaction failed: {0}")]
    TransactionError(String),

    /// Connection mutex poisoned by a panicking holder (S005).
    #[error("[S005] Dataset store mutex poisoned: {0}")]
    MutexPoisoned(String),

    /// A stored value could not be decoded into its domain type (S006).
    #[error("[S006] Corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },

    /// A conditional status update named a transition the state machine forbids (S008).
    #[error("[S008] Illegal training status transition {from} -> {to}")]
    IllegalTransition {
        from: lf_core::TrainingStatus,
        to: lf_core::TrainingStatus,
    },

    /// DuckDB driver error with preserved source chain (S007).
    #[error("[S007] DuckDB error")]
    DuckDb(#[source] duckdb::Error),
}

/// Result type alias for [`StoreError`].
pub type StoreResult<T> = Result<T, StoreError>;

impl From<duckdb::Error> for StoreError {
    fn from(err: duckdb::Error) -> Self {
        StoreError::DuckDb(err)
    }
}

/// Attach call-site context to a raw DuckDB result.
pub(crate) trait StoreResultExt<T> {
    fn context(self, what: &str) -> StoreResult<T>;
}

impl<T> StoreResultExt<T> for Result<T, duckdb::Error> {
    fn context(self, what: &str) -> StoreResult<T> {
        self.map_err(|e| StoreError::QueryError(format!("{what}: {e}")))
    }
}
