//! Dataset store for Labelforge.
//!
//! DuckDB-backed storage for the live dataset of each project (images,
//! labels, classes, tags, metadata, split ratios), the write-once snapshot
//! copies of it, and the training records, models, and evaluation artifacts
//! produced downstream.

pub mod connection;
pub mod ddl;
pub mod error;
pub mod migration;
pub mod repo;
pub(crate) mod row_helpers;
pub mod scope;

pub use connection::{clear_live_dataset, StoreDb};
pub use error::{StoreError, StoreResult};
pub use scope::DatasetScope;
