//! Repository functions, one submodule per table family.
//!
//! Each function takes `&Connection` so callers can wrap several of them in
//! a single transaction via `StoreDb::transaction`. Reads that make sense for
//! both live and frozen data take a [`crate::DatasetScope`].

pub mod classes;
pub mod images;
pub mod labels;
pub mod models;
pub mod projects;
pub mod snapshots;
pub mod splits;
pub mod tags;
pub mod training;
