//! lf-engine: dataset versioning, split assignment, and training lifecycle
//!
//! This crate holds the engines that sit between the dataset store and the
//! external training service: snapshots of a project's dataset, split
//! assignment, dataset export, training submission, result polling, and
//! model evaluation.

pub mod blobs;
pub mod dataset;
pub mod error;
pub mod export;
pub mod metrics;
pub mod poller;
pub mod snapshot;
pub mod split;
pub mod training;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use blobs::{FsImageBlobStore, ImageBlobStore};
pub use dataset::DatasetService;
pub use error::{EngineError, EngineResult, ErrorKind, ProcessingResult};
pub use export::{export_dataset, DatasetExport, ExportSummary};
pub use metrics::{ConfusionMatrix, MetricsAggregator, RecalculatedMetrics};
pub use poller::ResultPoller;
pub use snapshot::{SnapshotEngine, SnapshotPreviewStats};
pub use split::{AssignSplitsRequest, ClaimPolicy, SplitEngine};
pub use training::{StartTrainingRequest, TrainingOrchestrator};
