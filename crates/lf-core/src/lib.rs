//! lf-core - Core library for Labelforge
//!
//! This crate provides the shared domain types of the labeling backend:
//! dataset entities, the train/dev/test split vocabulary, the training
//! record state machine, label geometry, and configuration parsing.

pub mod config;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod split;
pub mod status;
pub mod training;

pub use config::Config;
pub use dataset::{
    Image, ImageLabel, Project, ProjectClass, ProjectMetadata, ProjectSplit, ProjectTag,
    ProjectType, Snapshot,
};
pub use error::{CoreError, CoreResult};
pub use geometry::{LabelPosition, YoloLine};
pub use split::{Split, SplitRatio};
pub use status::{ModelStatus, TrainingStatus};
pub use training::{
    ChartPoint, ConfidentialReport, ImagePredictionLabel, Model, ModelConfig, SetScores,
    TrainingRecord,
};
