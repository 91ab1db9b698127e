//! JSON payloads exchanged with the training service.

use chrono::{DateTime, Utc};
use lf_core::{ChartPoint, ProjectType, SetScores};
use serde::{Deserialize, Serialize};

/// Model configuration sent alongside the dataset archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub project_id: i64,
    pub model_track_key: String,
    pub model_alias: String,
    pub project_type: ProjectType,
    pub epochs: u32,
    pub model_size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform_param: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub augmentation_param: Option<serde_json::Value>,
    /// Class names in label-index order
    pub class_names: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmitResponse {
    pub track_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Finished,
    Failed,
    #[serde(other)]
    Unknown,
}

impl JobState {
    /// Whether the job was accepted and has not failed.
    pub fn is_alive(&self) -> bool {
        matches!(self, JobState::Queued | JobState::Running | JobState::Finished)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub state: JobState,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub estimated_completion_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: Option<String>,
}

impl JobStatus {
    pub fn running() -> Self {
        Self {
            state: JobState::Running,
            progress: None,
            phase: None,
            estimated_completion_at: None,
            message: None,
        }
    }
}

/// Answer to a result poll.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPayload {
    pub ready: bool,
    #[serde(default)]
    pub metrics: Option<ResultMetrics>,
    #[serde(default)]
    pub loss_chart: Option<Vec<ChartPoint>>,
    #[serde(default)]
    pub validation_chart: Option<Vec<ChartPoint>>,
    #[serde(default)]
    pub prediction_images: Option<Vec<PredictionImage>>,
}

impl ResultPayload {
    pub fn not_ready() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetrics {
    pub training_correct_rate: f64,
    pub dev_correct_rate: f64,
    pub test_correct_rate: f64,
    pub confidence_threshold: f64,
    #[serde(default)]
    pub training: SetScores,
    #[serde(default)]
    pub dev: SetScores,
    #[serde(default)]
    pub test: SetScores,
}

/// Predictions for one image. Classes are referenced by their
/// zero-based label index, not by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionImage {
    pub image_id: i64,
    #[serde(default)]
    pub labels: Vec<PredictedLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictedLabel {
    pub class_seq: usize,
    pub position: serde_json::Value,
    pub confidence: f64,
}

#[cfg(test)]
#[path = "wire_test.rs"]
mod tests;
