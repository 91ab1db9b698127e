//! Training records, trained models, and their evaluation artifacts.

use crate::error::{CoreError, CoreResult};
use crate::status::{ModelStatus, TrainingStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One model configuration submitted for training.
///
/// `model_param` is an optional raw JSON object whose `epochs`,
/// `modelSize`, `transformParam`, and `augmentationParam` keys override
/// the typed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub model_alias: String,
    #[serde(default = "default_epochs")]
    pub epochs: u32,
    #[serde(default = "default_model_size")]
    pub model_size: String,
    #[serde(default)]
    pub transform_param: Option<serde_json::Value>,
    #[serde(default)]
    pub augmentation_param: Option<serde_json::Value>,
    #[serde(default)]
    pub model_param: Option<String>,
}

fn default_epochs() -> u32 {
    100
}

fn default_model_size() -> String {
    "s".to_string()
}

impl ModelConfig {
    pub fn new(model_alias: impl Into<String>, epochs: u32, model_size: impl Into<String>) -> Self {
        Self {
            model_alias: model_alias.into(),
            epochs,
            model_size: model_size.into(),
            transform_param: None,
            augmentation_param: None,
            model_param: None,
        }
    }

    /// Merge `model_param` into the typed fields and validate the result.
    pub fn resolve(&self) -> CoreResult<ModelConfig> {
        let mut resolved = self.clone();
        if let Some(raw) = self.model_param.as_deref().filter(|s| !s.trim().is_empty()) {
            let value: serde_json::Value =
                serde_json::from_str(raw).map_err(|e| CoreError::MalformedJson {
                    field: "modelParam".to_string(),
                    message: e.to_string(),
                })?;
            let obj = value.as_object().ok_or_else(|| CoreError::MalformedJson {
                field: "modelParam".to_string(),
                message: "expected a JSON object".to_string(),
            })?;
            if let Some(epochs) = obj.get("epochs") {
                resolved.epochs = epochs
                    .as_u64()
                    .and_then(|e| u32::try_from(e).ok())
                    .ok_or_else(|| CoreError::MalformedJson {
                        field: "modelParam.epochs".to_string(),
                        message: format!("expected a positive integer, got {epochs}"),
                    })?;
            }
            if let Some(size) = obj.get("modelSize") {
                resolved.model_size = size
                    .as_str()
                    .ok_or_else(|| CoreError::MalformedJson {
                        field: "modelParam.modelSize".to_string(),
                        message: format!("expected a string, got {size}"),
                    })?
                    .to_string();
            }
            if let Some(transform) = obj.get("transformParam") {
                resolved.transform_param = Some(transform.clone());
            }
            if let Some(augmentation) = obj.get("augmentationParam") {
                resolved.augmentation_param = Some(augmentation.clone());
            }
            resolved.model_param = None;
        }

        if resolved.model_alias.trim().is_empty() {
            return Err(CoreError::MalformedJson {
                field: "modelAlias".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if resolved.epochs == 0 {
            return Err(CoreError::MalformedJson {
                field: "epochs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(resolved)
    }
}

/// One submission of a dataset + model configuration to the training service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRecord {
    pub id: i64,
    pub project_id: i64,
    pub snapshot_id: Option<i64>,
    pub status: TrainingStatus,
    pub model_alias: String,
    pub track_id: Option<String>,
    pub epochs: i32,
    pub model_size: String,
    pub transform_param: Option<String>,
    pub augmentation_param: Option<String>,
    pub training_count: i64,
    pub dev_count: i64,
    pub test_count: i64,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub model_track_key: String,
}

/// F1 / precision / recall for one evaluation set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetScores {
    pub f1: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: i64,
    pub project_id: i64,
    pub training_record_id: i64,
    pub model_alias: String,
    pub model_version: i32,
    pub track_id: String,
    pub status: ModelStatus,
    pub image_count: i64,
    pub label_count: i64,
    pub is_favorite: bool,
    pub training: SetScores,
    pub dev: SetScores,
    pub test: SetScores,
    pub created_at: DateTime<Utc>,
}

/// Per-model correctness rates and the confidence threshold they were computed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidentialReport {
    pub id: i64,
    pub model_id: i64,
    pub training_correct_rate: f64,
    pub dev_correct_rate: f64,
    pub test_correct_rate: f64,
    pub confidence_threshold: f64,
}

/// One point of a loss or validation curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub epoch: i32,
    pub value: f64,
}

/// A label predicted by a specific model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePredictionLabel {
    pub id: i64,
    pub image_id: i64,
    pub class_id: i64,
    pub model_id: i64,
    pub position: String,
    pub confidence_rate: f64,
}

#[cfg(test)]
#[path = "training_test.rs"]
mod tests;
