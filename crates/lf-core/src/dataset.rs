//! Dataset entities owned by a project.
//!
//! Plain records referenced by integer id. Relationships are resolved through
//! explicit store queries, never through embedded references.

use crate::error::{CoreError, CoreResult};
use crate::split::{Split, SplitRatio};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of vision task a project is labeled for. Drives the export layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    #[default]
    Detection,
    Classification,
    Segmentation,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Detection => "detection",
            ProjectType::Classification => "classification",
            ProjectType::Segmentation => "segmentation",
        }
    }

    pub fn parse(value: &str) -> CoreResult<Self> {
        match value.to_ascii_lowercase().as_str() {
            "detection" => Ok(ProjectType::Detection),
            "classification" => Ok(ProjectType::Classification),
            "segmentation" => Ok(ProjectType::Segmentation),
            _ => Err(CoreError::UnknownDiscriminator {
                kind: "project type",
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A labeling project (only the fields this backend needs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub project_type: ProjectType,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: i64,
    pub project_id: i64,
    pub file_name: String,
    pub file_size: i64,
    pub width: i32,
    pub height: i32,
    pub split: Split,
    pub is_labeled: bool,
    pub is_no_class: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

/// Ground-truth label. `position` is the raw JSON geometry (see [`crate::geometry`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLabel {
    pub id: i64,
    pub image_id: i64,
    pub class_id: i64,
    pub position: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectClass {
    pub id: i64,
    pub project_id: i64,
    pub class_name: String,
    pub color_code: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTag {
    pub id: i64,
    pub project_id: i64,
    pub tag_name: String,
    pub color_code: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub value: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

/// Configured split ratio. `class_id = None` is the project-wide default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSplit {
    pub id: i64,
    pub project_id: i64,
    pub class_id: Option<i64>,
    #[serde(flatten)]
    pub ratio: SplitRatio,
}

/// Immutable marker for a frozen copy of a project's dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: i64,
    pub project_id: i64,
    pub snapshot_name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}
