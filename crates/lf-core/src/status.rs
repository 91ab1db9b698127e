//! Lifecycle states for training records and models.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a training record.
///
/// ```text
/// PENDING -> SUBMITTED -> WAITFORRESULT -> COMPLETE | FAILED
///     \__________\______________\________> CANCELLED
/// ```
///
/// `PENDING` and `SUBMITTED` may also fail locally when the dataset export
/// or the submission call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrainingStatus {
    /// Created locally, no track id yet
    Pending,
    /// External service accepted the job and returned a track id
    Submitted,
    /// External job confirmed running; the poller owns it from here
    #[serde(rename = "WAITFORRESULT")]
    WaitForResult,
    /// Results persisted
    Complete,
    /// Export, submission, or result processing failed
    Failed,
    /// Cancelled by a user
    Cancelled,
}

impl TrainingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingStatus::Pending => "PENDING",
            TrainingStatus::Submitted => "SUBMITTED",
            TrainingStatus::WaitForResult => "WAITFORRESULT",
            TrainingStatus::Complete => "COMPLETE",
            TrainingStatus::Failed => "FAILED",
            TrainingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> CoreResult<Self> {
        match value {
            "PENDING" => Ok(TrainingStatus::Pending),
            "SUBMITTED" => Ok(TrainingStatus::Submitted),
            "WAITFORRESULT" => Ok(TrainingStatus::WaitForResult),
            "COMPLETE" => Ok(TrainingStatus::Complete),
            "FAILED" => Ok(TrainingStatus::Failed),
            "CANCELLED" => Ok(TrainingStatus::Cancelled),
            _ => Err(CoreError::UnknownDiscriminator {
                kind: "training status",
                value: value.to_string(),
            }),
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrainingStatus::Complete | TrainingStatus::Failed | TrainingStatus::Cancelled
        )
    }

    /// Whether `self -> next` is a legal edge of the state machine.
    pub fn can_transition_to(&self, next: TrainingStatus) -> bool {
        use TrainingStatus::*;
        matches!(
            (self, next),
            (Pending, Submitted)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Submitted, WaitForResult)
                | (Submitted, Failed)
                | (Submitted, Cancelled)
                | (WaitForResult, Complete)
                | (WaitForResult, Failed)
                | (WaitForResult, Cancelled)
        )
    }
}

impl fmt::Display for TrainingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a trained model. Deleting a model only deactivates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelStatus {
    #[default]
    Active,
    Inactive,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Active => "ACTIVE",
            ModelStatus::Inactive => "INACTIVE",
        }
    }

    pub fn parse(value: &str) -> CoreResult<Self> {
        match value {
            "ACTIVE" => Ok(ModelStatus::Active),
            "INACTIVE" => Ok(ModelStatus::Inactive),
            _ => Err(CoreError::UnknownDiscriminator {
                kind: "model status",
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
#[path = "status_test.rs"]
mod tests;
