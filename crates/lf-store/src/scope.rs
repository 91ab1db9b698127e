//! Live-vs-snapshot addressing for dataset reads.

use std::fmt;

/// Which copy of a dataset a read targets.
///
/// Snapshot tables mirror the live tables column for column with an extra
/// `snapshot_id`, so every read function accepts a scope and the same row
/// mapper serves both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetScope {
    Live { project_id: i64 },
    Snapshot { snapshot_id: i64 },
}

impl DatasetScope {
    /// The snapshot when one is given, otherwise the live project.
    pub fn of(project_id: i64, snapshot_id: Option<i64>) -> Self {
        match snapshot_id {
            Some(snapshot_id) => DatasetScope::Snapshot { snapshot_id },
            None => DatasetScope::Live { project_id },
        }
    }

    /// Fully qualified table name for `base` (e.g. `images`).
    pub(crate) fn table(&self, base: &str) -> String {
        match self {
            DatasetScope::Live { .. } => format!("lf.{base}"),
            DatasetScope::Snapshot { .. } => format!("lf.snapshot_{base}"),
        }
    }

    /// The single bound parameter for [`Self::owner_filter`] / [`Self::label_filter`].
    pub(crate) fn key(&self) -> i64 {
        match self {
            DatasetScope::Live { project_id } => *project_id,
            DatasetScope::Snapshot { snapshot_id } => *snapshot_id,
        }
    }

    /// Predicate for tables owned directly by a project.
    pub(crate) fn owner_filter(&self) -> &'static str {
        match self {
            DatasetScope::Live { .. } => "project_id = ?",
            DatasetScope::Snapshot { .. } => "snapshot_id = ?",
        }
    }

    /// Predicate for labels, which are owned through their image.
    pub(crate) fn label_filter(&self) -> &'static str {
        match self {
            DatasetScope::Live { .. } => {
                "image_id IN (SELECT id FROM lf.images WHERE project_id = ?)"
            }
            DatasetScope::Snapshot { .. } => "snapshot_id = ?",
        }
    }
}

impl fmt::Display for DatasetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetScope::Live { project_id } => write!(f, "project {project_id}"),
            DatasetScope::Snapshot { snapshot_id } => write!(f, "snapshot {snapshot_id}"),
        }
    }
}
