//! Snapshot Engine: frozen copies of a project's dataset.
//!
//! Creating a snapshot copies every live row into the `snapshot_*` tables in
//! one transaction, keeping the original ids. Those rows are never updated
//! afterwards; they are read, restored from, or deleted with the snapshot.

use crate::blobs::ImageBlobStore;
use crate::error::{EngineError, EngineResult};
use crate::export::{export_dataset, DatasetExport};
use duckdb::Connection;
use lf_core::{Image, ImageLabel, Project, ProjectClass, Snapshot};
use lf_store::repo::images::{self, DatasetCounts, NewImage};
use lf_store::repo::{classes, labels, projects, snapshots, splits, tags};
use lf_store::{DatasetScope, StoreDb};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Counts shown before a snapshot is taken.
pub type SnapshotPreviewStats = DatasetCounts;

pub struct SnapshotEngine {
    store: Arc<StoreDb>,
    blobs: Arc<dyn ImageBlobStore>,
    reverting: Mutex<HashSet<i64>>,
}

/// Marks a project as being reverted until dropped.
struct RevertGuard<'a> {
    reverting: &'a Mutex<HashSet<i64>>,
    project_id: i64,
}

impl Drop for RevertGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.reverting.lock() {
            set.remove(&self.project_id);
        }
    }
}

fn require_project(conn: &Connection, project_id: i64) -> EngineResult<Project> {
    projects::get_project(conn, project_id)?
        .ok_or_else(|| EngineError::not_found("project", project_id))
}

fn require_snapshot(conn: &Connection, snapshot_id: i64) -> EngineResult<Snapshot> {
    snapshots::get_snapshot(conn, snapshot_id)?
        .ok_or_else(|| EngineError::not_found("snapshot", snapshot_id))
}

impl SnapshotEngine {
    pub fn new(store: Arc<StoreDb>, blobs: Arc<dyn ImageBlobStore>) -> Self {
        Self {
            store,
            blobs,
            reverting: Mutex::new(HashSet::new()),
        }
    }

    /// Freeze the current live dataset of `project_id` under `name`.
    ///
    /// Names are unique per project, compared case-sensitively.
    pub fn create_snapshot(
        &self,
        project_id: i64,
        name: &str,
        description: Option<&str>,
        user: &str,
    ) -> EngineResult<Snapshot> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation(
                "snapshot name must not be empty".to_string(),
            ));
        }
        let (snapshot, copied) = self.store.transaction(|conn| {
            require_project(conn, project_id)?;
            if snapshots::find_snapshot_by_name(conn, project_id, name)?.is_some() {
                return Err(EngineError::Conflict(format!(
                    "snapshot '{name}' already exists for project {project_id}"
                )));
            }
            let snapshot = snapshots::insert_snapshot(conn, project_id, name, description, user)?;
            let copied = snapshots::copy_live_into_snapshot(conn, project_id, snapshot.id)?;
            Ok((snapshot, copied))
        })?;
        log::info!(
            "Snapshot '{}' ({}) of project {project_id} created by {user}: {copied} rows",
            snapshot.snapshot_name,
            snapshot.id
        );
        Ok(snapshot)
    }

    /// Counts over the live dataset, i.e. what a snapshot would freeze now.
    pub fn preview_stats(&self, project_id: i64) -> EngineResult<SnapshotPreviewStats> {
        self.store.with_conn(|conn| {
            require_project(conn, project_id)?;
            Ok(images::dataset_counts(
                conn,
                DatasetScope::Live { project_id },
            )?)
        })
    }

    pub fn list_snapshots(&self, project_id: i64) -> EngineResult<Vec<Snapshot>> {
        self.store.with_conn(|conn| {
            require_project(conn, project_id)?;
            Ok(snapshots::list_snapshots(conn, project_id)?)
        })
    }

    pub fn get_snapshot(&self, snapshot_id: i64) -> EngineResult<Snapshot> {
        self.store
            .with_conn(|conn| require_snapshot(conn, snapshot_id))
    }

    pub fn snapshot_images(&self, snapshot_id: i64) -> EngineResult<Vec<Image>> {
        self.store.with_conn(|conn| {
            require_snapshot(conn, snapshot_id)?;
            Ok(images::list_images(conn, DatasetScope::Snapshot { snapshot_id })?)
        })
    }

    pub fn snapshot_classes(&self, snapshot_id: i64) -> EngineResult<Vec<ProjectClass>> {
        self.store.with_conn(|conn| {
            require_snapshot(conn, snapshot_id)?;
            Ok(classes::list_classes(conn, DatasetScope::Snapshot { snapshot_id })?)
        })
    }

    pub fn snapshot_labels(&self, snapshot_id: i64) -> EngineResult<Vec<ImageLabel>> {
        self.store.with_conn(|conn| {
            require_snapshot(conn, snapshot_id)?;
            Ok(labels::list_labels(conn, DatasetScope::Snapshot { snapshot_id })?)
        })
    }

    /// Create a new project whose live dataset is a copy of the snapshot.
    ///
    /// Every row gets a fresh id; labels and split settings are re-pointed
    /// at the new image and class rows. Image files are copied after commit;
    /// missing or failed copies are logged and the project is still returned.
    pub fn create_project_from_snapshot(
        &self,
        snapshot_id: i64,
        new_name: &str,
        user: &str,
    ) -> EngineResult<Project> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(EngineError::Validation(
                "project name must not be empty".to_string(),
            ));
        }
        let scope = DatasetScope::Snapshot { snapshot_id };

        let (project, source_project_id, file_names) = self.store.transaction(|conn| {
            let snapshot = require_snapshot(conn, snapshot_id)?;
            let source = require_project(conn, snapshot.project_id)?;
            let project = projects::insert_project(conn, new_name, source.project_type, user)?;

            let mut class_ids: HashMap<i64, i64> = HashMap::new();
            for class in classes::list_classes(conn, scope)? {
                let new_id = classes::insert_class(
                    conn,
                    project.id,
                    &class.class_name,
                    &class.color_code,
                    class.description.as_deref(),
                    user,
                )?;
                class_ids.insert(class.id, new_id);
            }

            let mut image_ids: HashMap<i64, i64> = HashMap::new();
            let mut file_names = Vec::new();
            for image in images::list_images(conn, scope)? {
                let new_image = NewImage {
                    file_name: image.file_name.clone(),
                    file_size: image.file_size,
                    width: image.width,
                    height: image.height,
                    split: image.split,
                    is_labeled: image.is_labeled,
                    is_no_class: image.is_no_class,
                };
                let new_id = images::insert_image(conn, project.id, &new_image, user)?;
                image_ids.insert(image.id, new_id);
                file_names.push(image.file_name);
            }

            for label in labels::list_labels(conn, scope)? {
                let image_id = remap(&image_ids, "image", label.image_id)?;
                let class_id = remap(&class_ids, "class", label.class_id)?;
                labels::insert_label(conn, image_id, class_id, &label.position, user)?;
            }
            // insert_label marks images labeled; restore the copied flags.
            for image in images::list_images(conn, scope)? {
                let new_id = remap(&image_ids, "image", image.id)?;
                images::set_label_state(conn, new_id, image.is_labeled, image.is_no_class)?;
            }

            for tag in tags::list_tags(conn, scope)? {
                tags::insert_tag(conn, project.id, &tag.tag_name, &tag.color_code, user)?;
            }
            for meta in tags::list_metadata(conn, scope)? {
                tags::insert_metadata(conn, project.id, &meta.name, meta.value.as_deref(), user)?;
            }
            for split in splits::list_splits(conn, scope)? {
                let class_id = split
                    .class_id
                    .map(|id| remap(&class_ids, "class", id))
                    .transpose()?;
                splits::upsert_split(conn, project.id, class_id, split.ratio)?;
            }

            Ok::<_, EngineError>((project, snapshot.project_id, file_names))
        })?;

        let mut missing = 0usize;
        for file_name in &file_names {
            match self
                .blobs
                .copy_to_project(source_project_id, project.id, file_name)
            {
                Ok(true) => {}
                Ok(false) => missing += 1,
                Err(e) => {
                    missing += 1;
                    log::error!(
                        "Could not copy image '{file_name}' into project {}: {e}",
                        project.id
                    );
                }
            }
        }
        if missing > 0 {
            log::warn!(
                "{missing} image file(s) of project {source_project_id} were not copied while forking snapshot {snapshot_id}"
            );
        }
        log::info!(
            "Project '{}' ({}) created from snapshot {snapshot_id} by {user}",
            project.name,
            project.id
        );
        Ok(project)
    }

    /// Replace the live dataset of `project_id` with the snapshot's rows,
    /// keeping their original ids.
    ///
    /// All-or-nothing: the delete and the re-insert share one transaction.
    pub fn revert_project_to_snapshot(
        &self,
        snapshot_id: i64,
        project_id: i64,
        user: &str,
    ) -> EngineResult<()> {
        let _guard = self.begin_revert(project_id)?;
        let restored = self.store.transaction(|conn| {
            require_project(conn, project_id)?;
            let snapshot = require_snapshot(conn, snapshot_id)?;
            if snapshot.project_id != project_id {
                return Err(EngineError::Validation(format!(
                    "snapshot {snapshot_id} belongs to project {}, not {project_id}",
                    snapshot.project_id
                )));
            }
            Ok(snapshots::restore_into_live(conn, project_id, snapshot_id)?)
        })?;
        log::info!(
            "Project {project_id} reverted to snapshot {snapshot_id} by {user}: {restored} rows"
        );
        Ok(())
    }

    fn begin_revert(&self, project_id: i64) -> EngineResult<RevertGuard<'_>> {
        let mut set = self
            .reverting
            .lock()
            .map_err(|e| EngineError::Conflict(format!("revert registry poisoned: {e}")))?;
        if !set.insert(project_id) {
            return Err(EngineError::Conflict(format!(
                "project {project_id} is already being reverted"
            )));
        }
        Ok(RevertGuard {
            reverting: &self.reverting,
            project_id,
        })
    }

    pub fn delete_snapshot(&self, snapshot_id: i64, user: &str) -> EngineResult<()> {
        let removed = self.store.transaction(|conn| {
            require_snapshot(conn, snapshot_id)?;
            Ok::<_, EngineError>(snapshots::delete_snapshot_rows(conn, snapshot_id)?)
        })?;
        log::info!("Snapshot {snapshot_id} deleted by {user}: {removed} rows");
        Ok(())
    }

    /// Build the training archive from the snapshot's rows.
    pub fn download_snapshot_dataset(&self, snapshot_id: i64) -> EngineResult<DatasetExport> {
        self.store.with_conn(|conn| {
            let snapshot = require_snapshot(conn, snapshot_id)?;
            let project = require_project(conn, snapshot.project_id)?;
            export_dataset(
                conn,
                DatasetScope::Snapshot { snapshot_id },
                project.project_type,
                self.blobs.as_ref(),
            )
        })
    }
}

fn remap(ids: &HashMap<i64, i64>, entity: &str, old: i64) -> EngineResult<i64> {
    ids.get(&old).copied().ok_or_else(|| {
        EngineError::Validation(format!(
            "snapshot row references {entity} {old} which is not part of the snapshot"
        ))
    })
}

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod tests;
