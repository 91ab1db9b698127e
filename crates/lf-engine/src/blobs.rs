//! Access to the external image storage.

use crate::error::{EngineError, EngineResult};
use std::path::{Path, PathBuf};

/// Raw image bytes keyed by project and file name.
pub trait ImageBlobStore: Send + Sync {
    /// Bytes of one image, `None` when the file is absent.
    fn read(&self, project_id: i64, file_name: &str) -> EngineResult<Option<Vec<u8>>>;

    /// Make `file_name` of `from_project` available under `to_project`.
    ///
    /// Returns `false` when the source file is absent.
    fn copy_to_project(&self, from_project: i64, to_project: i64, file_name: &str)
        -> EngineResult<bool>;
}

/// Images on local disk at `<root>/<project_id>/<file_name>`.
pub struct FsImageBlobStore {
    root: PathBuf,
}

impl FsImageBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, project_id: i64, file_name: &str) -> PathBuf {
        self.root.join(project_id.to_string()).join(file_name)
    }
}

fn io_error(path: &Path, err: std::io::Error) -> EngineError {
    EngineError::Export(format!("{}: {err}", path.display()))
}

impl ImageBlobStore for FsImageBlobStore {
    fn read(&self, project_id: i64, file_name: &str) -> EngineResult<Option<Vec<u8>>> {
        let path = self.path_for(project_id, file_name);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    fn copy_to_project(
        &self,
        from_project: i64,
        to_project: i64,
        file_name: &str,
    ) -> EngineResult<bool> {
        let source = self.path_for(from_project, file_name);
        if !source.exists() {
            return Ok(false);
        }
        let target = self.path_for(to_project, file_name);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        std::fs::copy(&source, &target).map_err(|e| io_error(&target, e))?;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "blobs_test.rs"]
mod tests;
