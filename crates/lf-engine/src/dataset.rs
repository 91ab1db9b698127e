//! Guarded mutations of live dataset rows owned by other subsystems.

use crate::error::{EngineError, EngineResult};
use lf_store::repo::classes::{self, ClassDeletion};
use lf_store::StoreDb;
use std::sync::Arc;

pub struct DatasetService {
    store: Arc<StoreDb>,
}

impl DatasetService {
    pub fn new(store: Arc<StoreDb>) -> Self {
        Self { store }
    }

    /// Delete a class. Rejected while labels or split rows reference it.
    pub fn delete_class(&self, class_id: i64, user: &str) -> EngineResult<()> {
        let outcome = self
            .store
            .transaction(|conn| classes::delete_class(conn, class_id))?;
        match outcome {
            ClassDeletion::Deleted => {
                log::info!("Class {class_id} deleted by {user}");
                Ok(())
            }
            ClassDeletion::NotFound => Err(EngineError::not_found("class", class_id)),
            ClassDeletion::InUse {
                label_count,
                split_count,
            } => Err(EngineError::Conflict(format!(
                "class {class_id} is referenced by {label_count} label(s) and {split_count} split setting(s)"
            ))),
        }
    }
}
