//! Runtime context for CLI commands

use anyhow::{Context, Result};
use lf_core::{Config, CoreError};
use lf_engine::{
    DatasetService, FsImageBlobStore, ImageBlobStore, MetricsAggregator, ResultPoller,
    SnapshotEngine, SplitEngine, TrainingOrchestrator,
};
use lf_store::StoreDb;
use lf_trainer::{HttpTrainingService, TrainingService};
use std::path::Path;
use std::sync::Arc;

use crate::cli::GlobalArgs;

/// Loaded configuration plus the shared store and image storage.
pub struct RuntimeContext {
    pub config: Config,
    pub store: Arc<StoreDb>,
    pub blobs: Arc<dyn ImageBlobStore>,
    /// Print JSON instead of tables
    pub json: bool,
}

impl RuntimeContext {
    /// Create a new runtime context from global arguments
    pub fn new(args: &GlobalArgs) -> Result<Self> {
        let project_path = Path::new(&args.project_dir);

        let config = match &args.config {
            Some(path) => {
                Config::load(Path::new(path)).context("Failed to load configuration file")?
            }
            None => match Config::load_from_dir(project_path) {
                Ok(config) => config,
                Err(CoreError::ConfigNotFound { path }) => {
                    log::debug!("No configuration at {path}, using defaults");
                    Config::default()
                }
                Err(e) => return Err(e).context("Failed to load configuration"),
            },
        };

        let db_path = match &args.database {
            Some(path) => path.clone(),
            None => config.database_path_absolute(project_path),
        };
        let store = Arc::new(
            StoreDb::new(&db_path)
                .with_context(|| format!("Failed to open database at {db_path}"))?,
        );
        log::debug!("Opened database {db_path}");

        let blobs: Arc<dyn ImageBlobStore> = Arc::new(FsImageBlobStore::new(
            config.image_root_absolute(project_path),
        ));

        Ok(Self {
            config,
            store,
            blobs,
            json: args.json,
        })
    }

    /// HTTP client for the configured training service.
    pub fn training_service(&self) -> Result<Arc<dyn TrainingService>> {
        let settings = self
            .config
            .training_service()
            .context("Training commands need a training_service section")?;
        let service = HttpTrainingService::new(settings)
            .context("Failed to create training service client")?;
        Ok(Arc::new(service))
    }

    pub fn snapshots(&self) -> SnapshotEngine {
        SnapshotEngine::new(Arc::clone(&self.store), Arc::clone(&self.blobs))
    }

    pub fn splits(&self) -> SplitEngine {
        SplitEngine::new(Arc::clone(&self.store), self.config.split.default_ratio)
    }

    pub fn dataset(&self) -> DatasetService {
        DatasetService::new(Arc::clone(&self.store))
    }

    pub fn orchestrator(&self) -> Result<TrainingOrchestrator> {
        Ok(TrainingOrchestrator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.blobs),
            self.training_service()?,
        ))
    }

    pub fn poller(&self) -> Result<ResultPoller> {
        Ok(ResultPoller::new(
            Arc::clone(&self.store),
            self.training_service()?,
            self.config.poller.batch_limit,
        ))
    }

    pub fn metrics(&self) -> MetricsAggregator {
        MetricsAggregator::new(Arc::clone(&self.store))
    }
}
