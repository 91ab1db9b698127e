//! Configuration types and parsing for labelforge.yml

use crate::error::{CoreError, CoreResult};
use crate::split::SplitRatio;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Backend configuration from labelforge.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Dataset store connection
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Root of the external image storage; images live at
    /// `<image_root>/<project_id>/<file_name>`
    #[serde(default = "default_image_root")]
    pub image_root: String,

    /// External training service endpoint
    #[serde(default)]
    pub training_service: Option<TrainingServiceConfig>,

    /// Training result poller schedule
    #[serde(default)]
    pub poller: PollerConfig,

    /// Split assignment defaults
    #[serde(default)]
    pub split: SplitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// DuckDB file path, or `:memory:`
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingServiceConfig {
    /// Base URL, e.g. `http://trainer:8080/api`
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sent verbatim as the `Authorization` header when set
    #[serde(default)]
    pub api_key: Option<String>,
}

impl TrainingServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollerConfig {
    /// Seconds between ticks
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Max WAITFORRESULT records handled per tick (all when unset)
    #[serde(default)]
    pub batch_limit: Option<usize>,
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            batch_limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SplitConfig {
    /// Ratio used when neither the request nor a stored ProjectSplit applies
    #[serde(default)]
    pub default_ratio: SplitRatio,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            image_root: default_image_root(),
            training_service: None,
            poller: PollerConfig::default(),
            split: SplitConfig::default(),
        }
    }
}

fn default_db_path() -> String {
    "labelforge.duckdb".to_string()
}

fn default_image_root() -> String {
    "images".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_interval_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a directory
    /// Looks for labelforge.yml or labelforge.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("labelforge.yml");
        let yaml_path = dir.join("labelforge.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> CoreResult<()> {
        if self.database.path.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "database.path cannot be empty".to_string(),
            });
        }

        if self.poller.interval_secs == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "poller.interval_secs must be greater than zero".to_string(),
            });
        }

        if let Some(service) = &self.training_service {
            if !(service.base_url.starts_with("http://") || service.base_url.starts_with("https://"))
            {
                return Err(CoreError::ConfigInvalid {
                    message: format!(
                        "training_service.base_url must be an http(s) URL, got '{}'",
                        service.base_url
                    ),
                });
            }
            if service.timeout_secs == 0 {
                return Err(CoreError::ConfigInvalid {
                    message: "training_service.timeout_secs must be greater than zero".to_string(),
                });
            }
        }

        self.split.default_ratio.validate()
    }

    /// The training service section, required by commands that submit or poll.
    pub fn training_service(&self) -> CoreResult<&TrainingServiceConfig> {
        self.training_service
            .as_ref()
            .ok_or_else(|| CoreError::ConfigInvalid {
                message: "training_service section is required for training operations"
                    .to_string(),
            })
    }

    /// Database path resolved against a base directory; `:memory:` and
    /// absolute paths are returned unchanged
    pub fn database_path_absolute(&self, base: &Path) -> String {
        if self.database.path == ":memory:" {
            return self.database.path.clone();
        }
        base.join(&self.database.path).display().to_string()
    }

    /// Image root resolved against a base directory
    pub fn image_root_absolute(&self, base: &Path) -> PathBuf {
        base.join(&self.image_root)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
