use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use crate::error::{BqvError, Result};
use crate::sync::{ComparePolicy, SyncOptions};

pub const CONFIG_FILE: &str = "bqv.yaml";
pub const DEFAULT_LOCATION: &str = "US";
pub const DEFAULT_DIR: &str = "./views";
pub const SCHEDULE_MANIFEST_FILE: &str = ".schedules.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project_id: Option<String>,
    pub location: String,
    /// Root of the file repository.
    pub dir: PathBuf,
    /// Prepended to every physical dataset name, e.g. `test_`.
    pub dataset_prefix: Option<String>,
    pub compare: ComparePolicy,
    pub concurrency: usize,
    pub timeout_secs: Option<u64>,
    pub schedule_manifest: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: None,
            location: DEFAULT_LOCATION.to_string(),
            dir: PathBuf::from(DEFAULT_DIR),
            dataset_prefix: None,
            compare: ComparePolicy::default(),
            concurrency: 1,
            timeout_secs: None,
            schedule_manifest: None,
        }
    }
}

/// Values given on the command line. Each one set wins over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub project_id: Option<String>,
    pub dir: Option<PathBuf>,
    pub dataset_prefix: Option<String>,
    pub timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
}

impl Config {
    /// `bqv.yaml` in the working directory, else the user config directory.
    pub fn default_path() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("bqv").join("config.yaml"))
            .filter(|path| path.is_file())
    }

    /// Load from `path`, or from the default lookup when none is given.
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => {
                    debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path).map_err(|e| {
            BqvError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        debug!("Loaded config from {}", path.display());
        Self::from_yaml(&content)
            .map_err(|e| BqvError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply(mut self, overrides: ConfigOverrides) -> Result<Self> {
        if overrides.project_id.is_some() {
            self.project_id = overrides.project_id;
        }
        if let Some(dir) = overrides.dir {
            self.dir = dir;
        }
        if overrides.dataset_prefix.is_some() {
            self.dataset_prefix = overrides.dataset_prefix;
        }
        if overrides.timeout_secs.is_some() {
            self.timeout_secs = overrides.timeout_secs;
        }
        if let Some(concurrency) = overrides.concurrency {
            self.concurrency = concurrency;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(BqvError::Config("concurrency must be at least 1".into()));
        }
        if self.location.trim().is_empty() {
            return Err(BqvError::Config("location must not be empty".into()));
        }
        if self.timeout_secs == Some(0) {
            return Err(BqvError::Config("timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn project_id(&self) -> Result<&str> {
        self.project_id
            .as_deref()
            .ok_or_else(|| BqvError::Config("GCP project not set (use --project or GCP_PROJECT_ID)".into()))
    }

    pub fn dataset_prefix(&self) -> Option<String> {
        self.dataset_prefix.clone().filter(|p| !p.is_empty())
    }

    pub fn schedule_manifest_path(&self) -> PathBuf {
        self.schedule_manifest
            .clone()
            .unwrap_or_else(|| self.dir.join(SCHEDULE_MANIFEST_FILE))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn sync_options(&self, cancel: CancellationToken) -> SyncOptions {
        SyncOptions::default()
            .with_concurrency(self.concurrency)
            .with_compare(self.compare)
            .with_cancel(cancel)
    }
}
