use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::error::{BqvError, Result};

/// Cadence used for a cached snapshot when the view does not name one.
pub const DEFAULT_SCHEDULING_TIME: &str = "every 24 hours";

/// Typed view metadata. Parsed and validated once where a repository reads
/// it; the reconciliation code only ever sees this struct.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSetting {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "is_false")]
    pub view_table: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduling_time: Option<String>,

    #[serde(rename = "materializedView", skip_serializing_if = "Option::is_none")]
    pub materialized_view: Option<MaterializedViewSetting>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializedViewSetting {
    #[serde(default = "default_enable_refresh")]
    pub enable_refresh: bool,
    #[serde(rename = "refreshInterval", default)]
    pub refresh_interval_ms: u64,
}

fn default_enable_refresh() -> bool {
    true
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl ViewSetting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_view_table(mut self, scheduling_time: Option<&str>) -> Self {
        self.view_table = true;
        self.scheduling_time = scheduling_time.map(|s| s.to_string());
        self
    }

    /// Keep the cache flags of `local` when this setting carries none.
    /// Warehouse listings never report them, so a dump must not erase the
    /// ones the files hold.
    pub fn with_cache_from(mut self, local: &ViewSetting) -> Self {
        if !self.view_table && self.scheduling_time.is_none() {
            self.view_table = local.view_table;
            self.scheduling_time = local.scheduling_time.clone();
        }
        self
    }

    /// Effective cadence for the cached snapshot job.
    pub fn schedule(&self) -> &str {
        self.scheduling_time.as_deref().unwrap_or(DEFAULT_SCHEDULING_TIME)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Description and labels only; the fields a warehouse stores as view metadata.
    pub fn same_metadata(&self, other: &ViewSetting) -> bool {
        self.description == other.description && self.labels == other.labels
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(key) = self.labels.keys().find(|k| k.trim().is_empty()) {
            return Err(BqvError::Config(format!("label key must not be empty (got {:?})", key)));
        }
        if let Some(time) = &self.scheduling_time {
            if time.trim().is_empty() {
                return Err(BqvError::Config("scheduling_time must not be empty".into()));
            }
        }
        Ok(())
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let setting: ViewSetting = serde_yaml::from_str(content)?;
        setting.validate()?;
        Ok(setting)
    }
}
