//! Scheduling directory: the external jobs that refresh cached snapshot
//! tables, keyed by display name (`dataset.cached_name`).

mod manifest;
mod memory;

use std::collections::BTreeMap;
use std::fmt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::Result;

pub use manifest::{ManifestScheduleDirectory, ScheduledJob};
pub use memory::MemoryScheduleDirectory;

/// Opaque reference to a scheduled job, as issued by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait ScheduleDirectory: Send + Sync {
    async fn list(&self) -> Result<BTreeMap<String, JobHandle>>;

    async fn create(
        &self,
        display_name: &str,
        target_dataset: &str,
        sql: &str,
        schedule: &str,
    ) -> Result<JobHandle>;

    async fn delete(&self, handle: &JobHandle) -> Result<()>;
}
