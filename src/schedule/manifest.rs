use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;
use crate::error::{BqvError, Result};
use super::{JobHandle, ScheduleDirectory};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub handle: JobHandle,
    pub display_name: String,
    pub dataset: String,
    pub query: String,
    pub schedule: String,
    pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn new(
        handle: JobHandle,
        display_name: impl Into<String>,
        dataset: impl Into<String>,
        query: impl Into<String>,
        schedule: impl Into<String>,
    ) -> Self {
        Self {
            handle,
            display_name: display_name.into(),
            dataset: dataset.into(),
            query: query.into(),
            schedule: schedule.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    #[serde(default)]
    jobs: Vec<ScheduledJob>,
}

/// Scheduling directory persisted as a YAML manifest that an external
/// runner (cron, Airflow, ...) turns into recurring snapshot refreshes.
pub struct ManifestScheduleDirectory {
    path: PathBuf,
    // serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl ManifestScheduleDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn jobs(&self) -> Result<Vec<ScheduledJob>> {
        Ok(self.load().await?.jobs)
    }

    async fn load(&self) -> Result<Manifest> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Manifest::default()),
            Ok(content) => serde_yaml::from_str(&content).map_err(|e| {
                BqvError::Scheduler(format!("Failed to parse {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Manifest::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, manifest: &Manifest) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let yaml = serde_yaml::to_string(manifest)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, yaml).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ScheduleDirectory for ManifestScheduleDirectory {
    async fn list(&self) -> Result<BTreeMap<String, JobHandle>> {
        let manifest = self.load().await?;
        debug!("Loaded {} scheduled job(s) from {}", manifest.jobs.len(), self.path.display());
        Ok(manifest
            .jobs
            .into_iter()
            .map(|job| (job.display_name, job.handle))
            .collect())
    }

    async fn create(
        &self,
        display_name: &str,
        target_dataset: &str,
        sql: &str,
        schedule: &str,
    ) -> Result<JobHandle> {
        let _guard = self.lock.lock().await;
        let mut manifest = self.load().await?;

        if manifest.jobs.iter().any(|j| j.display_name == display_name) {
            return Err(BqvError::Scheduler(format!("job {} already scheduled", display_name)));
        }

        let handle = JobHandle::new(Uuid::new_v4().to_string());
        manifest.jobs.push(ScheduledJob::new(
            handle.clone(),
            display_name,
            target_dataset,
            sql,
            schedule,
        ));
        manifest.jobs.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        self.save(&manifest).await?;

        info!("Scheduled {} ({})", display_name, schedule);
        Ok(handle)
    }

    async fn delete(&self, handle: &JobHandle) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut manifest = self.load().await?;

        let before = manifest.jobs.len();
        manifest.jobs.retain(|j| &j.handle != handle);
        if manifest.jobs.len() == before {
            return Err(BqvError::Scheduler(format!("unknown job {}", handle)));
        }
        self.save(&manifest).await?;

        info!("Unscheduled job {}", handle);
        Ok(())
    }
}
