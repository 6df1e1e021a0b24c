use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use async_trait::async_trait;
use uuid::Uuid;
use crate::error::{BqvError, Result};
use super::{JobHandle, ScheduleDirectory, ScheduledJob};

/// In-process scheduling directory.
#[derive(Debug, Default)]
pub struct MemoryScheduleDirectory {
    jobs: Mutex<BTreeMap<String, ScheduledJob>>,
}

impl MemoryScheduleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job(&self, display_name: &str) -> Option<ScheduledJob> {
        self.lock().get(display_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, ScheduledJob>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ScheduleDirectory for MemoryScheduleDirectory {
    async fn list(&self) -> Result<BTreeMap<String, JobHandle>> {
        Ok(self
            .lock()
            .iter()
            .map(|(name, job)| (name.clone(), job.handle.clone()))
            .collect())
    }

    async fn create(
        &self,
        display_name: &str,
        target_dataset: &str,
        sql: &str,
        schedule: &str,
    ) -> Result<JobHandle> {
        let mut jobs = self.lock();
        if jobs.contains_key(display_name) {
            return Err(BqvError::Scheduler(format!("job {} already scheduled", display_name)));
        }
        let job = ScheduledJob::new(
            JobHandle::new(Uuid::new_v4().to_string()),
            display_name,
            target_dataset,
            sql,
            schedule,
        );
        let handle = job.handle.clone();
        jobs.insert(display_name.to_string(), job);
        Ok(handle)
    }

    async fn delete(&self, handle: &JobHandle) -> Result<()> {
        let mut jobs = self.lock();
        let name = jobs
            .iter()
            .find(|(_, job)| &job.handle == handle)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| BqvError::Scheduler(format!("unknown job {}", handle)))?;
        jobs.remove(&name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_list_delete() {
        let dir = MemoryScheduleDirectory::new();
        let handle = dir
            .create("sales.cached_revenue", "sales", "CREATE OR REPLACE TABLE ...", "every 15 minutes")
            .await
            .unwrap();

        let listed = dir.list().await.unwrap();
        assert_eq!(listed.get("sales.cached_revenue"), Some(&handle));
        assert_eq!(dir.job("sales.cached_revenue").unwrap().schedule, "every 15 minutes");

        dir.delete(&handle).await.unwrap();
        assert!(dir.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let dir = MemoryScheduleDirectory::new();
        dir.create("a.cached_b", "a", "sql", "every 1 hours").await.unwrap();
        assert!(dir.create("a.cached_b", "a", "sql", "every 1 hours").await.is_err());
        assert_eq!(dir.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_handle() {
        let dir = MemoryScheduleDirectory::new();
        assert!(dir.delete(&JobHandle::new("missing")).await.is_err());
    }
}
