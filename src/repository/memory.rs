use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use async_trait::async_trait;
use crate::error::{BqvError, Result};
use crate::view::{View, ViewId};
use super::{ViewReader, ViewWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryOp {
    Create(ViewId),
    Update(ViewId),
    Delete(ViewId),
}

/// In-process repository. Lists in identity order and records every write,
/// which makes it the reference destination for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    views: Mutex<BTreeMap<ViewId, View>>,
    history: Mutex<Vec<RepositoryOp>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_views(views: impl IntoIterator<Item = View>) -> Self {
        let repo = Self::new();
        {
            let mut map = repo.lock_views();
            for view in views {
                map.insert(view.id(), view);
            }
        }
        repo
    }

    /// Insert without recording history.
    pub fn insert(&self, view: View) {
        self.lock_views().insert(view.id(), view);
    }

    pub fn contains(&self, dataset: &str, name: &str) -> bool {
        self.lock_views().contains_key(&ViewId::new(dataset, name))
    }

    pub fn snapshot(&self) -> Vec<View> {
        self.lock_views().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock_views().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_views().is_empty()
    }

    pub fn history(&self) -> Vec<RepositoryOp> {
        self.lock_history().clone()
    }

    pub fn clear_history(&self) {
        self.lock_history().clear();
    }

    fn lock_views(&self) -> MutexGuard<'_, BTreeMap<ViewId, View>> {
        self.views.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_history(&self) -> MutexGuard<'_, Vec<RepositoryOp>> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ViewReader for MemoryRepository {
    async fn list(&self) -> Result<Vec<View>> {
        Ok(self.snapshot())
    }

    async fn get(&self, dataset: &str, name: &str) -> Result<View> {
        self.lock_views()
            .get(&ViewId::new(dataset, name))
            .cloned()
            .ok_or_else(|| BqvError::not_found(dataset, name))
    }
}

#[async_trait]
impl ViewWriter for MemoryRepository {
    async fn create(&self, view: &View) -> Result<View> {
        let id = view.id();
        {
            let mut views = self.lock_views();
            if views.contains_key(&id) {
                return Err(BqvError::Repository(format!("{} already exists", id)));
            }
            views.insert(id.clone(), view.clone());
        }
        self.lock_history().push(RepositoryOp::Create(id));
        Ok(view.clone())
    }

    async fn update(&self, view: &View) -> Result<View> {
        let id = view.id();
        {
            let mut views = self.lock_views();
            match views.get_mut(&id) {
                Some(existing) => *existing = view.clone(),
                None => return Err(BqvError::not_found(view.dataset(), view.name())),
            }
        }
        self.lock_history().push(RepositoryOp::Update(id));
        Ok(view.clone())
    }

    async fn delete(&self, view: &View) -> Result<()> {
        let id = view.id();
        if self.lock_views().remove(&id).is_none() {
            return Err(BqvError::not_found(view.dataset(), view.name()));
        }
        self.lock_history().push(RepositoryOp::Delete(id));
        Ok(())
    }
}
