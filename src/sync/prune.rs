use std::collections::BTreeMap;
use serde::Serialize;
use tracing::{debug, info, warn};
use crate::error::{BqvError, ItemFailure, ReconciliationError, Result, SyncStep};
use crate::repository::{ViewReader, ViewRepository};
use crate::view::{View, ViewId};
use super::compare::matches;
use super::SyncOptions;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub deleted: Vec<ViewId>,
    pub dry_run: bool,
}

impl PruneReport {
    pub fn len(&self) -> usize {
        self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty()
    }
}

/// Destination views whose identity is absent from the source listing.
pub(crate) async fn candidates(
    source: &dyn ViewReader,
    destination: &dyn ViewRepository,
) -> Result<Vec<View>> {
    let keep: BTreeMap<ViewId, View> = source
        .list()
        .await?
        .into_iter()
        .map(|v| (v.id(), v))
        .collect();
    Ok(destination
        .list()
        .await?
        .into_iter()
        .filter(|v| !matches(keep.get(&v.id()), Some(v)))
        .collect())
}

pub(crate) async fn delete_old(
    options: &SyncOptions,
    source: &dyn ViewReader,
    destination: &dyn ViewRepository,
) -> Result<PruneReport> {
    let stale = candidates(source, destination).await?;
    let mut report = PruneReport {
        deleted: Vec::new(),
        dry_run: options.dry_run,
    };

    if options.dry_run {
        for view in &stale {
            info!("Would delete {}", view);
        }
        report.deleted = stale.iter().map(View::id).collect();
        return Ok(report);
    }

    let mut errors = ReconciliationError::new();
    for view in &stale {
        if options.cancel.is_cancelled() {
            warn!("Cancelled with {} deletion(s) done", report.len());
            return Err(BqvError::Cancelled { partial: errors });
        }

        match destination.delete(view).await {
            Ok(()) => {
                info!("Deleted {}", view);
                report.deleted.push(view.id());
            }
            Err(e) if e.is_not_found() => {
                debug!("{} already gone", view);
                report.deleted.push(view.id());
            }
            Err(e) => {
                warn!("{} [{}]: {}", view, SyncStep::Delete, e);
                errors.push(ItemFailure::new(
                    view.dataset(),
                    view.name(),
                    SyncStep::Delete,
                    e.to_string(),
                ));
            }
        }
    }

    errors.into_result()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;

    #[tokio::test]
    async fn test_candidates_by_identity() {
        let source = MemoryRepository::with_views([
            View::new("sales", "revenue", "SELECT 1"),
        ]);
        let destination = MemoryRepository::with_views([
            View::new("sales", "revenue", "SELECT 2"),
            View::new("sales", "orders", "SELECT 3"),
        ]);

        let stale = candidates(&source, &destination).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id(), ViewId::new("sales", "orders"));
    }

    #[tokio::test]
    async fn test_dry_run_keeps_views() {
        let source = MemoryRepository::new();
        let destination = MemoryRepository::with_views([View::new("sales", "orders", "SELECT 3")]);
        let options = SyncOptions::default().with_dry_run(true);

        let report = delete_old(&options, &source, &destination).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.deleted, vec![ViewId::new("sales", "orders")]);
        assert!(destination.contains("sales", "orders"));
    }
}
