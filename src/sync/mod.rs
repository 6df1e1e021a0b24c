//! Reconciliation engine. Compares two view repositories, copies one onto
//! the other (keeping cached snapshot tables and their scheduling entries
//! in step with each view's `view_table` flag) and prunes views the source
//! no longer has.

mod cache;
mod compare;
mod copy;
mod diff;
mod prune;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use crate::error::Result;
use crate::repository::{ViewReader, ViewRepository, ViewWriter};
use crate::schedule::ScheduleDirectory;
use crate::view::View;

pub use cache::CacheAction;
pub use compare::{equal, equal_with, matches, ComparePolicy};
pub use copy::{CopiedView, CopyReport, Upserted};
pub use diff::{diff_pair, DiffEntry, DiffKind, DiffReport};
pub use prune::PruneReport;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Views reconciled at once. Each view's own steps stay sequential.
    pub concurrency: usize,
    pub compare: ComparePolicy,
    /// Report prune candidates without deleting them.
    pub dry_run: bool,
    pub cancel: CancellationToken,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            compare: ComparePolicy::default(),
            dry_run: false,
            cancel: CancellationToken::new(),
        }
    }
}

impl SyncOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_compare(mut self, compare: ComparePolicy) -> Self {
        self.compare = compare;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

pub struct ViewService {
    scheduler: Arc<dyn ScheduleDirectory>,
    options: SyncOptions,
}

impl ViewService {
    pub fn new(scheduler: Arc<dyn ScheduleDirectory>) -> Self {
        Self {
            scheduler,
            options: SyncOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Source views missing from or differing in the destination, in source
    /// listing order. Destination-only views are not reported.
    pub async fn diff(
        &self,
        source: &dyn ViewReader,
        destination: &dyn ViewReader,
    ) -> Result<Vec<DiffEntry>> {
        diff::diff(&self.options, source, destination).await
    }

    /// Upsert every source view into the destination and reconcile its
    /// cached snapshot. Per-view failures do not stop the run; they come
    /// back together as `BqvError::Reconciliation`.
    pub async fn copy(
        &self,
        source: &dyn ViewReader,
        destination: &dyn ViewWriter,
    ) -> Result<CopyReport> {
        copy::copy(&self.options, self.scheduler.as_ref(), source, destination).await
    }

    /// Upsert every source view into the destination, leaving cached
    /// snapshots and scheduling entries alone. Used to pull warehouse views
    /// back into files without losing the files' cache flags.
    pub async fn dump(
        &self,
        source: &dyn ViewReader,
        destination: &dyn ViewRepository,
    ) -> Result<CopyReport> {
        copy::dump(&self.options, source, destination).await
    }

    /// Delete destination views whose identity the source does not list.
    pub async fn delete_old(
        &self,
        source: &dyn ViewReader,
        destination: &dyn ViewRepository,
    ) -> Result<PruneReport> {
        prune::delete_old(&self.options, source, destination).await
    }

    pub async fn list(&self, repository: &dyn ViewReader) -> Result<Vec<View>> {
        repository.list().await
    }
}
