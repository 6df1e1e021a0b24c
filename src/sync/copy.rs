use std::collections::BTreeMap;
use std::future::Future;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};
use crate::error::{BqvError, ItemFailure, ReconciliationError, Result, SyncStep};
use crate::repository::{ViewReader, ViewRepository, ViewWriter};
use crate::schedule::{JobHandle, ScheduleDirectory};
use crate::view::{schedule_display_name, View, ViewId};
use super::cache::{self, CacheAction};
use super::SyncOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Upserted {
    Created,
    Updated,
}

/// Update, falling back to create when the destination has no such view.
pub(crate) async fn upsert<W>(view: &View, destination: &W) -> Result<Upserted>
where
    W: ViewWriter + ?Sized,
{
    match destination.update(view).await {
        Ok(_) => Ok(Upserted::Updated),
        Err(e) if e.is_not_found() => {
            debug!("{} not in destination, creating", view);
            destination.create(view).await?;
            Ok(Upserted::Created)
        }
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopiedView {
    pub id: ViewId,
    pub upserted: Upserted,
    pub cache: CacheAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CopyReport {
    pub views: Vec<CopiedView>,
}

impl CopyReport {
    pub fn created(&self) -> usize {
        self.count(|v| v.upserted == Upserted::Created)
    }

    pub fn updated(&self) -> usize {
        self.count(|v| v.upserted == Upserted::Updated)
    }

    pub fn cached(&self) -> usize {
        self.count(|v| v.cache == CacheAction::Enabled)
    }

    pub fn uncached(&self) -> usize {
        self.count(|v| v.cache == CacheAction::Disabled)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    fn count(&self, pred: impl Fn(&CopiedView) -> bool) -> usize {
        self.views.iter().filter(|v| pred(v)).count()
    }
}

enum Outcome {
    Copied(CopiedView),
    Failed(ItemFailure),
    Skipped,
}

fn upsert_failure(view: &View, e: BqvError) -> Outcome {
    warn!("{} [{}]: {}", view, SyncStep::Upsert, e);
    Outcome::Failed(ItemFailure::new(
        view.dataset(),
        view.name(),
        SyncStep::Upsert,
        e.to_string(),
    ))
}

fn log_upserted(view: &View, upserted: Upserted) {
    info!(
        "{} {}",
        match upserted {
            Upserted::Created => "Created",
            Upserted::Updated => "Updated",
        },
        view
    );
}

async fn copy_one(
    options: &SyncOptions,
    view: &View,
    destination: &dyn ViewWriter,
    scheduler: &dyn ScheduleDirectory,
    scheduled: Option<&JobHandle>,
) -> Outcome {
    if options.cancel.is_cancelled() {
        debug!("Skipping {}: cancelled", view);
        return Outcome::Skipped;
    }

    let upserted = match upsert(view, destination).await {
        Ok(u) => u,
        Err(e) => return upsert_failure(view, e),
    };
    log_upserted(view, upserted);

    if view.is_snapshot() {
        return Outcome::Copied(CopiedView {
            id: view.id(),
            upserted,
            cache: CacheAction::Unchanged,
        });
    }

    match cache::reconcile(view, destination, scheduler, scheduled).await {
        Ok(cache) => Outcome::Copied(CopiedView {
            id: view.id(),
            upserted,
            cache,
        }),
        Err(failure) => Outcome::Failed(failure),
    }
}

/// Run `step` over `views` on the bounded pool and fold the outcomes back
/// into source order.
async fn run_batch<'a, F, Fut>(options: &SyncOptions, views: &'a [View], step: F) -> Result<CopyReport>
where
    F: Fn(&'a View) -> Fut,
    Fut: Future<Output = Outcome>,
{
    let mut outcomes: Vec<(usize, Outcome)> = stream::iter(views.iter().enumerate())
        .map(|(index, view)| {
            let outcome = step(view);
            async move { (index, outcome.await) }
        })
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;
    outcomes.sort_by_key(|(index, _)| *index);

    let mut report = CopyReport::default();
    let mut errors = ReconciliationError::new();
    let mut skipped = 0;
    for (_, outcome) in outcomes {
        match outcome {
            Outcome::Copied(copied) => report.views.push(copied),
            Outcome::Failed(failure) => errors.push(failure),
            Outcome::Skipped => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Cancelled with {} view(s) left untouched", skipped);
        return Err(BqvError::Cancelled { partial: errors });
    }

    errors.into_result()?;
    Ok(report)
}

pub(crate) async fn copy(
    options: &SyncOptions,
    scheduler: &dyn ScheduleDirectory,
    source: &dyn ViewReader,
    destination: &dyn ViewWriter,
) -> Result<CopyReport> {
    let views = source.list().await?;
    let schedules: BTreeMap<String, JobHandle> = scheduler.list().await?;
    debug!("Copying {} view(s), {} scheduled", views.len(), schedules.len());

    run_batch(options, &views, |view| {
        let key = schedule_display_name(&destination.physical_dataset(view.dataset()), view.name());
        let scheduled = schedules.get(&key);
        copy_one(options, view, destination, scheduler, scheduled)
    })
    .await
}

async fn dump_one(options: &SyncOptions, view: &View, destination: &dyn ViewRepository) -> Outcome {
    if options.cancel.is_cancelled() {
        debug!("Skipping {}: cancelled", view);
        return Outcome::Skipped;
    }

    let merged = match destination.get(view.dataset(), view.name()).await {
        Ok(local) => view
            .clone()
            .with_setting(view.setting().clone().with_cache_from(local.setting())),
        Err(e) if e.is_not_found() => view.clone(),
        Err(e) => return upsert_failure(view, e),
    };

    match upsert(&merged, destination).await {
        Ok(upserted) => {
            log_upserted(view, upserted);
            Outcome::Copied(CopiedView {
                id: view.id(),
                upserted,
                cache: CacheAction::Unchanged,
            })
        }
        Err(e) => upsert_failure(view, e),
    }
}

/// Upsert every source view into the destination without touching cached
/// snapshots. Cache flags already stored in the destination survive when
/// the source carries none.
pub(crate) async fn dump(
    options: &SyncOptions,
    source: &dyn ViewReader,
    destination: &dyn ViewRepository,
) -> Result<CopyReport> {
    let views = source.list().await?;
    debug!("Dumping {} view(s)", views.len());

    run_batch(options, &views, |view| dump_one(options, view, destination)).await
}
