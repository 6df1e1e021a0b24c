use serde::Serialize;
use tracing::{debug, info, warn};
use crate::error::{ItemFailure, SyncStep};
use crate::repository::ViewWriter;
use crate::schedule::{JobHandle, ScheduleDirectory};
use crate::view::{schedule_display_name, snapshot_query, snapshot_view, View};
use super::copy::upsert;

/// What cache reconciliation did for one view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheAction {
    /// Snapshot table and scheduling entry created.
    Enabled,
    /// Scheduling entry and snapshot table removed.
    Disabled,
    Unchanged,
}

impl CacheAction {
    /// Transition for a view given its flag and whether the directory
    /// already holds an entry for it.
    pub fn plan(view_table: bool, scheduled: bool) -> Self {
        match (view_table, scheduled) {
            (true, false) => CacheAction::Enabled,
            (false, true) => CacheAction::Disabled,
            _ => CacheAction::Unchanged,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheAction::Enabled => "enabled",
            CacheAction::Disabled => "disabled",
            CacheAction::Unchanged => "unchanged",
        }
    }
}

/// Bring the snapshot table and scheduling entry of `view` in line with its
/// `view_table` flag. `scheduled` is the entry found in the directory
/// snapshot taken at the start of the run.
pub(crate) async fn reconcile(
    view: &View,
    destination: &dyn ViewWriter,
    scheduler: &dyn ScheduleDirectory,
    scheduled: Option<&JobHandle>,
) -> std::result::Result<CacheAction, ItemFailure> {
    let action = CacheAction::plan(view.setting().view_table, scheduled.is_some());
    debug!("Cache for {}: {}", view, action.as_str());

    match (action, scheduled) {
        (CacheAction::Enabled, _) => enable(view, destination, scheduler).await?,
        (CacheAction::Disabled, Some(handle)) => disable(view, destination, scheduler, handle).await?,
        _ => {}
    }

    Ok(action)
}

async fn enable(
    view: &View,
    destination: &dyn ViewWriter,
    scheduler: &dyn ScheduleDirectory,
) -> std::result::Result<(), ItemFailure> {
    let snapshot = snapshot_view(view);
    let failure = |step, message: String| {
        warn!("{} [{}]: {}", view, step, message);
        ItemFailure::new(view.dataset(), view.name(), step, message)
    };

    upsert(&snapshot, destination)
        .await
        .map_err(|e| failure(SyncStep::SnapshotCreate, e.to_string()))?;

    // the job runs outside the repository, so it names physical datasets
    let target = destination.physical_dataset(view.dataset());
    let display_name = schedule_display_name(&target, view.name());
    let schedule = view.setting().schedule();
    scheduler
        .create(&display_name, &target, &snapshot_query(&target, view.name()), schedule)
        .await
        .map_err(|e| failure(SyncStep::SchedulingCreate, e.to_string()))?;

    info!("Cached {} as {} ({})", view, snapshot, schedule);
    Ok(())
}

async fn disable(
    view: &View,
    destination: &dyn ViewWriter,
    scheduler: &dyn ScheduleDirectory,
    handle: &JobHandle,
) -> std::result::Result<(), ItemFailure> {
    let snapshot = snapshot_view(view);
    let failure = |step, message: String| {
        warn!("{} [{}]: {}", view, step, message);
        ItemFailure::new(view.dataset(), view.name(), step, message)
    };

    // the table stays while a job may still refresh it
    scheduler
        .delete(handle)
        .await
        .map_err(|e| failure(SyncStep::SchedulingDelete, e.to_string()))?;

    match destination.delete(&snapshot).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => debug!("{} already gone", snapshot),
        Err(e) => return Err(failure(SyncStep::SnapshotDelete, e.to_string())),
    }

    info!("Uncached {}", view);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_transitions() {
        assert_eq!(CacheAction::plan(true, false), CacheAction::Enabled);
        assert_eq!(CacheAction::plan(true, true), CacheAction::Unchanged);
        assert_eq!(CacheAction::plan(false, true), CacheAction::Disabled);
        assert_eq!(CacheAction::plan(false, false), CacheAction::Unchanged);
    }
}
