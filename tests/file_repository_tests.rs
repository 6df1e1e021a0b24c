use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use bqv::view::{snapshot_query, ViewKind};
use bqv::schedule::ScheduleDirectory;
use bqv::{
    FileRepository, ManifestScheduleDirectory, MemoryRepository, MemoryScheduleDirectory, View,
    ViewId, ViewReader, ViewService, ViewSetting, ViewWriter,
};

fn write(dir: &TempDir, rel: &str, content: &str) {
    let path = dir.path().join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[tokio::test]
async fn test_list_reads_tree() {
    let tmp = TempDir::new().unwrap();
    write(&tmp, "sales/revenue.sql", "SELECT 1");
    write(&tmp, "sales/revenue.yml", "metadata:\n  description: Daily revenue\n  labels:\n    team: finance\n");
    write(&tmp, "sales/orders.sql", "SELECT 2");
    write(&tmp, "finance/ledger.sql", "SELECT 3");
    write(&tmp, "README.md", "ignored");
    write(&tmp, "sales/notes.txt", "ignored");
    write(&tmp, ".schedules.yaml", "jobs: []\n");

    let repo = FileRepository::new(tmp.path());
    let views = repo.list().await.unwrap();
    let ids: Vec<ViewId> = views.iter().map(View::id).collect();

    assert_eq!(
        ids,
        vec![
            ViewId::new("finance", "ledger"),
            ViewId::new("sales", "orders"),
            ViewId::new("sales", "revenue"),
        ]
    );

    let revenue = &views[2];
    assert_eq!(revenue.query(), "SELECT 1");
    assert_eq!(revenue.setting().description.as_deref(), Some("Daily revenue"));
    assert_eq!(revenue.setting().labels.get("team").map(String::as_str), Some("finance"));
    assert!(views[1].setting().is_empty());
}

#[tokio::test]
async fn test_view_table_setting() {
    let tmp = TempDir::new().unwrap();
    write(&tmp, "sales/revenue.sql", "SELECT 1");
    write(&tmp, "sales/revenue.yml", "metadata:\n  view_table: true\n  scheduling_time: every 15 minutes\n");

    let view = FileRepository::new(tmp.path()).get("sales", "revenue").await.unwrap();
    assert!(view.wants_cache());
    assert_eq!(view.setting().schedule(), "every 15 minutes");
}

#[tokio::test]
async fn test_get_missing_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let repo = FileRepository::new(tmp.path());
    assert!(repo.get("sales", "revenue").await.unwrap_err().is_not_found());

    let view = View::new("sales", "revenue", "SELECT 1");
    assert!(repo.update(&view).await.unwrap_err().is_not_found());
    assert!(repo.delete(&view).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_create_update_delete() {
    let tmp = TempDir::new().unwrap();
    let repo = FileRepository::new(tmp.path());
    let view = View::new("sales", "revenue", "SELECT 1")
        .with_setting(ViewSetting::new().with_description("Daily revenue"));

    repo.create(&view).await.unwrap();
    assert!(tmp.path().join("sales/revenue.sql").is_file());
    assert_eq!(repo.get("sales", "revenue").await.unwrap(), view);

    let updated = view.clone().with_query("SELECT 2");
    assert_eq!(repo.update(&updated).await.unwrap(), updated);
    assert_eq!(fs::read_to_string(tmp.path().join("sales/revenue.sql")).unwrap(), "SELECT 2");

    repo.delete(&updated).await.unwrap();
    assert!(!tmp.path().join("sales/revenue.sql").exists());
    assert!(!tmp.path().join("sales/revenue.yml").exists());
}

#[tokio::test]
async fn test_snapshot_kind_round_trips() {
    let tmp = TempDir::new().unwrap();
    let repo = FileRepository::new(tmp.path());
    let snapshot = View::new("sales", "cached_revenue", snapshot_query("sales", "revenue"))
        .with_kind(ViewKind::SnapshotTable);

    repo.create(&snapshot).await.unwrap();
    let read = repo.get("sales", "cached_revenue").await.unwrap();
    assert_eq!(read.kind(), ViewKind::SnapshotTable);
    assert_eq!(read, snapshot);
}

#[tokio::test]
async fn test_dataset_prefix_scopes_listing() {
    let tmp = TempDir::new().unwrap();
    write(&tmp, "test_sales/revenue.sql", "SELECT 1");
    write(&tmp, "sales/orders.sql", "SELECT 2");

    let repo = FileRepository::new(tmp.path()).with_dataset_prefix(Some("test_".into()));
    let views = repo.list().await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].id(), ViewId::new("sales", "revenue"));
}

#[tokio::test]
async fn test_invalid_yaml_is_reported() {
    let tmp = TempDir::new().unwrap();
    write(&tmp, "sales/revenue.sql", "SELECT 1");
    write(&tmp, "sales/revenue.yml", "metadata: [unclosed");

    let err = FileRepository::new(tmp.path()).list().await.unwrap_err();
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn test_copy_file_to_file_then_diff_is_empty() {
    let src = TempDir::new().unwrap();
    write(&src, "sales/revenue.sql", "SELECT\n  amount\nFROM orders\n");
    write(&src, "sales/revenue.yml", "metadata:\n  description: Revenue\n  view_table: true\n");
    write(&src, "finance/ledger.sql", "SELECT 1");
    let dst = TempDir::new().unwrap();

    let source = FileRepository::new(src.path());
    let destination = FileRepository::new(dst.path());
    let scheduler = Arc::new(ManifestScheduleDirectory::new(dst.path().join(".schedules.yaml")));
    let service = ViewService::new(scheduler.clone());

    let report = service.copy(&source, &destination).await.unwrap();
    assert_eq!(report.created(), 2);
    assert_eq!(report.cached(), 1);
    assert!(service.diff(&source, &destination).await.unwrap().is_empty());

    let jobs = scheduler.jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].display_name, "sales.cached_revenue");
    assert_eq!(jobs[0].schedule, "every 24 hours");

    let snapshot = destination.get("sales", "cached_revenue").await.unwrap();
    assert_eq!(snapshot.kind(), ViewKind::SnapshotTable);
}

#[tokio::test]
async fn test_dump_and_prune_into_files() {
    let remote = MemoryRepository::with_views([View::new("sales", "revenue", "SELECT 1")]);
    let dst = TempDir::new().unwrap();
    write(&dst, "sales/legacy.sql", "SELECT 0");
    let files = FileRepository::new(dst.path());
    let service = ViewService::new(Arc::new(MemoryScheduleDirectory::new()));

    service.dump(&remote, &files).await.unwrap();
    let pruned = service.delete_old(&remote, &files).await.unwrap();

    assert_eq!(pruned.deleted, vec![ViewId::new("sales", "legacy")]);
    let ids: Vec<ViewId> = files.list().await.unwrap().iter().map(View::id).collect();
    assert_eq!(ids, vec![ViewId::new("sales", "revenue")]);
}

#[tokio::test]
async fn test_prefixed_destination_schedules_prefixed_job() {
    let src = TempDir::new().unwrap();
    write(&src, "sales/revenue.sql", "SELECT 1");
    write(&src, "sales/revenue.yml", "metadata:\n  view_table: true\n");
    let dst = TempDir::new().unwrap();

    let source = FileRepository::new(src.path());
    let destination = FileRepository::new(dst.path()).with_dataset_prefix(Some("test_".into()));
    let scheduler = Arc::new(MemoryScheduleDirectory::new());
    // production's own entry must not count as the scratch run's
    scheduler
        .create("sales.cached_revenue", "sales", &snapshot_query("sales", "revenue"), "every 24 hours")
        .await
        .unwrap();

    let report = ViewService::new(scheduler.clone()).copy(&source, &destination).await.unwrap();
    assert_eq!(report.cached(), 1);

    let job = scheduler.job("test_sales.cached_revenue").unwrap();
    assert_eq!(job.dataset, "test_sales");
    assert_eq!(job.query, snapshot_query("test_sales", "revenue"));
    assert!(!job.query.contains(" sales."));
    assert_eq!(scheduler.len(), 2);
    assert!(dst.path().join("test_sales/cached_revenue.sql").is_file());
}

#[tokio::test]
async fn test_dump_then_apply_keeps_cache() {
    let files_dir = TempDir::new().unwrap();
    write(&files_dir, "sales/revenue.sql", "SELECT 1");
    write(&files_dir, "sales/revenue.yml", "metadata:\n  view_table: true\n  scheduling_time: every 15 minutes\n");
    let files = FileRepository::new(files_dir.path());
    let remote = MemoryRepository::new();
    let scheduler = Arc::new(MemoryScheduleDirectory::new());
    let service = ViewService::new(scheduler.clone());

    service.copy(&files, &remote).await.unwrap();
    assert!(scheduler.job("sales.cached_revenue").is_some());

    // warehouse listings carry no cache flags
    let warehouse = MemoryRepository::with_views([View::new("sales", "revenue", "SELECT 2")
        .with_setting(ViewSetting::new().with_description("Daily revenue"))]);
    let dumped = service.dump(&warehouse, &files).await.unwrap();
    assert_eq!(dumped.updated(), 1);

    let local = files.get("sales", "revenue").await.unwrap();
    assert_eq!(local.query(), "SELECT 2");
    assert!(local.setting().view_table);
    assert_eq!(local.setting().schedule(), "every 15 minutes");
    assert_eq!(local.setting().description.as_deref(), Some("Daily revenue"));

    let report = service.copy(&files, &remote).await.unwrap();
    assert_eq!(report.uncached(), 0);
    assert_eq!(scheduler.len(), 1);
    assert!(remote.contains("sales", "cached_revenue"));
}
