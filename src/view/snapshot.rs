use super::{View, ViewKind, ViewSetting};

pub const CACHED_PREFIX: &str = "cached_";

pub fn cached_name(name: &str) -> String {
    format!("{}{}", CACHED_PREFIX, name)
}

pub fn is_cached_name(name: &str) -> bool {
    name.starts_with(CACHED_PREFIX)
}

/// Key of the scheduling entry that refreshes the snapshot of view `name`
/// living in the physical `dataset`.
pub fn schedule_display_name(dataset: &str, name: &str) -> String {
    format!("{}.{}", dataset, cached_name(name))
}

pub fn snapshot_query(dataset: &str, name: &str) -> String {
    format!(
        "CREATE OR REPLACE TABLE {dataset}.{cached} AS SELECT * FROM {dataset}.{name}",
        dataset = dataset,
        cached = cached_name(name),
        name = name,
    )
}

/// The cached snapshot table derived from `view`. Same dataset, `cached_`
/// name, materialization statement as its body.
pub fn snapshot_view(view: &View) -> View {
    View::new(
        view.dataset(),
        cached_name(view.name()),
        snapshot_query(view.dataset(), view.name()),
    )
    .with_setting(ViewSetting::default())
    .with_kind(ViewKind::SnapshotTable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_view_is_deterministic() {
        let view = View::new("sales", "revenue", "SELECT 1")
            .with_setting(ViewSetting::new().with_view_table(Some("every 15 minutes")));
        let snapshot = snapshot_view(&view);

        assert_eq!(snapshot.dataset(), "sales");
        assert_eq!(snapshot.name(), "cached_revenue");
        assert_eq!(
            snapshot.query(),
            "CREATE OR REPLACE TABLE sales.cached_revenue AS SELECT * FROM sales.revenue"
        );
        assert!(snapshot.is_snapshot());
        assert!(!snapshot.setting().view_table);
        assert_eq!(snapshot, snapshot_view(&view));
    }

    #[test]
    fn test_schedule_display_name() {
        assert_eq!(schedule_display_name("sales", "revenue"), "sales.cached_revenue");
        assert_eq!(schedule_display_name("test_sales", "revenue"), "test_sales.cached_revenue");
    }

    #[test]
    fn test_is_cached_name() {
        assert!(is_cached_name("cached_revenue"));
        assert!(!is_cached_name("revenue"));
    }
}
