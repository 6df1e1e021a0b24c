mod setting;
mod snapshot;

use std::fmt;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

pub use setting::{ViewSetting, MaterializedViewSetting, DEFAULT_SCHEDULING_TIME};
pub use snapshot::{CACHED_PREFIX, cached_name, schedule_display_name, snapshot_query, snapshot_view, is_cached_name};

/// Identity of a view within one repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewId {
    pub dataset: String,
    pub name: String,
}

impl ViewId {
    pub fn new(dataset: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    #[default]
    View,
    /// A table materialized from another view on a schedule. Its `query`
    /// is the materialization statement, not a view body.
    SnapshotTable,
}

impl ViewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::View => "view",
            ViewKind::SnapshotTable => "snapshot_table",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    dataset: String,
    name: String,
    query: String,
    setting: ViewSetting,
    kind: ViewKind,
}

impl View {
    pub fn new(dataset: impl Into<String>, name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            name: name.into(),
            query: query.into(),
            setting: ViewSetting::default(),
            kind: ViewKind::View,
        }
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn setting(&self) -> &ViewSetting {
        &self.setting
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn id(&self) -> ViewId {
        ViewId::new(&self.dataset, &self.name)
    }

    pub fn is_snapshot(&self) -> bool {
        self.kind == ViewKind::SnapshotTable
    }

    pub fn with_query(self, query: impl Into<String>) -> Self {
        Self { query: query.into(), ..self }
    }

    pub fn with_setting(self, setting: ViewSetting) -> Self {
        Self { setting, ..self }
    }

    pub fn with_kind(self, kind: ViewKind) -> Self {
        Self { kind, ..self }
    }

    pub fn with_dataset(self, dataset: impl Into<String>) -> Self {
        Self { dataset: dataset.into(), ..self }
    }

    pub fn wants_cache(&self) -> bool {
        self.kind == ViewKind::View && self.setting.view_table
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.name)
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct ViewTableRow {
    #[tabled(rename = "Dataset")]
    pub dataset: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Cached")]
    pub cached: String,
    #[tabled(rename = "Description")]
    pub description: String,
}

impl From<&View> for ViewTableRow {
    fn from(view: &View) -> Self {
        let cached = if view.wants_cache() {
            view.setting.schedule().to_string()
        } else {
            "-".to_string()
        };

        Self {
            dataset: view.dataset.clone(),
            name: view.name.clone(),
            kind: view.kind.as_str().to_string(),
            cached,
            description: view.setting.description.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_row() {
        let view = View::new("sales", "revenue", "SELECT 1")
            .with_setting(ViewSetting::new().with_view_table(None).with_description("daily"));
        let row = ViewTableRow::from(&view);
        assert_eq!(row.kind, "view");
        assert_eq!(row.cached, DEFAULT_SCHEDULING_TIME);
        assert_eq!(row.description, "daily");
    }

    #[test]
    fn test_view_identity() {
        let view = View::new("sales", "revenue", "SELECT 1");
        assert_eq!(view.id(), ViewId::new("sales", "revenue"));
        assert_eq!(view.to_string(), "sales.revenue");
        assert_eq!(view.kind(), ViewKind::View);
    }

    #[test]
    fn test_with_query_builds_new_value() {
        let original = View::new("sales", "revenue", "SELECT 1");
        let changed = original.clone().with_query("SELECT 2");
        assert_eq!(original.query(), "SELECT 1");
        assert_eq!(changed.query(), "SELECT 2");
        assert_eq!(original.id(), changed.id());
    }

    #[test]
    fn test_wants_cache_only_for_plain_views() {
        let setting = ViewSetting::new().with_view_table(None);
        let view = View::new("sales", "revenue", "SELECT 1").with_setting(setting.clone());
        assert!(view.wants_cache());

        let snapshot = view.with_kind(ViewKind::SnapshotTable);
        assert!(!snapshot.wants_cache());
    }
}
