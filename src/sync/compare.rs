use serde::{Deserialize, Serialize};
use crate::view::View;

/// Which parts of a view count towards equality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparePolicy {
    /// Only the view body.
    #[default]
    QueryOnly,
    /// View body plus description and labels.
    QueryAndMetadata,
}

impl ComparePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparePolicy::QueryOnly => "query_only",
            ComparePolicy::QueryAndMetadata => "query_and_metadata",
        }
    }
}

/// Both absent, or both present with the same `(dataset, name)`.
pub fn matches(a: Option<&View>, b: Option<&View>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.dataset() == b.dataset() && a.name() == b.name(),
        _ => false,
    }
}

/// Matching and byte-identical query.
pub fn equal(a: Option<&View>, b: Option<&View>) -> bool {
    equal_with(ComparePolicy::QueryOnly, a, b)
}

pub fn equal_with(policy: ComparePolicy, a: Option<&View>, b: Option<&View>) -> bool {
    if !matches(a, b) {
        return false;
    }
    match (a, b) {
        (Some(a), Some(b)) => {
            a.query() == b.query()
                && (policy == ComparePolicy::QueryOnly || a.setting().same_metadata(b.setting()))
        }
        _ => true,
    }
}
