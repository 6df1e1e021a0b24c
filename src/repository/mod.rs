//! View repositories: the storage capability the reconciliation engine runs
//! against. A repository lists and fetches views (`ViewReader`) and
//! creates, updates and deletes them (`ViewWriter`).
//!
//! `get` and `update` must report a missing view as `BqvError::NotFound`.
//! The engine branches on it (upsert falls back to create, diff reports
//! an added view), so adapters never fold it into a generic error.

mod bigquery;
mod file;
mod memory;

use async_trait::async_trait;
use crate::error::Result;
use crate::view::View;

pub use bigquery::BigQueryRepository;
pub use file::FileRepository;
pub use memory::{MemoryRepository, RepositoryOp};

#[async_trait]
pub trait ViewReader: Send + Sync {
    /// Every view visible to the repository, in the repository's own order.
    async fn list(&self) -> Result<Vec<View>>;

    async fn get(&self, dataset: &str, name: &str) -> Result<View>;
}

#[async_trait]
pub trait ViewWriter: Send + Sync {
    /// Dataset a logical dataset lands in. Jobs scheduled against this
    /// repository must name the physical dataset.
    fn physical_dataset(&self, dataset: &str) -> String {
        dataset.to_string()
    }

    async fn create(&self, view: &View) -> Result<View>;

    async fn update(&self, view: &View) -> Result<View>;

    async fn delete(&self, view: &View) -> Result<()>;
}

pub trait ViewRepository: ViewReader + ViewWriter {}

impl<T: ViewReader + ViewWriter + ?Sized> ViewRepository for T {}

/// Physical dataset name for a logical one, used to point a run at scratch
/// datasets (`test_sales` instead of `sales`). Views always carry the
/// logical name.
pub(crate) fn prefixed(prefix: Option<&str>, dataset: &str) -> String {
    match prefix {
        Some(p) => format!("{}{}", p, dataset),
        None => dataset.to_string(),
    }
}

/// Inverse of `prefixed`. `None` when the physical dataset lies outside the prefix.
pub(crate) fn unprefixed<'a>(prefix: Option<&str>, dataset: &'a str) -> Option<&'a str> {
    match prefix {
        Some(p) => dataset.strip_prefix(p),
        None => Some(dataset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed() {
        assert_eq!(prefixed(None, "sales"), "sales");
        assert_eq!(prefixed(Some("test_"), "sales"), "test_sales");
    }

    #[test]
    fn test_unprefixed() {
        assert_eq!(unprefixed(None, "sales"), Some("sales"));
        assert_eq!(unprefixed(Some("test_"), "test_sales"), Some("sales"));
        assert_eq!(unprefixed(Some("test_"), "sales"), None);
    }
}
