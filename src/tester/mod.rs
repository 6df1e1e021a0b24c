//! View tests. An assertion query runs against the view's result loaded
//! into a temporary table, so a failing `ASSERT` (or any query error) fails
//! the test. Assertions come from a separate file or from `[bqv:TEST]`
//! manifests in the view's annotation comment.

mod annotation;

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use crate::error::Result;
use crate::executor::QueryExecutor;

pub use annotation::{extract, manifests_of, parse, Manifest, TEST_MANIFEST};

/// Table the view result is loaded into for the assertion to read.
pub const TESTING_TABLE: &str = "bqv_testing_table";

/// Script that materializes `view_sql` into `TESTING_TABLE` and then runs
/// `assert_sql` against it.
pub fn assertion_script(view_sql: &str, assert_sql: &str) -> String {
    format!(
        "CREATE TEMP TABLE {} AS (\n{}\n);\n\n{}\n",
        TESTING_TABLE,
        view_sql.trim_end().trim_end_matches(';'),
        assert_sql.trim_end()
    )
}

#[derive(Debug)]
pub struct TestOutcome {
    pub name: String,
    pub error: Option<String>,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

pub struct ViewTester {
    executor: Arc<dyn QueryExecutor>,
}

impl ViewTester {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    /// Run one assertion against the view. Query errors are returned.
    pub async fn test(&self, view_sql: &str, assert_sql: &str) -> Result<()> {
        let script = assertion_script(view_sql, assert_sql);
        debug!("Test script:\n{}", script);
        self.executor.execute(&script).await
    }

    /// Run every `[bqv:TEST]` manifest annotated on the view file. Each
    /// manifest is attempted; outcomes come back in annotation order.
    pub async fn test_annotated(&self, path: &Path) -> Result<Vec<TestOutcome>> {
        let sql = tokio::fs::read_to_string(path).await?;
        let manifests = manifests_of(&sql, TEST_MANIFEST)?;
        if manifests.is_empty() {
            info!("{} has no {} annotations", path.display(), TEST_MANIFEST);
        }

        let mut outcomes = Vec::with_capacity(manifests.len());
        for (index, manifest) in manifests.iter().enumerate() {
            let name = format!("{}#{}", path.display(), index + 1);
            let error = match self.test(&sql, &manifest.body).await {
                Ok(()) => None,
                Err(e) => {
                    warn!("{}: {}", name, e);
                    Some(e.to_string())
                }
            };
            outcomes.push(TestOutcome { name, error });
        }
        Ok(outcomes)
    }
}
