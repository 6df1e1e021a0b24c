use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::error::{BqvError, Result};
use super::client::BqClient;

/// Something that runs a SQL statement to completion.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<()>;
}

#[async_trait]
impl QueryExecutor for BqClient {
    async fn execute(&self, sql: &str) -> Result<()> {
        self.execute_query(sql).await
    }
}

/// Something that runs a query and hands back its rows as string cells.
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn rows(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>>;
}

#[async_trait]
impl RowSource for BqClient {
    async fn rows(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        self.query_rows(sql).await
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub succeeded: Vec<PathBuf>,
    pub failures: Vec<RunFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub struct RunFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Expand glob patterns into a sorted, de-duplicated file list. A pattern
/// that matches nothing is an error.
pub fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let matches = glob::glob(pattern)
            .map_err(|e| BqvError::Config(format!("Invalid pattern '{}': {}", pattern, e)))?;
        let before = files.len();
        for entry in matches {
            let path = entry.map_err(|e| BqvError::Io(e.into_error()))?;
            if path.is_file() {
                files.push(path);
            }
        }
        if files.len() == before {
            return Err(BqvError::Config(format!("No SQL files match '{}'", pattern)));
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Runs SQL files against an executor with bounded concurrency. Every file
/// is attempted; failures are collected per file.
pub struct QueryRunner {
    executor: Arc<dyn QueryExecutor>,
    concurrency: usize,
    cancel: CancellationToken,
}

impl QueryRunner {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            executor,
            concurrency: 1,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn run_file(&self, path: &Path) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(BqvError::cancelled());
        }
        let sql = tokio::fs::read_to_string(path).await?;
        debug!("Executing {}", path.display());
        self.executor.execute(&sql).await?;
        info!("Executed {}", path.display());
        Ok(())
    }

    pub async fn run(&self, files: &[PathBuf]) -> Result<RunReport> {
        let results: Vec<(usize, Result<()>)> = stream::iter(files.iter().enumerate())
            .map(|(index, path)| async move { (index, self.run_file(path).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        if self.cancel.is_cancelled() {
            return Err(BqvError::cancelled());
        }

        let mut results = results;
        results.sort_by_key(|(index, _)| *index);

        let mut succeeded = Vec::new();
        let mut failures = Vec::new();
        for (index, result) in results {
            let path = files[index].clone();
            match result {
                Ok(()) => succeeded.push(path),
                Err(e) => {
                    warn!("{}: {}", path.display(), e);
                    failures.push(RunFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(RunReport { succeeded, failures })
    }
}
