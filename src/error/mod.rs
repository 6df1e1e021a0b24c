mod bq_error;
mod parser;
mod reconcile;

use thiserror::Error;

pub use bq_error::{BigQueryError, QueryErrorLocation};
pub use parser::{parse_bq_error, ErrorContext};
pub use reconcile::{ItemFailure, ReconciliationError, SyncStep};

/// Coarse classification used by callers that branch on the failure mode
/// instead of the concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Repository,
    Reconciliation,
    Config,
    Cancelled,
}

#[derive(Error, Debug)]
pub enum BqvError {
    #[error("View not found: {dataset}.{name}")]
    NotFound { dataset: String, name: String },

    #[error("BigQuery error: {0}")]
    BigQuery(#[from] BigQueryError),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("{dataset}.{name}: {source}")]
    Item {
        dataset: String,
        name: String,
        #[source]
        source: Box<BqvError>,
    },

    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),

    #[error("Config error: {0}")]
    Config(String),

    /// The run stopped early. `partial` holds the per-item failures
    /// recorded before the token fired.
    #[error("Operation cancelled{}", cancelled_detail(.partial))]
    Cancelled { partial: ReconciliationError },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BqvError {
    pub fn not_found(dataset: impl Into<String>, name: impl Into<String>) -> Self {
        BqvError::NotFound {
            dataset: dataset.into(),
            name: name.into(),
        }
    }

    pub fn cancelled() -> Self {
        BqvError::Cancelled {
            partial: ReconciliationError::new(),
        }
    }

    /// Attach the identity of the view being processed when the error surfaced.
    pub fn for_item(self, dataset: impl Into<String>, name: impl Into<String>) -> Self {
        BqvError::Item {
            dataset: dataset.into(),
            name: name.into(),
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BqvError::NotFound { .. } => ErrorKind::NotFound,
            BqvError::Item { source, .. } => source.kind(),
            BqvError::Reconciliation(_) => ErrorKind::Reconciliation,
            BqvError::Config(_) => ErrorKind::Config,
            BqvError::Cancelled { .. } => ErrorKind::Cancelled,
            BqvError::BigQuery(_)
            | BqvError::Repository(_)
            | BqvError::Scheduler(_)
            | BqvError::Io(_)
            | BqvError::Yaml(_)
            | BqvError::Json(_) => ErrorKind::Repository,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

fn cancelled_detail(partial: &ReconciliationError) -> String {
    if partial.is_empty() {
        String::new()
    } else {
        format!(" after {}", partial)
    }
}

pub type Result<T> = std::result::Result<T, BqvError>;
