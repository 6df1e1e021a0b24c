use std::fmt;

#[derive(Debug, Clone)]
pub enum BigQueryError {
    AuthenticationFailed {
        reason: String,
    },

    InvalidQuery {
        message: String,
        sql_preview: String,
        location: Option<QueryErrorLocation>,
    },

    TableNotFound {
        project: String,
        dataset: String,
        table: String,
    },

    DatasetNotFound {
        project: String,
        dataset: String,
    },

    AccessDenied {
        resource: String,
        required_permission: Option<String>,
    },

    QuotaExceeded {
        message: String,
    },

    AlreadyExists {
        message: String,
    },

    ConnectionFailed {
        reason: String,
    },

    Unknown {
        code: Option<String>,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryErrorLocation {
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl BigQueryError {
    /// True for a missing table or dataset. Repository adapters turn these
    /// into `BqvError::NotFound`, which drives upsert and diff.
    pub fn is_not_found(&self) -> bool {
        match self {
            BigQueryError::TableNotFound { .. } | BigQueryError::DatasetNotFound { .. } => true,
            BigQueryError::Unknown { code, .. } => code.as_deref() == Some("notFound"),
            _ => false,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            BigQueryError::AuthenticationFailed { .. } => "AUTH_FAILED",
            BigQueryError::InvalidQuery { .. } => "INVALID_QUERY",
            BigQueryError::TableNotFound { .. } => "TABLE_NOT_FOUND",
            BigQueryError::DatasetNotFound { .. } => "DATASET_NOT_FOUND",
            BigQueryError::AccessDenied { .. } => "ACCESS_DENIED",
            BigQueryError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            BigQueryError::AlreadyExists { .. } => "ALREADY_EXISTS",
            BigQueryError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            BigQueryError::Unknown { .. } => "UNKNOWN",
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            BigQueryError::AuthenticationFailed { .. } => {
                "Try:\n  \
                 • Run: gcloud auth application-default login\n  \
                 • Or set GOOGLE_APPLICATION_CREDENTIALS to a service account key file".to_string()
            }

            BigQueryError::InvalidQuery { .. } => {
                "Check the view SQL for syntax errors and unknown table or column names.\n  \
                 • Views are created with standard SQL (useLegacySql = false)".to_string()
            }

            BigQueryError::TableNotFound { project, dataset, table } => {
                format!(
                    "Verify the view exists:\n  \
                     • Run: bq show {project}:{dataset}.{table}\n  \
                     • Run `bqv view diff` to see which views are missing"
                )
            }

            BigQueryError::DatasetNotFound { project, dataset } => {
                format!(
                    "Verify the dataset exists:\n  \
                     • Run: bq show {project}:{dataset}\n  \
                     • Check the configured dataset_prefix"
                )
            }

            BigQueryError::AccessDenied { resource, required_permission } => {
                let perm = required_permission.as_deref().unwrap_or("bigquery.tables.update");
                format!(
                    "Request access to {resource}:\n  \
                     • Required permission: {perm}\n  \
                     • Views need bigquery.tables.create and bigquery.tables.update on the dataset"
                )
            }

            BigQueryError::QuotaExceeded { .. } => {
                "Quota exceeded:\n  \
                 • Wait and retry later\n  \
                 • Lower `concurrency` in the configuration".to_string()
            }

            BigQueryError::AlreadyExists { .. } => {
                "The resource already exists:\n  \
                 • Run `bqv view diff` and apply again; existing views are updated in place".to_string()
            }

            BigQueryError::ConnectionFailed { .. } => {
                "Connection failed:\n  \
                 • Check your internet connection\n  \
                 • Verify the BigQuery API is enabled for your project".to_string()
            }

            BigQueryError::Unknown { .. } => {
                "An unexpected error occurred:\n  \
                 • Check the error message for details\n  \
                 • Check BigQuery status: https://status.cloud.google.com/".to_string()
            }
        }
    }
}

impl fmt::Display for BigQueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BigQueryError::AuthenticationFailed { reason } => {
                write!(f, "Authentication failed: {reason}")
            }

            BigQueryError::InvalidQuery { message, sql_preview, location } => {
                write!(f, "Invalid SQL: {message}")?;
                if let Some(QueryErrorLocation { line: Some(line), column }) = location {
                    write!(f, " (line {line}")?;
                    if let Some(col) = column {
                        write!(f, ", column {col}")?;
                    }
                    write!(f, ")")?;
                }
                if !sql_preview.is_empty() {
                    write!(f, "\n\nSQL preview:\n  {sql_preview}")?;
                }
                Ok(())
            }

            BigQueryError::TableNotFound { project, dataset, table } => {
                write!(f, "Table not found: {project}.{dataset}.{table}")
            }

            BigQueryError::DatasetNotFound { project, dataset } => {
                write!(f, "Dataset not found: {project}.{dataset}")
            }

            BigQueryError::AccessDenied { resource, required_permission } => {
                write!(f, "Access denied to {resource}")?;
                if let Some(perm) = required_permission {
                    write!(f, " (requires {perm})")?;
                }
                Ok(())
            }

            BigQueryError::QuotaExceeded { message } => write!(f, "Quota exceeded: {message}"),

            BigQueryError::AlreadyExists { message } => write!(f, "Already exists: {message}"),

            BigQueryError::ConnectionFailed { reason } => write!(f, "Connection failed: {reason}"),

            BigQueryError::Unknown { code, message } => match code {
                Some(c) => write!(f, "BigQuery error [{c}]: {message}"),
                None => write!(f, "BigQuery error: {message}"),
            },
        }
    }
}

impl std::error::Error for BigQueryError {}
