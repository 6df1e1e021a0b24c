use gcp_bigquery_client::error::{BQError, ResponseError};
use regex::Regex;
use super::bq_error::{BigQueryError, QueryErrorLocation};

pub fn parse_bq_error(error: BQError, context: ErrorContext) -> BigQueryError {
    match &error {
        BQError::ResponseError { error: resp } => parse_response_error(resp, context),

        BQError::RequestError(req_err) => BigQueryError::ConnectionFailed {
            reason: req_err.to_string(),
        },

        BQError::NoToken => BigQueryError::AuthenticationFailed {
            reason: "No authentication token available".to_string(),
        },

        BQError::AuthError(auth_err) => BigQueryError::AuthenticationFailed {
            reason: format!("{:?}", auth_err),
        },

        BQError::YupAuthError(yup_err) => BigQueryError::AuthenticationFailed {
            reason: yup_err.to_string(),
        },

        BQError::InvalidApplicationDefaultCredentialsAuthenticator(io_err) => {
            BigQueryError::AuthenticationFailed {
                reason: io_err.to_string(),
            }
        }

        _ => BigQueryError::Unknown {
            code: None,
            message: error.to_string(),
        },
    }
}

fn parse_response_error(resp: &ResponseError, context: ErrorContext) -> BigQueryError {
    let status = resp.error.code;
    let message = &resp.error.message;
    let reason = resp.error.errors.first().and_then(|e| e.get("reason").map(|s| s.as_str()));

    match (status, reason) {
        (400, Some("invalidQuery")) | (400, Some("invalid")) => BigQueryError::InvalidQuery {
            message: message.clone(),
            sql_preview: context.sql.unwrap_or_default(),
            location: extract_query_location(message),
        },

        (403, Some("quotaExceeded")) | (403, Some("rateLimitExceeded")) => {
            BigQueryError::QuotaExceeded { message: message.clone() }
        }

        (403, _) => BigQueryError::AccessDenied {
            resource: context.resource.unwrap_or_else(|| "resource".to_string()),
            required_permission: extract_required_permission(message),
        },

        (404, _) => parse_not_found_error(message, &context),

        (409, _) => BigQueryError::AlreadyExists { message: message.clone() },

        _ => BigQueryError::Unknown {
            code: reason.map(|s| s.to_string()).or_else(|| Some(format!("HTTP_{}", status))),
            message: message.clone(),
        },
    }
}

fn parse_not_found_error(message: &str, context: &ErrorContext) -> BigQueryError {
    let msg_lower = message.to_lowercase();

    // "Not found: Table project:dataset.table"
    if let Some(caps) = Regex::new(r"(?i)table\s+([^:\s]+):([^.\s]+)\.([^\s]+)")
        .ok()
        .and_then(|re| re.captures(message))
    {
        return BigQueryError::TableNotFound {
            project: caps[1].to_string(),
            dataset: caps[2].to_string(),
            table: caps[3].to_string(),
        };
    }

    // "Not found: Dataset project:dataset"
    if let Some(caps) = Regex::new(r"(?i)dataset\s+([^:\s]+):([^\s]+)")
        .ok()
        .and_then(|re| re.captures(message))
    {
        return BigQueryError::DatasetNotFound {
            project: caps[1].to_string(),
            dataset: caps[2].to_string(),
        };
    }

    match (&context.project, &context.dataset, &context.table) {
        (Some(project), Some(dataset), Some(table)) if !msg_lower.contains("dataset") => {
            BigQueryError::TableNotFound {
                project: project.clone(),
                dataset: dataset.clone(),
                table: table.clone(),
            }
        }
        (Some(project), Some(dataset), _) => BigQueryError::DatasetNotFound {
            project: project.clone(),
            dataset: dataset.clone(),
        },
        _ => BigQueryError::Unknown {
            code: Some("notFound".to_string()),
            message: message.to_string(),
        },
    }
}

fn extract_query_location(message: &str) -> Option<QueryErrorLocation> {
    let caps = Regex::new(r"\[(\d+):(\d+)\]").ok()?.captures(message)?;
    Some(QueryErrorLocation {
        line: caps.get(1).and_then(|m| m.as_str().parse().ok()),
        column: caps.get(2).and_then(|m| m.as_str().parse().ok()),
    })
}

fn extract_required_permission(message: &str) -> Option<String> {
    Regex::new(r"(bigquery\.[a-zA-Z.]+)")
        .ok()?
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_string())
}

#[derive(Debug, Default, Clone)]
pub struct ErrorContext {
    pub sql: Option<String>,
    pub operation: Option<String>,
    pub resource: Option<String>,
    pub project: Option<String>,
    pub dataset: Option<String>,
    pub table: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        let full_sql = sql.into();
        // Keep a preview only
        self.sql = Some(match full_sql.char_indices().nth(500) {
            Some((idx, _)) => format!("{}...", &full_sql[..idx]),
            None => full_sql,
        });
        self
    }

    pub fn with_operation(mut self, op: impl Into<String>) -> Self {
        self.operation = Some(op.into());
        self
    }

    pub fn with_dataset(mut self, project: impl Into<String>, dataset: impl Into<String>) -> Self {
        let project = project.into();
        let dataset = dataset.into();
        self.resource = Some(format!("{}.{}", project, dataset));
        self.project = Some(project);
        self.dataset = Some(dataset);
        self
    }

    pub fn with_table(
        mut self,
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        let project = project.into();
        let dataset = dataset.into();
        let table = table.into();
        self.resource = Some(format!("{}.{}.{}", project, dataset, table));
        self.project = Some(project);
        self.dataset = Some(dataset);
        self.table = Some(table);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_query_location_brackets() {
        let loc = extract_query_location("Syntax error: Unexpected identifier at [3:15]").unwrap();
        assert_eq!(loc.line, Some(3));
        assert_eq!(loc.column, Some(15));
    }

    #[test]
    fn test_extract_query_location_no_match() {
        assert!(extract_query_location("Some error without location info").is_none());
    }

    #[test]
    fn test_extract_required_permission() {
        let msg = "Access denied: User does not have bigquery.tables.update permission";
        assert_eq!(extract_required_permission(msg).unwrap(), "bigquery.tables.update");
    }

    #[test]
    fn test_parse_not_found_table_from_message() {
        let err = parse_not_found_error("Not found: Table my-project:sales.revenue", &ErrorContext::new());
        match err {
            BigQueryError::TableNotFound { project, dataset, table } => {
                assert_eq!(project, "my-project");
                assert_eq!(dataset, "sales");
                assert_eq!(table, "revenue");
            }
            other => panic!("Expected TableNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_not_found_dataset_from_message() {
        let err = parse_not_found_error("Not found: Dataset my-project:sales", &ErrorContext::new());
        assert!(matches!(err, BigQueryError::DatasetNotFound { .. }));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_parse_not_found_from_context() {
        let ctx = ErrorContext::new().with_table("proj", "sales", "revenue");
        let err = parse_not_found_error("Requested entity was not found.", &ctx);
        match err {
            BigQueryError::TableNotFound { table, .. } => assert_eq!(table, "revenue"),
            other => panic!("Expected TableNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_not_found_generic_is_still_not_found() {
        let err = parse_not_found_error("Resource unavailable", &ErrorContext::new());
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_context_sql_truncation() {
        let long_sql = "SELECT ".to_string() + &"x, ".repeat(500);
        let ctx = ErrorContext::new().with_sql(long_sql);
        let sql = ctx.sql.unwrap();
        assert!(sql.ends_with("..."));
        assert_eq!(sql.chars().count(), 503);
    }

    #[test]
    fn test_error_context_with_table() {
        let ctx = ErrorContext::new()
            .with_operation("get_view")
            .with_table("my-project", "sales", "revenue");
        assert_eq!(ctx.operation.as_deref(), Some("get_view"));
        assert_eq!(ctx.resource.as_deref(), Some("my-project.sales.revenue"));
    }
}
