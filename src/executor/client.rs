use gcp_bigquery_client::Client;
use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::model::dataset::Dataset;
use gcp_bigquery_client::model::get_query_results_parameters::GetQueryResultsParameters;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::table::Table;
use gcp_bigquery_client::model::table_row::TableRow;
use gcp_bigquery_client::model::table_schema::TableSchema;
use tracing::debug;
use crate::error::{BqvError, Result, parse_bq_error, ErrorContext};

#[derive(Clone)]
pub struct BqClient {
    client: Client,
    project_id: String,
}

impl BqClient {
    pub async fn new(project_id: impl Into<String>) -> Result<Self> {
        let client = Client::from_application_default_credentials()
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new().with_operation("client_init");
                BqvError::BigQuery(parse_bq_error(e, ctx))
            })?;

        Ok(Self {
            client,
            project_id: project_id.into(),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// An empty table shell; callers attach a view definition or metadata.
    pub fn new_table(&self, dataset: &str, table: &str) -> Table {
        Table::new(&self.project_id, dataset, table, TableSchema { fields: Some(Vec::new()) })
    }

    pub async fn get_table(&self, dataset: &str, table: &str) -> Result<Table> {
        self.client
            .table()
            .get(&self.project_id, dataset, table, None)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("get_table")
                    .with_table(&self.project_id, dataset, table);
                BqvError::BigQuery(parse_bq_error(e, ctx))
            })
    }

    pub async fn create_table(&self, dataset: &str, table_id: &str, table: Table) -> Result<Table> {
        self.client
            .table()
            .create(table)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("create_table")
                    .with_table(&self.project_id, dataset, table_id);
                BqvError::BigQuery(parse_bq_error(e, ctx))
            })
    }

    pub async fn update_table(&self, dataset: &str, table_id: &str, table: Table) -> Result<Table> {
        self.client
            .table()
            .update(&self.project_id, dataset, table_id, table)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("update_table")
                    .with_table(&self.project_id, dataset, table_id);
                BqvError::BigQuery(parse_bq_error(e, ctx))
            })
    }

    pub async fn delete_table(&self, dataset: &str, table: &str) -> Result<()> {
        self.client
            .table()
            .delete(&self.project_id, dataset, table)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("delete_table")
                    .with_table(&self.project_id, dataset, table);
                BqvError::BigQuery(parse_bq_error(e, ctx))
            })
    }

    pub async fn ensure_dataset(&self, dataset: &str) -> Result<()> {
        match self.client.dataset().get(&self.project_id, dataset).await {
            Ok(_) => Ok(()),
            Err(_) => {
                let ds = Dataset::new(&self.project_id, dataset);
                self.client
                    .dataset()
                    .create(ds)
                    .await
                    .map_err(|e| {
                        let ctx = ErrorContext::new()
                            .with_operation("create_dataset")
                            .with_dataset(&self.project_id, dataset);
                        BqvError::BigQuery(parse_bq_error(e, ctx))
                    })?;
                Ok(())
            }
        }
    }

    pub async fn execute_query(&self, sql: &str) -> Result<()> {
        let request = QueryRequest::new(sql);

        self.client
            .job()
            .query(&self.project_id, request)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("execute_query")
                    .with_sql(sql);
                BqvError::BigQuery(parse_bq_error(e, ctx))
            })?;

        Ok(())
    }

    /// Run a query and return every row as string cells. NULLs become `None`.
    ///
    /// Waits for the job to finish and follows page tokens, so a slow or
    /// large result never comes back short.
    pub async fn query_rows(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        let map_err = |e: BQError| {
            let ctx = ErrorContext::new()
                .with_operation("query_rows")
                .with_sql(sql);
            BqvError::BigQuery(parse_bq_error(e, ctx))
        };

        let first = self.client
            .job()
            .query(&self.project_id, QueryRequest::new(sql))
            .await
            .map_err(map_err)?;

        let job = first.job_reference;
        let mut rows = decode_rows(first.rows);
        let mut step = Continuation::after(first.job_complete, first.page_token);
        let mut page_token = None;
        let mut calls = 0;

        loop {
            match step {
                Continuation::Done => return Ok(rows),
                Continuation::NextPage(token) => page_token = Some(token),
                Continuation::Poll => debug!("Query job still running, polling"),
            }

            calls += 1;
            if calls > MAX_RESULT_CALLS {
                return Err(BqvError::Repository(format!(
                    "query results incomplete after {} calls",
                    MAX_RESULT_CALLS
                )));
            }

            let Some(job_id) = job.as_ref().and_then(|j| j.job_id.as_deref()) else {
                return Err(BqvError::Repository(
                    "query returned partial results without a job reference".into(),
                ));
            };
            let project_id = job
                .as_ref()
                .and_then(|j| j.project_id.as_deref())
                .unwrap_or(&self.project_id);
            let parameters = GetQueryResultsParameters {
                location: job.as_ref().and_then(|j| j.location.clone()),
                page_token: page_token.clone(),
                timeout_ms: Some(POLL_TIMEOUT_MS),
                ..Default::default()
            };

            let response = self.client
                .job()
                .get_query_results(project_id, job_id, parameters)
                .await
                .map_err(map_err)?;
            rows.extend(decode_rows(response.rows));
            step = Continuation::after(response.job_complete, response.page_token);
        }
    }
}

/// Server-side wait of one `getQueryResults` call.
const POLL_TIMEOUT_MS: i32 = 10_000;
const MAX_RESULT_CALLS: usize = 1_000;

/// What `query_rows` does after a response.
#[derive(Debug, PartialEq, Eq)]
enum Continuation {
    Done,
    /// Job not finished; ask again for the same page.
    Poll,
    NextPage(String),
}

impl Continuation {
    fn after(job_complete: Option<bool>, page_token: Option<String>) -> Self {
        match (job_complete, page_token) {
            (Some(true), None) => Continuation::Done,
            (Some(true), Some(token)) => Continuation::NextPage(token),
            _ => Continuation::Poll,
        }
    }
}

fn decode_rows(rows: Option<Vec<TableRow>>) -> Vec<Vec<Option<String>>> {
    rows.unwrap_or_default()
        .into_iter()
        .map(|row| {
            row.columns
                .unwrap_or_default()
                .into_iter()
                .map(|cell| match cell.value {
                    Some(serde_json::Value::String(s)) => Some(s),
                    Some(serde_json::Value::Null) | None => None,
                    Some(other) => Some(other.to_string()),
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcp_bigquery_client::model::table_cell::TableCell;

    #[test]
    fn test_incomplete_job_is_polled() {
        assert_eq!(Continuation::after(Some(false), None), Continuation::Poll);
        assert_eq!(Continuation::after(None, None), Continuation::Poll);
        assert_eq!(Continuation::after(Some(false), Some("p2".into())), Continuation::Poll);
    }

    #[test]
    fn test_page_token_is_followed() {
        assert_eq!(
            Continuation::after(Some(true), Some("p2".into())),
            Continuation::NextPage("p2".into())
        );
        assert_eq!(Continuation::after(Some(true), None), Continuation::Done);
    }

    #[test]
    fn test_decode_rows() {
        let row = TableRow {
            columns: Some(vec![
                TableCell { value: Some(serde_json::Value::String("sales".into())) },
                TableCell { value: Some(serde_json::Value::Null) },
                TableCell { value: Some(serde_json::json!(3)) },
            ]),
        };
        assert_eq!(
            decode_rows(Some(vec![row])),
            vec![vec![Some("sales".to_string()), None, Some("3".to_string())]]
        );
        assert!(decode_rows(None).is_empty());
    }
}
