use std::collections::{BTreeMap, HashMap};
use async_trait::async_trait;
use gcp_bigquery_client::model::table::Table;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use crate::error::{BqvError, Result};
use crate::executor::BqClient;
use crate::view::{snapshot_query, MaterializedViewSetting, View, ViewKind, ViewSetting, CACHED_PREFIX};
use super::{prefixed, unprefixed, ViewReader, ViewWriter};

/// Views stored in a BigQuery project.
///
/// Views and materialized views map to `View`. A `cached_*` table is read
/// back as a `SnapshotTable`; writing one runs its materialization statement
/// instead of creating a view.
#[derive(Clone)]
pub struct BigQueryRepository {
    client: BqClient,
    location: String,
    dataset_prefix: Option<String>,
}

impl BigQueryRepository {
    pub fn new(client: BqClient, location: impl Into<String>) -> Self {
        Self {
            client,
            location: location.into(),
            dataset_prefix: None,
        }
    }

    pub fn with_dataset_prefix(mut self, prefix: Option<String>) -> Self {
        self.dataset_prefix = prefix.filter(|p| !p.is_empty());
        self
    }

    fn physical(&self, dataset: &str) -> String {
        prefixed(self.dataset_prefix.as_deref(), dataset)
    }

    fn list_sql(&self) -> String {
        format!(
            "SELECT table_schema, table_name \
             FROM `{project}`.`region-{location}`.INFORMATION_SCHEMA.TABLES \
             WHERE table_type IN ('VIEW', 'MATERIALIZED VIEW') \
             ORDER BY table_schema, table_name",
            project = self.client.project_id(),
            location = self.location.to_lowercase(),
        )
    }

    fn not_found_or(err: BqvError, dataset: &str, name: &str) -> BqvError {
        match &err {
            BqvError::BigQuery(bq) if bq.is_not_found() => BqvError::not_found(dataset, name),
            _ => err,
        }
    }

    fn to_view(&self, dataset: &str, name: &str, table: &Table) -> Result<View> {
        let value = serde_json::to_value(table)?;
        let setting = setting_from_table(&value)?;

        if let Some(query) = value.pointer("/view/query").and_then(Value::as_str) {
            return Ok(View::new(dataset, name, query).with_setting(setting));
        }

        if let Some(query) = value.pointer("/materializedView/query").and_then(Value::as_str) {
            return Ok(View::new(dataset, name, query).with_setting(setting));
        }

        if let Some(base) = name.strip_prefix(CACHED_PREFIX) {
            return Ok(View::new(dataset, name, snapshot_query(dataset, base))
                .with_kind(ViewKind::SnapshotTable));
        }

        Err(BqvError::Repository(format!("{}.{} is a table, not a view", dataset, name)))
    }

    fn apply_view(&self, table: &mut Table, view: &View) -> Result<()> {
        let setting = view.setting();
        match &setting.materialized_view {
            Some(mv) => {
                table.view = None;
                table.materialized_view = Some(serde_json::from_value(json!({
                    "query": view.query(),
                    "enableRefresh": mv.enable_refresh,
                    "refreshIntervalMs": mv.refresh_interval_ms.to_string(),
                }))?);
            }
            None => {
                table.materialized_view = None;
                table.view = Some(serde_json::from_value(json!({
                    "query": view.query(),
                    "useLegacySql": false,
                }))?);
            }
        }
        table.description = setting.description.clone();
        table.labels = if setting.labels.is_empty() {
            None
        } else {
            Some(setting.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<HashMap<_, _>>())
        };
        Ok(())
    }

    /// Materialization statement against the physical datasets.
    fn snapshot_sql(&self, view: &View) -> Result<String> {
        let base = view.name().strip_prefix(CACHED_PREFIX).ok_or_else(|| {
            BqvError::Repository(format!("snapshot table {} must be named {}<view>", view, CACHED_PREFIX))
        })?;
        Ok(snapshot_query(&self.physical(view.dataset()), base))
    }

    async fn materialize(&self, view: &View) -> Result<View> {
        let physical = self.physical(view.dataset());
        self.client.ensure_dataset(&physical).await?;
        let sql = self.snapshot_sql(view)?;
        debug!("Materializing {}: {}", view, sql);
        self.client.execute_query(&sql).await?;
        Ok(view.clone())
    }
}

fn setting_from_table(value: &Value) -> Result<ViewSetting> {
    let mut setting = ViewSetting::default();

    setting.description = value
        .get("description")
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty())
        .map(|d| d.to_string());

    if let Some(labels) = value.get("labels").and_then(Value::as_object) {
        setting.labels = labels
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect::<BTreeMap<_, _>>();
    }

    if let Some(mv) = value.get("materializedView").filter(|v| v.is_object()) {
        let refresh_interval_ms = match mv.get("refreshIntervalMs") {
            Some(Value::String(s)) => s.parse().unwrap_or_default(),
            Some(Value::Number(n)) => n.as_u64().unwrap_or_default(),
            _ => 0,
        };
        setting.materialized_view = Some(MaterializedViewSetting {
            enable_refresh: mv.get("enableRefresh").and_then(Value::as_bool).unwrap_or(true),
            refresh_interval_ms,
        });
    }

    setting.validate()?;
    Ok(setting)
}

#[async_trait]
impl ViewReader for BigQueryRepository {
    async fn list(&self) -> Result<Vec<View>> {
        let rows = self.client.query_rows(&self.list_sql()).await?;

        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            let (Some(Some(physical)), Some(Some(name))) = (row.first(), row.get(1)) else {
                continue;
            };
            let Some(dataset) = unprefixed(self.dataset_prefix.as_deref(), physical) else {
                continue;
            };
            views.push(self.get(dataset, name).await?);
        }
        Ok(views)
    }

    async fn get(&self, dataset: &str, name: &str) -> Result<View> {
        let physical = self.physical(dataset);
        let table = self
            .client
            .get_table(&physical, name)
            .await
            .map_err(|e| Self::not_found_or(e, dataset, name))?;
        self.to_view(dataset, name, &table)
    }
}

#[async_trait]
impl ViewWriter for BigQueryRepository {
    fn physical_dataset(&self, dataset: &str) -> String {
        self.physical(dataset)
    }

    async fn create(&self, view: &View) -> Result<View> {
        if view.is_snapshot() {
            return self.materialize(view).await;
        }

        let physical = self.physical(view.dataset());
        self.client.ensure_dataset(&physical).await?;

        let mut table = self.client.new_table(&physical, view.name());
        self.apply_view(&mut table, view)?;
        self.client.create_table(&physical, view.name(), table).await?;
        info!("Created view {}.{}", physical, view.name());

        self.get(view.dataset(), view.name()).await
    }

    async fn update(&self, view: &View) -> Result<View> {
        let physical = self.physical(view.dataset());
        let mut existing = self
            .client
            .get_table(&physical, view.name())
            .await
            .map_err(|e| Self::not_found_or(e, view.dataset(), view.name()))?;

        if view.is_snapshot() {
            return self.materialize(view).await;
        }

        let current = self.to_view(view.dataset(), view.name(), &existing)?;
        let recreate = view.setting().materialized_view.is_some() && current.query() != view.query();

        if recreate {
            warn!(
                "Materialized view query of {} cannot be updated in place, recreating",
                view
            );
            self.client.delete_table(&physical, view.name()).await?;
            let mut table = self.client.new_table(&physical, view.name());
            self.apply_view(&mut table, view)?;
            self.client.create_table(&physical, view.name(), table).await?;
        } else {
            self.apply_view(&mut existing, view)?;
            self.client
                .update_table(&physical, view.name(), existing)
                .await
                .map_err(|e| Self::not_found_or(e, view.dataset(), view.name()))?;
        }
        debug!("Updated view {}.{}", physical, view.name());

        self.get(view.dataset(), view.name()).await
    }

    async fn delete(&self, view: &View) -> Result<()> {
        let physical = self.physical(view.dataset());
        self.client
            .delete_table(&physical, view.name())
            .await
            .map_err(|e| Self::not_found_or(e, view.dataset(), view.name()))?;
        info!(
            "Deleted {} {}.{}",
            if view.is_snapshot() { "snapshot table" } else { "view" },
            physical,
            view.name()
        );
        Ok(())
    }
}
