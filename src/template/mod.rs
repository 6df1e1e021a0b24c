//! Template rendering: a template is a `.sql` file whose result rows are
//! views to generate. Each row carries the view name in its first column
//! and the view query in its second. The generated views land in the
//! dataset named by the template's parent directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use crate::error::{BqvError, Result};
use crate::executor::RowSource;
use crate::repository::ViewRepository;
use crate::view::{View, ViewId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate {
    pub template: PathBuf,
    pub views: Vec<ViewId>,
}

/// Dataset a template renders into: `<any>/<dataset>/<template>.sql`.
pub fn template_dataset(path: &Path) -> Result<String> {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|d| d.to_str())
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            BqvError::Config(format!(
                "Template {} must live at <dir>/<dataset>/<template>.sql",
                path.display()
            ))
        })
}

fn row_view(dataset: &str, template: &Path, index: usize, row: Vec<Option<String>>) -> Result<View> {
    let mut cells = row.into_iter();
    match (cells.next().flatten(), cells.next().flatten()) {
        (Some(name), Some(query)) if !name.trim().is_empty() => Ok(View::new(dataset, name.trim(), query)),
        _ => Err(BqvError::Config(format!(
            "{}: row {} must have a view name and a query",
            template.display(),
            index + 1
        ))),
    }
}

/// Renders templates with bounded concurrency. The first failing template
/// (in argument order) fails the whole run; views written by the others stay.
pub struct TemplateRenderer {
    source: Arc<dyn RowSource>,
    concurrency: usize,
    cancel: CancellationToken,
}

impl TemplateRenderer {
    pub fn new(source: Arc<dyn RowSource>) -> Self {
        Self {
            source,
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

    /// Write `view` keeping whatever metadata the destination already holds
    /// for it, since templates only produce queries.
    async fn save(&self, view: View, destination: &dyn ViewRepository) -> Result<()> {
        match destination.get(view.dataset(), view.name()).await {
            Ok(existing) => {
                let view = view.with_setting(existing.setting().clone());
                destination.update(&view).await?;
                debug!("Re-rendered {}", view);
            }
            Err(e) if e.is_not_found() => {
                destination.create(&view).await?;
                debug!("Rendered {}", view);
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn render_one(&self, template: &Path, destination: &dyn ViewRepository) -> Result<RenderedTemplate> {
        if self.cancel.is_cancelled() {
            return Err(BqvError::cancelled());
        }

        let dataset = template_dataset(template)?;
        let sql = tokio::fs::read_to_string(template).await?;
        let rows = self.source.rows(&sql).await?;
        debug!("{} produced {} row(s)", template.display(), rows.len());

        let mut views = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            let view = row_view(&dataset, template, index, row)?;
            let id = view.id();
            self.save(view, destination).await?;
            views.push(id);
        }

        info!("Rendered {} view(s) from {}", views.len(), template.display());
        Ok(RenderedTemplate {
            template: template.to_path_buf(),
            views,
        })
    }

    pub async fn render(
        &self,
        templates: &[PathBuf],
        destination: &dyn ViewRepository,
    ) -> Result<Vec<RenderedTemplate>> {
        let mut results: Vec<(usize, Result<RenderedTemplate>)> = stream::iter(templates.iter().enumerate())
            .map(|(index, path)| async move { (index, self.render_one(path, destination).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by_key(|(index, _)| *index);

        results.into_iter().map(|(_, result)| result).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use async_trait::async_trait;
    use tempfile::TempDir;
    use crate::repository::{MemoryRepository, ViewReader};
    use crate::view::ViewSetting;

    /// Answers each template body with canned rows.
    struct CannedRows(HashMap<String, Vec<Vec<Option<String>>>>);

    #[async_trait]
    impl RowSource for CannedRows {
        async fn rows(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
            self.0
                .get(sql)
                .cloned()
                .ok_or_else(|| BqvError::Repository(format!("unexpected query: {}", sql)))
        }
    }

    fn row(name: &str, query: &str) -> Vec<Option<String>> {
        vec![Some(name.to_string()), Some(query.to_string())]
    }

    fn template(dir: &TempDir, rel: &str, sql: &str) -> PathBuf {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, sql).unwrap();
        path
    }

    #[test]
    fn test_template_dataset() {
        assert_eq!(template_dataset(Path::new("templates/sales/daily.sql")).unwrap(), "sales");
        assert!(template_dataset(Path::new("daily.sql")).is_err());
    }

    #[tokio::test]
    async fn test_render_writes_rows_as_views() {
        let tmp = TempDir::new().unwrap();
        let path = template(&tmp, "sales/by_region.sql", "SELECT name, query FROM regions");
        let source = CannedRows(HashMap::from([(
            "SELECT name, query FROM regions".to_string(),
            vec![row("revenue_eu", "SELECT 1"), row("revenue_us", "SELECT 2")],
        )]));
        let destination = MemoryRepository::new();

        let rendered = TemplateRenderer::new(Arc::new(source))
            .render(&[path.clone()], &destination)
            .await
            .unwrap();

        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].template, path);
        assert_eq!(
            rendered[0].views,
            vec![ViewId::new("sales", "revenue_eu"), ViewId::new("sales", "revenue_us")]
        );
        assert_eq!(destination.get("sales", "revenue_us").await.unwrap().query(), "SELECT 2");
    }

    #[tokio::test]
    async fn test_render_keeps_existing_metadata() {
        let tmp = TempDir::new().unwrap();
        let path = template(&tmp, "sales/by_region.sql", "SELECT 'x'");
        let source = CannedRows(HashMap::from([(
            "SELECT 'x'".to_string(),
            vec![row("revenue_eu", "SELECT 3")],
        )]));
        let destination = MemoryRepository::with_views([View::new("sales", "revenue_eu", "SELECT 1")
            .with_setting(ViewSetting::new().with_view_table(None))]);

        TemplateRenderer::new(Arc::new(source))
            .render(&[path], &destination)
            .await
            .unwrap();

        let view = destination.get("sales", "revenue_eu").await.unwrap();
        assert_eq!(view.query(), "SELECT 3");
        assert!(view.setting().view_table);
    }

    #[tokio::test]
    async fn test_render_rejects_row_without_query() {
        let tmp = TempDir::new().unwrap();
        let path = template(&tmp, "sales/broken.sql", "SELECT 'broken'");
        let source = CannedRows(HashMap::from([(
            "SELECT 'broken'".to_string(),
            vec![vec![Some("revenue".to_string()), None]],
        )]));

        let err = TemplateRenderer::new(Arc::new(source))
            .render(&[path], &MemoryRepository::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }
}
