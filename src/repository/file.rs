use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use crate::error::{BqvError, Result};
use crate::view::{View, ViewKind, ViewSetting};
use super::{prefixed, unprefixed, ViewReader, ViewWriter};

const SQL_EXT: &str = "sql";
const SETTING_EXT: &str = "yml";

/// On-disk companion of `<name>.sql`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingFile {
    #[serde(default)]
    metadata: ViewSetting,
    #[serde(default, skip_serializing_if = "is_plain_view")]
    kind: ViewKind,
}

fn is_plain_view(kind: &ViewKind) -> bool {
    *kind == ViewKind::View
}

/// Views stored as a directory tree:
///
/// ```text
/// <dir>/<dataset>/<name>.sql   view body
/// <dir>/<dataset>/<name>.yml   metadata (optional)
/// ```
#[derive(Debug, Clone)]
pub struct FileRepository {
    dir: PathBuf,
    dataset_prefix: Option<String>,
}

impl FileRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            dataset_prefix: None,
        }
    }

    pub fn with_dataset_prefix(mut self, prefix: Option<String>) -> Self {
        self.dataset_prefix = prefix.filter(|p| !p.is_empty());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn dataset_path(&self, dataset: &str) -> PathBuf {
        self.dir.join(prefixed(self.dataset_prefix.as_deref(), dataset))
    }

    pub fn sql_path(&self, dataset: &str, name: &str) -> PathBuf {
        self.dataset_path(dataset).join(format!("{}.{}", name, SQL_EXT))
    }

    pub fn setting_path(&self, dataset: &str, name: &str) -> PathBuf {
        self.dataset_path(dataset).join(format!("{}.{}", name, SETTING_EXT))
    }

    async fn read_view(&self, dataset: &str, name: &str) -> Result<View> {
        let sql_path = self.sql_path(dataset, name);
        let query = match tokio::fs::read_to_string(&sql_path).await {
            Ok(q) => q,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BqvError::not_found(dataset, name));
            }
            Err(e) => return Err(e.into()),
        };

        let setting_path = self.setting_path(dataset, name);
        let setting_file = match tokio::fs::read_to_string(&setting_path).await {
            Ok(content) if content.trim().is_empty() => SettingFile::default(),
            Ok(content) => serde_yaml::from_str::<SettingFile>(&content).map_err(|e| {
                BqvError::Repository(format!("Failed to parse {}: {}", setting_path.display(), e))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => SettingFile::default(),
            Err(e) => return Err(e.into()),
        };
        setting_file.metadata.validate().map_err(|e| {
            BqvError::Repository(format!("{}: {}", setting_path.display(), e))
        })?;

        Ok(View::new(dataset, name, query)
            .with_setting(setting_file.metadata)
            .with_kind(setting_file.kind))
    }

    async fn write_view(&self, view: &View) -> Result<()> {
        let setting_file = SettingFile {
            metadata: view.setting().clone(),
            kind: view.kind(),
        };
        let yaml = serde_yaml::to_string(&setting_file)?;

        tokio::fs::write(self.sql_path(view.dataset(), view.name()), view.query()).await?;
        tokio::fs::write(self.setting_path(view.dataset(), view.name()), yaml).await?;
        Ok(())
    }

    async fn list_dataset(&self, dataset: &str, path: &Path) -> Result<Vec<View>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                info!("Unexpected directory {}, skipping", path.display());
                continue;
            }
            match path.extension().and_then(|e| e.to_str()) {
                Some(SQL_EXT) => {}
                Some(SETTING_EXT) => continue,
                _ => {
                    info!("Not a sql file: {}, skipping", path.display());
                    continue;
                }
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => names.push(stem.to_string()),
                None => info!("View name of {} is not valid UTF-8, skipping", path.display()),
            }
        }
        names.sort();

        let mut views = Vec::with_capacity(names.len());
        for name in names {
            views.push(self.read_view(dataset, &name).await?);
        }
        Ok(views)
    }
}

fn check_segment(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains(['/', '\\']) || value == "." || value == ".." {
        return Err(BqvError::Repository(format!("invalid {} name: {:?}", kind, value)));
    }
    Ok(())
}

#[async_trait]
impl ViewReader for FileRepository {
    async fn list(&self) -> Result<Vec<View>> {
        debug!("Listing views in {}", self.dir.display());

        let mut datasets = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.starts_with('.') {
                continue;
            }
            if !entry.file_type().await?.is_dir() {
                warn!("Unexpected file {} at view root, skipping", entry.path().display());
                continue;
            }
            match unprefixed(self.dataset_prefix.as_deref(), &file_name) {
                Some(dataset) => datasets.push((dataset.to_string(), entry.path())),
                None => debug!("Dataset directory {} outside prefix, skipping", file_name),
            }
        }
        datasets.sort();

        let mut views = Vec::new();
        for (dataset, path) in datasets {
            views.extend(self.list_dataset(&dataset, &path).await?);
        }
        Ok(views)
    }

    async fn get(&self, dataset: &str, name: &str) -> Result<View> {
        check_segment("dataset", dataset)?;
        check_segment("view", name)?;
        self.read_view(dataset, name).await
    }
}

#[async_trait]
impl ViewWriter for FileRepository {
    fn physical_dataset(&self, dataset: &str) -> String {
        prefixed(self.dataset_prefix.as_deref(), dataset)
    }

    async fn create(&self, view: &View) -> Result<View> {
        check_segment("dataset", view.dataset())?;
        check_segment("view", view.name())?;

        tokio::fs::create_dir_all(self.dataset_path(view.dataset())).await?;
        self.write_view(view).await?;
        info!("Created {} in {}", view, self.dir.display());
        Ok(view.clone())
    }

    async fn update(&self, view: &View) -> Result<View> {
        check_segment("dataset", view.dataset())?;
        check_segment("view", view.name())?;

        if !tokio::fs::try_exists(self.sql_path(view.dataset(), view.name())).await? {
            return Err(BqvError::not_found(view.dataset(), view.name()));
        }
        self.write_view(view).await?;
        debug!("Updated {} in {}", view, self.dir.display());
        self.read_view(view.dataset(), view.name()).await
    }

    async fn delete(&self, view: &View) -> Result<()> {
        check_segment("dataset", view.dataset())?;
        check_segment("view", view.name())?;

        match tokio::fs::remove_file(self.sql_path(view.dataset(), view.name())).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BqvError::not_found(view.dataset(), view.name()));
            }
            Err(e) => return Err(e.into()),
        }
        match tokio::fs::remove_file(self.setting_path(view.dataset(), view.name())).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!("Deleted {} from {}", view, self.dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let repo = FileRepository::new("/views");
        assert_eq!(repo.sql_path("sales", "revenue"), PathBuf::from("/views/sales/revenue.sql"));
        assert_eq!(repo.setting_path("sales", "revenue"), PathBuf::from("/views/sales/revenue.yml"));
    }

    #[test]
    fn test_paths_with_prefix() {
        let repo = FileRepository::new("/views").with_dataset_prefix(Some("test_".into()));
        assert_eq!(repo.sql_path("sales", "revenue"), PathBuf::from("/views/test_sales/revenue.sql"));
    }

    #[test]
    fn test_physical_dataset_follows_prefix() {
        let repo = FileRepository::new("/views").with_dataset_prefix(Some("test_".into()));
        assert_eq!(repo.physical_dataset("sales"), "test_sales");
        assert_eq!(FileRepository::new("/views").physical_dataset("sales"), "sales");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_name_is_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let dataset = tmp.path().join("sales");
        std::fs::create_dir_all(&dataset).unwrap();
        std::fs::write(dataset.join("revenue.sql"), "SELECT 1").unwrap();
        std::fs::write(dataset.join(OsStr::from_bytes(b"bad\xff.sql")), "SELECT 2").unwrap();

        let views = FileRepository::new(tmp.path()).list().await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].name(), "revenue");
    }

    #[test]
    fn test_empty_prefix_is_none() {
        let repo = FileRepository::new("/views").with_dataset_prefix(Some(String::new()));
        assert_eq!(repo.dataset_path("sales"), PathBuf::from("/views/sales"));
    }

    #[test]
    fn test_check_segment() {
        assert!(check_segment("view", "revenue").is_ok());
        assert!(check_segment("view", "../etc").is_err());
        assert!(check_segment("view", "").is_err());
        assert!(check_segment("dataset", "..").is_err());
    }
}
