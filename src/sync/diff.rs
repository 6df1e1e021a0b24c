use std::collections::BTreeMap;
use serde::Serialize;
use tracing::debug;
use crate::diff::{colorize_diff, unified_sql_diff};
use crate::error::{BqvError, Result};
use crate::repository::ViewReader;
use crate::view::{View, ViewSetting};
use super::compare::{equal_with, ComparePolicy};
use super::SyncOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    /// Present in the source only. The diff is the full source query.
    Added,
    Changed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    pub dataset: String,
    pub name: String,
    pub kind: DiffKind,
    pub diff: String,
}

impl DiffEntry {
    pub fn is_empty(&self) -> bool {
        self.diff.is_empty()
    }
}

/// The fields a metadata comparison looks at, rendered for diffing.
#[derive(Serialize)]
struct MetadataView<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: &'a BTreeMap<String, String>,
}

fn metadata_yaml(setting: &ViewSetting) -> Result<String> {
    let doc = MetadataView {
        description: setting.description.as_deref(),
        labels: &setting.labels,
    };
    Ok(serde_yaml::to_string(&doc)?)
}

/// Diff one source view against its destination counterpart. Empty when
/// nothing the policy cares about differs.
pub fn diff_pair(policy: ComparePolicy, source: &View, destination: &View) -> Result<String> {
    let mut text = unified_sql_diff(
        destination.query(),
        source.query(),
        &format!("destination/{}", destination),
        &format!("source/{}", source),
    );

    if policy == ComparePolicy::QueryAndMetadata
        && !source.setting().same_metadata(destination.setting())
    {
        let metadata = unified_sql_diff(
            &metadata_yaml(destination.setting())?,
            &metadata_yaml(source.setting())?,
            &format!("destination/{}.yml", destination),
            &format!("source/{}.yml", source),
        );
        text.push_str(&metadata);
    }

    Ok(text)
}

pub(crate) async fn diff(
    options: &SyncOptions,
    source: &dyn ViewReader,
    destination: &dyn ViewReader,
) -> Result<Vec<DiffEntry>> {
    let views = source.list().await?;
    let mut entries = Vec::new();

    for view in &views {
        if options.cancel.is_cancelled() {
            return Err(BqvError::cancelled());
        }

        match destination.get(view.dataset(), view.name()).await {
            Ok(existing) => {
                if equal_with(options.compare, Some(view), Some(&existing)) {
                    debug!("{} is identical", view);
                    continue;
                }
                let text = diff_pair(options.compare, view, &existing)
                    .map_err(|e| e.for_item(view.dataset(), view.name()))?;
                if text.is_empty() {
                    debug!("{} is identical", view);
                    continue;
                }
                entries.push(DiffEntry {
                    dataset: view.dataset().to_string(),
                    name: view.name().to_string(),
                    kind: DiffKind::Changed,
                    diff: text,
                });
            }
            Err(e) if e.is_not_found() => {
                debug!("{} is missing from destination", view);
                entries.push(DiffEntry {
                    dataset: view.dataset().to_string(),
                    name: view.name().to_string(),
                    kind: DiffKind::Added,
                    diff: view.query().to_string(),
                });
            }
            Err(e) => return Err(e.for_item(view.dataset(), view.name())),
        }
    }

    Ok(entries)
}

/// Operator-facing rendering of a diff run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    pub entries: Vec<DiffEntry>,
}

impl DiffReport {
    pub fn new(entries: Vec<DiffEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn added(&self) -> usize {
        self.entries.iter().filter(|e| e.kind == DiffKind::Added).count()
    }

    pub fn changed(&self) -> usize {
        self.entries.iter().filter(|e| e.kind == DiffKind::Changed).count()
    }

    pub fn render(&self, colored: bool) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            match entry.kind {
                DiffKind::Added => {
                    out.push_str(&format!("+ {}.{} (new)\n", entry.dataset, entry.name));
                    for line in entry.diff.lines() {
                        out.push_str(&format!("+{}\n", line));
                    }
                }
                DiffKind::Changed => {
                    out.push_str(&format!("~ {}.{}\n", entry.dataset, entry.name));
                    if colored {
                        out.push_str(&colorize_diff(&entry.diff));
                        out.push('\n');
                    } else {
                        out.push_str(&entry.diff);
                        if !entry.diff.ends_with('\n') {
                            out.push('\n');
                        }
                    }
                }
            }
        }
        out
    }
}
