use std::fmt;

/// The step of a per-view sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStep {
    Upsert,
    SnapshotCreate,
    SnapshotDelete,
    SchedulingCreate,
    SchedulingDelete,
    Delete,
}

impl SyncStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStep::Upsert => "upsert",
            SyncStep::SnapshotCreate => "snapshot-create",
            SyncStep::SnapshotDelete => "snapshot-delete",
            SyncStep::SchedulingCreate => "scheduling-create",
            SyncStep::SchedulingDelete => "scheduling-delete",
            SyncStep::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub dataset: String,
    pub name: String,
    pub step: SyncStep,
    pub message: String,
}

impl ItemFailure {
    pub fn new(
        dataset: impl Into<String>,
        name: impl Into<String>,
        step: SyncStep,
        message: impl Into<String>,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            name: name.into(),
            step,
            message: message.into(),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} [{}]: {}", self.dataset, self.name, self.step, self.message)
    }
}

/// Every per-item failure of one batch run (copy or prune).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationError {
    pub failures: Vec<ItemFailure>,
}

impl ReconciliationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, failure: ItemFailure) {
        self.failures.push(failure);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn failures(&self) -> &[ItemFailure] {
        &self.failures
    }

    /// Identities that failed, as `dataset.name`, in the order they were recorded.
    pub fn identities(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|f| format!("{}.{}", f.dataset, f.name))
            .collect()
    }

    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ReconciliationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} view operation(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for ReconciliationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_enumerates_failures() {
        let mut err = ReconciliationError::new();
        err.push(ItemFailure::new("sales", "revenue", SyncStep::Upsert, "quota exceeded"));
        err.push(ItemFailure::new("sales", "orders", SyncStep::SchedulingDelete, "forbidden"));

        let text = err.to_string();
        assert!(text.starts_with("2 view operation(s) failed"));
        assert!(text.contains("sales.revenue [upsert]: quota exceeded"));
        assert!(text.contains("sales.orders [scheduling-delete]: forbidden"));
    }

    #[test]
    fn test_into_result_empty_is_ok() {
        assert!(ReconciliationError::new().into_result().is_ok());
    }

    #[test]
    fn test_identities() {
        let mut err = ReconciliationError::new();
        err.push(ItemFailure::new("a", "b", SyncStep::Delete, "x"));
        assert_eq!(err.identities(), vec!["a.b".to_string()]);
        assert_eq!(err.len(), 1);
    }
}
