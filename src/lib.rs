pub mod config;
pub mod diff;
pub mod error;
pub mod executor;
pub mod repository;
pub mod schedule;
pub mod sync;
pub mod template;
pub mod tester;
pub mod view;

pub use config::{Config, ConfigOverrides};
pub use error::{BqvError, ErrorKind, ItemFailure, ReconciliationError, Result, SyncStep};
pub use executor::{BqClient, QueryExecutor, QueryRunner, RowSource};
pub use repository::{BigQueryRepository, FileRepository, MemoryRepository, ViewReader, ViewRepository, ViewWriter};
pub use schedule::{JobHandle, ManifestScheduleDirectory, MemoryScheduleDirectory, ScheduleDirectory};
pub use sync::{ComparePolicy, CopyReport, DiffEntry, DiffKind, DiffReport, PruneReport, SyncOptions, ViewService};
pub use template::TemplateRenderer;
pub use tester::ViewTester;
pub use view::{View, ViewId, ViewKind, ViewSetting};
