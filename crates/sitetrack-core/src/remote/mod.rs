//! The remote tabular store and the two ways of pushing a task into it.

mod memory;
mod script;
mod sheets;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

pub use memory::MemorySheet;
pub use script::ScriptWriter;
pub use sheets::{DEFAULT_API_BASE, SheetsClient, SheetsSettings};

use crate::error::{SyncError, SyncResult};
use crate::sheet::{COLUMN_RANGE, ID_COLUMN_RANGE, find_row_number, task_to_row};
use crate::task::Task;

pub const PLACEHOLDER_API_KEY: &str = "YOUR_GOOGLE_API_KEY";

/// Rejects an absent or placeholder access key without touching the network.
pub fn check_api_key(api_key: Option<&str>) -> SyncResult<()> {
    match api_key.map(str::trim) {
        None | Some("") => Err(SyncError::NotConfigured("API key not configured".to_string())),
        Some(PLACEHOLDER_API_KEY) => Err(SyncError::NotConfigured(
            "API key is still the placeholder".to_string(),
        )),
        Some(_) => Ok(()),
    }
}

/// Read/write access to one sheet tab of a spreadsheet.
#[async_trait]
pub trait SheetBackend: Send + Sync {
    fn ensure_configured(&self) -> SyncResult<()>;

    /// Rows of `range` (e.g. `A:I`), header included. Missing trailing cells
    /// are simply absent from a row.
    async fn read_range(&self, range: &str) -> SyncResult<Vec<Vec<String>>>;

    /// Overwrites the 1-based sheet row `row_number`.
    async fn update_row(&self, row_number: usize, row: Vec<String>) -> SyncResult<()>;

    async fn append_row(&self, row: Vec<String>) -> SyncResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Updated { row: usize },
    Appended,
    /// Handed to the script endpoint; where it landed is not reported.
    Delivered,
}

#[async_trait]
pub trait TaskWriter: Send + Sync {
    async fn upsert(&self, task: &Task) -> SyncResult<PushOutcome>;
}

/// Direct upsert: look the id up in column A, then overwrite or append.
pub struct SheetWriter {
    backend: Arc<dyn SheetBackend>,
}

impl SheetWriter {
    pub fn new(backend: Arc<dyn SheetBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl TaskWriter for SheetWriter {
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    async fn upsert(&self, task: &Task) -> SyncResult<PushOutcome> {
        self.backend.ensure_configured()?;

        let row = task_to_row(task);
        let ids = self.backend.read_range(ID_COLUMN_RANGE).await?;
        debug!(rows = ids.len(), "read id column");

        match find_row_number(&ids, &task.id) {
            Some(row_number) => {
                self.backend.update_row(row_number, row).await?;
                info!(row = row_number, "updated existing sheet row");
                Ok(PushOutcome::Updated { row: row_number })
            }
            None => {
                self.backend.append_row(row).await?;
                info!(range = COLUMN_RANGE, "appended new sheet row");
                Ok(PushOutcome::Appended)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sheet::{header_row, task_from_row};
    use crate::task::TaskDraft;

    fn task(id: &str, description: &str) -> Task {
        Task::from_draft(
            id.to_string(),
            TaskDraft {
                area: "Hall".to_string(),
                description: description.to_string(),
                status: "DOING".to_string(),
                ..TaskDraft::default()
            },
        )
    }

    #[test]
    fn placeholder_and_missing_keys_are_rejected() {
        assert!(matches!(check_api_key(None), Err(SyncError::NotConfigured(_))));
        assert!(matches!(check_api_key(Some("  ")), Err(SyncError::NotConfigured(_))));
        assert!(matches!(
            check_api_key(Some(PLACEHOLDER_API_KEY)),
            Err(SyncError::NotConfigured(_))
        ));
        assert!(check_api_key(Some("AIza-real")).is_ok());
    }

    #[tokio::test]
    async fn new_ids_append_and_known_ids_update_in_place() {
        let sheet = Arc::new(MemorySheet::new());
        sheet.seed(vec![header_row()]);
        let writer = SheetWriter::new(sheet.clone());

        let outcome = writer.upsert(&task("t1", "Paint")).await.expect("append");
        assert_eq!(outcome, PushOutcome::Appended);

        let outcome = writer.upsert(&task("t1", "Paint twice")).await.expect("update");
        assert_eq!(outcome, PushOutcome::Updated { row: 2 });

        let rows = sheet.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            task_from_row(&rows[1]).map(|t| t.description),
            Some("Paint twice".to_string())
        );
        assert_eq!(sheet.appends(), 1);
        assert_eq!(sheet.updates(), 1);
        assert_eq!(sheet.reads(), 2);
    }

    #[tokio::test]
    async fn lookup_failure_aborts_without_writing() {
        let sheet = Arc::new(MemorySheet::new());
        sheet.seed(vec![header_row()]);
        sheet.fail_reads(true);
        let writer = SheetWriter::new(sheet.clone());

        let err = writer.upsert(&task("t1", "Paint")).await.expect_err("lookup fails");
        assert!(matches!(err, SyncError::Transport(_)));
        assert_eq!(sheet.appends() + sheet.updates(), 0);
    }
}
