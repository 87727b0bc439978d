use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::{SheetBackend, check_api_key};
use crate::error::{SyncError, SyncResult};
use crate::sheet::{COLUMN_COUNT, COLUMN_RANGE, ID_COLUMN_RANGE};

/// A sheet tab held in process memory. Counts every request so callers can
/// assert on how much traffic an operation produced.
#[derive(Default)]
pub struct MemorySheet {
    rows: Mutex<Vec<Vec<String>>>,
    api_key: Mutex<Option<String>>,
    reads: AtomicUsize,
    updates: AtomicUsize,
    appends: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    write_gate: Mutex<Option<Arc<Notify>>>,
}

impl MemorySheet {
    pub fn new() -> Self {
        let sheet = Self::default();
        *sheet.api_key.lock() = Some("memory".to_string());
        sheet
    }

    pub fn with_api_key(self, api_key: Option<&str>) -> Self {
        *self.api_key.lock() = api_key.map(str::to_string);
        self
    }

    pub fn seed(&self, rows: Vec<Vec<String>>) {
        *self.rows.lock() = rows;
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        self.rows.lock().clone()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn appends(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Parks every subsequent write until the returned handle is notified.
    pub fn hold_writes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.write_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn release_writes(&self) {
        if let Some(gate) = self.write_gate.lock().take() {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    async fn before_write(&self) -> SyncResult<()> {
        let gate = self.write_gate.lock().clone();
        if let Some(gate) = gate {
            debug!("write parked on gate");
            gate.notified().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::Transport("injected write failure".to_string()));
        }
        Ok(())
    }
}

fn fit_row(mut row: Vec<String>) -> Vec<String> {
    row.truncate(COLUMN_COUNT);
    row
}

#[async_trait]
impl SheetBackend for MemorySheet {
    fn ensure_configured(&self) -> SyncResult<()> {
        check_api_key(self.api_key.lock().as_deref())
    }

    async fn read_range(&self, range: &str) -> SyncResult<Vec<Vec<String>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::Transport("injected read failure".to_string()));
        }

        let rows = self.rows.lock();
        match range {
            COLUMN_RANGE => Ok(rows.iter().cloned().map(fit_row).collect()),
            ID_COLUMN_RANGE => Ok(rows
                .iter()
                .map(|row| row.first().cloned().into_iter().collect())
                .collect()),
            other => Err(SyncError::Invalid(format!("unsupported range: {other}"))),
        }
    }

    async fn update_row(&self, row_number: usize, row: Vec<String>) -> SyncResult<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.before_write().await?;

        let mut rows = self.rows.lock();
        let idx = row_number
            .checked_sub(1)
            .ok_or_else(|| SyncError::Invalid("sheet rows are 1-based".to_string()))?;
        if idx >= rows.len() {
            rows.resize(idx + 1, vec![]);
        }
        rows[idx] = fit_row(row);
        Ok(())
    }

    async fn append_row(&self, row: Vec<String>) -> SyncResult<()> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        self.before_write().await?;

        self.rows.lock().push(fit_row(row));
        Ok(())
    }
}
