//! The in-memory task list and its reconciliation with the local cache and
//! the remote sheet.
//!
//! Local mutations commit to memory and the cache first; pushes are
//! best-effort and never roll a local change back. A pull replaces the whole
//! list with whatever the sheet holds (last write wins, no merge).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::cache::LocalCache;
use crate::error::{SyncError, SyncResult};
use crate::guard::{PushGuard, PushPermit, PushState};
use crate::notify::{Notice, NoticeKind, Notifier};
use crate::remote::{PushOutcome, SheetBackend, TaskWriter};
use crate::sheet::{COLUMN_RANGE, tasks_from_rows};
use crate::task::{Comment, Priority, Task, TaskDraft, local_task_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupSource {
    Cache,
    Remote,
    Sample,
}

pub struct Startup {
    pub source: StartupSource,
    /// Background refresh started when the list came from the cache.
    pub refresh: Option<JoinHandle<()>>,
}

impl Startup {
    /// Waits for the background refresh, if any. Anything that mutates the
    /// list must settle first, or the refresh can replace the list and cache
    /// under a change whose push has not landed yet.
    pub async fn settle(&mut self) {
        if let Some(refresh) = self.refresh.take()
            && let Err(err) = refresh.await
        {
            warn!(error = %err, "background refresh did not complete");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullReport {
    pub count: usize,
}

/// A push running on its own task. `None` when the guard rejected it.
pub struct BackgroundPush(Option<JoinHandle<SyncResult<PushOutcome>>>);

impl BackgroundPush {
    pub fn was_rejected(&self) -> bool {
        self.0.is_none()
    }

    pub async fn finish(self) -> SyncResult<PushOutcome> {
        match self.0 {
            None => Err(SyncError::Busy),
            Some(handle) => handle
                .await
                .map_err(|err| SyncError::Transport(format!("push task did not complete: {err}")))?,
        }
    }
}

pub struct SyncEngine {
    tasks: Mutex<Vec<Task>>,
    cache: LocalCache,
    backend: Arc<dyn SheetBackend>,
    writer: Arc<dyn TaskWriter>,
    guard: PushGuard,
    notifier: Arc<dyn Notifier>,
}

impl SyncEngine {
    pub fn new(
        cache: LocalCache,
        backend: Arc<dyn SheetBackend>,
        writer: Arc<dyn TaskWriter>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            tasks: Mutex::new(vec![]),
            cache,
            backend,
            writer,
            guard: PushGuard::new(),
            notifier,
        }
    }

    /// Empties the in-memory list. The cache is left alone.
    pub fn reset(&self) {
        self.tasks.lock().clear();
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().clone()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.tasks.lock().iter().find(|t| t.id == id).cloned()
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn push_state(&self) -> PushState {
        self.guard.state()
    }

    fn notify(&self, kind: NoticeKind, message: impl Into<String>) {
        self.notifier.notify(Notice::new(kind, message));
    }

    /// Applies `change` and rewrites the whole cache. A failed cache write
    /// restores the previous list.
    fn commit<T>(&self, change: impl FnOnce(&mut Vec<Task>) -> SyncResult<T>) -> SyncResult<T> {
        let mut tasks = self.tasks.lock();
        let before = tasks.clone();
        let out = change(&mut tasks)?;
        if let Err(err) = self.cache.save(&tasks) {
            warn!(error = %err, "cache write failed; rolling back in-memory change");
            *tasks = before;
            return Err(SyncError::Cache(format!("{err:#}")));
        }
        Ok(out)
    }

    fn with_task(
        &self,
        id: &str,
        change: impl FnOnce(&mut Task) -> SyncResult<()>,
    ) -> SyncResult<Task> {
        self.commit(|tasks| {
            let task = tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| SyncError::UnknownTask(id.to_string()))?;
            change(task)?;
            Ok(task.clone())
        })
    }

    #[instrument(skip(self, draft, now))]
    pub fn create(&self, draft: TaskDraft, now: DateTime<Utc>) -> SyncResult<Task> {
        draft.validate()?;
        self.commit(|tasks| {
            let mut stamp = now;
            let mut id = local_task_id(stamp);
            while tasks.iter().any(|t| t.id == id) {
                stamp += TimeDelta::milliseconds(1);
                id = local_task_id(stamp);
            }
            let task = Task::from_draft(id, draft);
            tasks.insert(0, task.clone());
            info!(task_id = %task.id, count = tasks.len(), "task created");
            Ok(task)
        })
    }

    #[instrument(skip(self, draft))]
    pub fn update(&self, id: &str, draft: TaskDraft) -> SyncResult<Task> {
        draft.validate()?;
        let task = self.with_task(id, |task| {
            task.apply_draft(draft);
            Ok(())
        })?;
        info!(task_id = %task.id, "task updated");
        Ok(task)
    }

    #[instrument(skip(self))]
    pub fn toggle(&self, id: &str) -> SyncResult<Task> {
        let task = self.with_task(id, |task| {
            task.completed = !task.completed;
            Ok(())
        })?;
        info!(task_id = %task.id, completed = task.completed, "completion toggled");
        Ok(task)
    }

    #[instrument(skip(self, text, now))]
    pub fn comment(&self, id: &str, text: &str, now: DateTime<Utc>) -> SyncResult<Task> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::Invalid("comment text is empty".to_string()));
        }
        let task = self.with_task(id, |task| {
            task.comments.push(Comment {
                text: text.to_string(),
                timestamp: now,
            });
            Ok(())
        })?;
        info!(task_id = %task.id, comments = task.comments.len(), "comment added");
        Ok(task)
    }

    fn begin_push(&self) -> SyncResult<PushPermit> {
        self.guard.try_begin().inspect_err(|_| {
            self.notify(
                NoticeKind::Busy,
                "Another save is still in progress; change kept locally",
            )
        })
    }

    /// Single-flight upsert of one task, awaited.
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn push(&self, task: &Task) -> SyncResult<PushOutcome> {
        let permit = self.begin_push()?;
        run_push(
            self.writer.clone(),
            self.notifier.clone(),
            task.clone(),
            permit,
        )
        .await
    }

    /// Fire-and-forget upsert. The guard is claimed before spawning, so a
    /// push issued while another is in flight is rejected right away.
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub fn push_in_background(&self, task: Task) -> BackgroundPush {
        match self.begin_push() {
            Ok(permit) => BackgroundPush(Some(tokio::spawn(run_push(
                self.writer.clone(),
                self.notifier.clone(),
                task,
                permit,
            )))),
            Err(_) => BackgroundPush(None),
        }
    }

    /// Create, then wait for the push. The local task stands either way.
    pub async fn create_and_push(
        &self,
        draft: TaskDraft,
        now: DateTime<Utc>,
    ) -> SyncResult<(Task, SyncResult<PushOutcome>)> {
        let task = self.create(draft, now)?;
        self.notify(NoticeKind::Success, format!("Saved task {}", task.id));
        let pushed = self.push(&task).await;
        Ok((task, pushed))
    }

    pub async fn update_and_push(
        &self,
        id: &str,
        draft: TaskDraft,
    ) -> SyncResult<(Task, SyncResult<PushOutcome>)> {
        let task = self.update(id, draft)?;
        self.notify(NoticeKind::Success, format!("Saved task {}", task.id));
        let pushed = self.push(&task).await;
        Ok((task, pushed))
    }

    pub fn toggle_and_push(&self, id: &str) -> SyncResult<(Task, BackgroundPush)> {
        let task = self.toggle(id)?;
        let message = if task.completed { "Completed!" } else { "Reopened" };
        self.notify(NoticeKind::Success, message);
        let push = self.push_in_background(task.clone());
        Ok((task, push))
    }

    pub fn comment_and_push(
        &self,
        id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> SyncResult<(Task, BackgroundPush)> {
        let task = self.comment(id, text, now)?;
        self.notify(NoticeKind::Success, "Comment added");
        let push = self.push_in_background(task.clone());
        Ok((task, push))
    }

    /// Replaces the whole list with the sheet's rows and rewrites the cache.
    /// On any failure the list and cache are left as they were.
    #[instrument(skip(self))]
    pub async fn pull(&self) -> SyncResult<PullReport> {
        self.backend.ensure_configured()?;

        let rows = self.backend.read_range(COLUMN_RANGE).await?;
        let tasks = tasks_from_rows(&rows)?;
        self.cache
            .save(&tasks)
            .map_err(|err| SyncError::Cache(format!("{err:#}")))?;

        let count = tasks.len();
        *self.tasks.lock() = tasks;
        info!(count, "replaced task list from sheet");
        Ok(PullReport { count })
    }

    /// Manual sync: pull and tell the user how it went.
    pub async fn sync(&self) -> SyncResult<PullReport> {
        self.notify(NoticeKind::Info, "Syncing...");
        match self.pull().await {
            Ok(report) => {
                self.notify(
                    NoticeKind::Success,
                    format!("Synced {} task(s) from sheet", report.count),
                );
                Ok(report)
            }
            Err(err) => {
                self.notify(NoticeKind::Failure, format!("Sync failed: {err}"));
                Err(err)
            }
        }
    }

    /// Pull on its own task; failures are logged and otherwise ignored.
    pub fn spawn_background_pull(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            match engine.pull().await {
                Ok(report) => debug!(count = report.count, "background sync finished"),
                Err(err) => warn!(error = %err, "background sync failed"),
            }
        })
    }

    /// Cache first with a background refresh; otherwise pull, falling back to
    /// the built-in sample list so there is always something to show.
    #[instrument(skip(self))]
    pub async fn start(self: &Arc<Self>) -> Startup {
        if let Some(cached) = self.cache.load() {
            info!(count = cached.len(), "starting from local cache");
            *self.tasks.lock() = cached;
            return Startup {
                source: StartupSource::Cache,
                refresh: Some(self.spawn_background_pull()),
            };
        }

        match self.pull().await {
            Ok(report) => {
                self.notify(
                    NoticeKind::Success,
                    format!("Synced {} task(s) from sheet", report.count),
                );
                Startup {
                    source: StartupSource::Remote,
                    refresh: None,
                }
            }
            Err(err) => {
                warn!(error = %err, "initial pull failed; using sample data");
                self.notify(NoticeKind::Info, "Loading sample data");
                let sample = sample_tasks();
                if let Err(err) = self.cache.save(&sample) {
                    warn!(error = %err, "failed caching sample data");
                }
                *self.tasks.lock() = sample;
                Startup {
                    source: StartupSource::Sample,
                    refresh: None,
                }
            }
        }
    }

    /// Pulls every `period` until the handle is aborted. Failures are
    /// reported and the timer keeps running.
    pub fn spawn_auto_sync(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                debug!(period_secs = period.as_secs(), "auto sync tick");
                let _ = engine.sync().await;
            }
        })
    }
}

async fn run_push(
    writer: Arc<dyn TaskWriter>,
    notifier: Arc<dyn Notifier>,
    task: Task,
    permit: PushPermit,
) -> SyncResult<PushOutcome> {
    let result = writer.upsert(&task).await;
    drop(permit);

    match &result {
        Ok(outcome) => {
            debug!(task_id = %task.id, ?outcome, "push finished");
            notifier.notify(Notice::new(NoticeKind::Success, "Saved to sheet"));
        }
        Err(err) => {
            warn!(task_id = %task.id, error = %err, "push failed; change kept locally");
            notifier.notify(Notice::new(
                NoticeKind::Failure,
                format!("Could not save to sheet: {err}"),
            ));
        }
    }
    result
}

/// Built-in list shown when there is neither a cache nor a reachable sheet.
pub fn sample_tasks() -> Vec<Task> {
    let rows: [(&str, &str, &str, &str, (i32, u32, u32), Priority); 6] = [
        (
            "ph_1",
            "PRASADAM HALL",
            "Finalize ceiling design",
            "IN PROGRESS",
            (2025, 11, 30),
            Priority::High,
        ),
        (
            "ph_2",
            "PRASADAM HALL",
            "Choose floor tiles",
            "PENDING",
            (2025, 11, 25),
            Priority::High,
        ),
        (
            "ta_1",
            "TEMPLE AREA",
            "Electrical wiring",
            "PLANNED",
            (2025, 12, 1),
            Priority::High,
        ),
        (
            "ta_2",
            "TEMPLE AREA",
            "Install boards",
            "PLANNED",
            (2025, 12, 3),
            Priority::High,
        ),
        (
            "ab_1",
            "ASHRAM AREA",
            "Window installation",
            "COMPLETED",
            (2025, 11, 20),
            Priority::Medium,
        ),
        (
            "st_1",
            "STP & TOILET",
            "Monitor toilet",
            "ALL CLEAR",
            (2025, 12, 1),
            Priority::Low,
        ),
    ];

    rows.into_iter()
        .map(|(id, area, description, status, (y, m, d), priority)| {
            Task::from_draft(
                id.to_string(),
                TaskDraft {
                    area: area.to_string(),
                    description: description.to_string(),
                    status: status.to_string(),
                    deadline: NaiveDate::from_ymd_opt(y, m, d),
                    priority,
                    notes: String::new(),
                    completed: false,
                },
            )
        })
        .collect()
}
