use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use pretty_assertions::assert_eq;
use sitetrack_core::cache::LocalCache;
use sitetrack_core::engine::{StartupSource, SyncEngine, sample_tasks};
use sitetrack_core::error::SyncError;
use sitetrack_core::guard::PushState;
use sitetrack_core::notify::{NoticeKind, RecordingNotifier};
use sitetrack_core::remote::{MemorySheet, PLACEHOLDER_API_KEY, PushOutcome, SheetWriter};
use sitetrack_core::sheet::{header_row, task_to_row};
use sitetrack_core::task::{Comment, Priority, Task, TaskDraft};
use tempfile::{TempDir, tempdir};

struct Harness {
    _dir: TempDir,
    engine: Arc<SyncEngine>,
    sheet: Arc<MemorySheet>,
    notices: Arc<RecordingNotifier>,
}

fn harness_with(sheet: MemorySheet) -> Harness {
    let dir = tempdir().expect("tempdir");
    let cache = LocalCache::open(dir.path()).expect("open cache");
    let sheet = Arc::new(sheet);
    let notices = Arc::new(RecordingNotifier::new());
    let engine = Arc::new(SyncEngine::new(
        cache,
        sheet.clone(),
        Arc::new(SheetWriter::new(sheet.clone())),
        notices.clone(),
    ));
    Harness {
        _dir: dir,
        engine,
        sheet,
        notices,
    }
}

fn harness() -> Harness {
    harness_with(MemorySheet::new())
}

fn seed(sheet: &MemorySheet, tasks: &[Task]) {
    let mut rows = vec![header_row()];
    rows.extend(tasks.iter().map(task_to_row));
    sheet.seed(rows);
}

fn at(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().expect("timestamp")
}

fn draft(description: &str) -> TaskDraft {
    TaskDraft {
        area: "TEMPLE AREA".to_string(),
        description: description.to_string(),
        status: "PLANNED".to_string(),
        deadline: NaiveDate::from_ymd_opt(2025, 12, 10),
        priority: Priority::High,
        notes: "east wall".to_string(),
        completed: false,
    }
}

#[tokio::test]
async fn pulling_twice_is_idempotent() {
    let h = harness();
    seed(&h.sheet, &sample_tasks());

    let first = h.engine.pull().await.expect("first pull");
    let after_first = h.engine.tasks();
    let second = h.engine.pull().await.expect("second pull");

    assert_eq!(first.count, 6);
    assert_eq!(second.count, 6);
    assert_eq!(h.engine.tasks(), after_first);
    assert_eq!(after_first, sample_tasks());
    assert_eq!(h.engine.cache().load(), Some(after_first));
}

#[tokio::test]
async fn pull_of_header_only_sheet_leaves_list_alone() {
    let h = harness();
    seed(&h.sheet, &sample_tasks());
    h.engine.pull().await.expect("pull");

    h.sheet.seed(vec![header_row()]);
    let err = h.engine.pull().await.expect_err("no data");
    assert!(matches!(err, SyncError::NoData));
    assert_eq!(h.engine.tasks().len(), 6);
}

#[tokio::test]
async fn created_task_round_trips_through_the_sheet() {
    let h = harness();
    h.sheet.seed(vec![header_row()]);

    let (created, pushed) = h
        .engine
        .create_and_push(draft("Electrical wiring"), at(1_764_000_000_000))
        .await
        .expect("create");
    assert_eq!(pushed.expect("push"), PushOutcome::Appended);
    assert_eq!(created.id, "task_1764000000000");

    let (commented, push) = h
        .engine
        .comment_and_push(&created.id, "cables ordered", at(1_764_000_100_123))
        .expect("comment");
    assert_eq!(push.finish().await.expect("push"), PushOutcome::Updated { row: 2 });

    h.engine.reset();
    h.engine.pull().await.expect("pull");
    assert_eq!(h.engine.tasks(), vec![commented]);
}

#[tokio::test]
async fn new_tasks_go_to_the_front_with_unique_ids() {
    let h = harness();
    h.sheet.seed(vec![header_row()]);
    let now = at(1_764_000_000_000);

    let a = h.engine.create(draft("First"), now).expect("first");
    let b = h.engine.create(draft("Second"), now).expect("second");

    assert_ne!(a.id, b.id);
    let ids: Vec<String> = h.engine.tasks().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![b.id, a.id]);
}

#[tokio::test]
async fn invalid_drafts_are_rejected_before_anything_changes() {
    let h = harness();
    let mut bad = draft("Paint");
    bad.status = "   ".to_string();
    bad.deadline = None;

    let err = h.engine.create(bad, Utc::now()).expect_err("invalid");
    assert_eq!(
        err.to_string(),
        "missing required field(s): status, deadline"
    );
    assert!(h.engine.tasks().is_empty());
    assert_eq!(h.engine.cache().load(), None);
}

#[tokio::test]
async fn second_push_while_one_is_in_flight_is_rejected() {
    let h = harness();
    seed(&h.sheet, &sample_tasks());
    h.engine.pull().await.expect("pull");

    let _gate = h.sheet.hold_writes();
    let tasks = h.engine.tasks();
    let first = h.engine.push_in_background(tasks[0].clone());
    assert!(!first.was_rejected());

    while h.sheet.updates() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.engine.push_state(), PushState::Pushing);

    let second = h.engine.push_in_background(tasks[1].clone());
    assert!(second.was_rejected());
    assert!(matches!(
        h.engine.push(&tasks[1]).await,
        Err(SyncError::Busy)
    ));
    assert_eq!(h.notices.count(NoticeKind::Busy), 2);

    h.sheet.release_writes();
    assert_eq!(
        first.finish().await.expect("first push"),
        PushOutcome::Updated { row: 2 }
    );
    assert_eq!(h.sheet.updates() + h.sheet.appends(), 1);
    assert_eq!(h.engine.push_state(), PushState::Idle);
}

#[tokio::test]
async fn toggling_writes_true_to_the_existing_row_once() {
    let h = harness();
    seed(&h.sheet, &sample_tasks());
    let startup = h.engine.start().await;
    assert_eq!(startup.source, StartupSource::Remote);

    let (task, push) = h.engine.toggle_and_push("ph_1").expect("toggle");
    assert!(task.completed);
    assert_eq!(push.finish().await.expect("push"), PushOutcome::Updated { row: 2 });

    let rows = h.sheet.rows();
    assert_eq!(rows[1][0], "ph_1");
    assert_eq!(rows[1][7], "TRUE");
    assert_eq!(h.sheet.updates(), 1);
    assert_eq!(h.sheet.appends(), 0);
    assert!(
        h.notices
            .notices()
            .iter()
            .any(|n| n.kind == NoticeKind::Success && n.message == "Completed!")
    );
}

#[tokio::test]
async fn failed_push_keeps_the_local_change() {
    let h = harness();
    h.sheet.seed(vec![header_row()]);
    h.sheet.fail_writes(true);

    let (task, pushed) = h
        .engine
        .create_and_push(draft("Window frames"), Utc::now())
        .await
        .expect("create");

    assert!(matches!(pushed, Err(SyncError::Transport(_))));
    assert_eq!(h.engine.task(&task.id), Some(task.clone()));
    assert_eq!(h.engine.cache().load(), Some(vec![task]));
    assert_eq!(h.notices.count(NoticeKind::Failure), 1);
    assert_eq!(h.engine.push_state(), PushState::Idle);
}

#[tokio::test]
async fn unknown_ids_are_reported() {
    let h = harness();
    assert!(matches!(
        h.engine.toggle("nope"),
        Err(SyncError::UnknownTask(id)) if id == "nope"
    ));
}

#[tokio::test]
async fn corrupt_cache_falls_back_to_a_remote_pull() {
    let h = harness();
    seed(&h.sheet, &sample_tasks()[..2]);
    std::fs::write(&h.engine.cache().path, "not json").expect("write cache");

    let startup = h.engine.start().await;

    assert_eq!(startup.source, StartupSource::Remote);
    assert!(startup.refresh.is_none());
    assert_eq!(h.engine.tasks(), sample_tasks()[..2].to_vec());
    assert_eq!(h.sheet.reads(), 1);
}

#[tokio::test]
async fn cached_list_shows_first_and_is_then_refreshed() {
    let h = harness();
    let cached = vec![sample_tasks().remove(5)];
    h.engine.cache().save(&cached).expect("seed cache");
    seed(&h.sheet, &sample_tasks());

    let startup = h.engine.start().await;
    assert_eq!(startup.source, StartupSource::Cache);
    assert_eq!(h.engine.tasks(), cached);

    startup
        .refresh
        .expect("refresh handle")
        .await
        .expect("refresh task");
    assert_eq!(h.engine.tasks(), sample_tasks());
}

#[tokio::test]
async fn add_after_cached_start_survives_a_failed_push() {
    let h = harness();
    h.engine.cache().save(&sample_tasks()).expect("seed cache");
    seed(&h.sheet, &sample_tasks());
    h.sheet.fail_writes(true);

    let mut startup = h.engine.start().await;
    assert_eq!(startup.source, StartupSource::Cache);
    startup.settle().await;
    assert!(startup.refresh.is_none());
    assert_eq!(h.sheet.reads(), 1);

    let (task, pushed) = h
        .engine
        .create_and_push(draft("Scaffolding"), Utc::now())
        .await
        .expect("create");

    assert!(matches!(pushed, Err(SyncError::Transport(_))));
    assert_eq!(h.engine.tasks().len(), 7);
    assert_eq!(h.engine.task(&task.id), Some(task.clone()));
    let cached = h.engine.cache().load().expect("cache");
    assert_eq!(cached.first(), Some(&task));
    assert_eq!(cached.len(), 7);
    assert_eq!(h.sheet.rows().len(), 7);
}

#[tokio::test]
async fn padded_sheet_ids_update_in_place() {
    let h = harness();
    seed(&h.sheet, &sample_tasks());
    let mut rows = h.sheet.rows();
    rows[1][0] = "ph_1 ".to_string();
    h.sheet.seed(rows);

    h.engine.pull().await.expect("pull");
    assert!(h.engine.task("ph_1").is_some());

    let (_, push) = h.engine.toggle_and_push("ph_1").expect("toggle");
    assert_eq!(push.finish().await.expect("push"), PushOutcome::Updated { row: 2 });
    assert_eq!(h.sheet.rows().len(), 7);
    assert_eq!(h.sheet.appends(), 0);
    assert_eq!(h.sheet.rows()[1][7], "TRUE");
}

#[tokio::test]
async fn unreadable_comment_blob_spoils_only_its_own_row() {
    let h = harness();
    let mut tasks = sample_tasks();
    tasks[1].comments.push(Comment {
        text: "tiles shortlisted".to_string(),
        timestamp: at(1_764_000_000_000),
    });
    seed(&h.sheet, &tasks);
    let mut rows = h.sheet.rows();
    rows[3][8] = "not-json".to_string();
    h.sheet.seed(rows);

    let report = h.engine.pull().await.expect("pull");

    assert_eq!(report.count, 6);
    let pulled = h.engine.tasks();
    assert_eq!(pulled[2].id, "ta_1");
    assert!(pulled[2].comments.is_empty());
    assert_eq!(pulled[1].comments, tasks[1].comments);
    assert_eq!(pulled, tasks);
}

#[tokio::test]
async fn placeholder_key_never_reaches_the_network() {
    let h = harness_with(MemorySheet::new().with_api_key(Some(PLACEHOLDER_API_KEY)));
    seed(&h.sheet, &sample_tasks());

    let err = h.engine.pull().await.expect_err("not configured");
    assert!(matches!(err, SyncError::NotConfigured(_)));

    let startup = h.engine.start().await;
    assert_eq!(startup.source, StartupSource::Sample);
    assert_eq!(h.engine.tasks(), sample_tasks());
    assert_eq!(h.engine.cache().load(), Some(sample_tasks()));
    assert_eq!(h.sheet.reads(), 0);
    assert!(
        h.notices
            .notices()
            .iter()
            .any(|n| n.message == "Loading sample data")
    );
}

#[tokio::test(start_paused = true)]
async fn auto_sync_keeps_ticking_after_failures() {
    let h = harness();
    seed(&h.sheet, &sample_tasks());
    h.sheet.fail_reads(true);

    let ticker = h.engine.spawn_auto_sync(Duration::from_secs(300));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.sheet.reads(), 0);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.sheet.reads(), 1);
    assert!(h.engine.tasks().is_empty());
    assert_eq!(h.notices.count(NoticeKind::Failure), 1);

    h.sheet.fail_reads(false);
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.sheet.reads(), 2);
    assert_eq!(h.engine.tasks().len(), 6);

    ticker.abort();
}
