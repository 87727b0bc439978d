//! Positional mapping between sheet rows and tasks.
//!
//! Columns A..I: id, area, description, status, deadline, priority, notes,
//! completed flag, comments blob (JSON array).

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{SyncError, SyncResult};
use crate::task::{Comment, DATE_FORMAT, Priority, Task, format_deadline, parse_deadline};

pub const COLUMN_RANGE: &str = "A:I";
pub const ID_COLUMN_RANGE: &str = "A:A";
pub const COLUMN_COUNT: usize = 9;

pub const HEADER_ROW: [&str; COLUMN_COUNT] = [
    "ID",
    "Area",
    "Task",
    "Status",
    "Deadline",
    "Priority",
    "Notes",
    "Completed",
    "Comments",
];

pub fn header_row() -> Vec<String> {
    HEADER_ROW.iter().map(|s| s.to_string()).collect()
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

/// Maps one data row to a task. Rows with an empty id yield `None`.
pub fn task_from_row(row: &[String]) -> Option<Task> {
    let id = cell(row, 0).trim();
    if id.is_empty() {
        return None;
    }

    Some(Task {
        id: id.to_string(),
        area: cell(row, 1).to_string(),
        description: cell(row, 2).to_string(),
        status: cell(row, 3).to_string(),
        deadline: parse_deadline(cell(row, 4)),
        priority: Priority::parse_or_default(cell(row, 5)),
        notes: cell(row, 6).to_string(),
        completed: cell(row, 7) == "TRUE",
        comments: parse_comments(cell(row, 8)),
    })
}

/// Skips the header row and drops rows without an id.
#[tracing::instrument(skip(rows), fields(rows = rows.len()))]
pub fn tasks_from_rows(rows: &[Vec<String>]) -> SyncResult<Vec<Task>> {
    if rows.len() < 2 {
        return Err(SyncError::NoData);
    }

    let tasks: Vec<Task> = rows[1..]
        .iter()
        .filter_map(|row| task_from_row(row))
        .collect();

    debug!(
        data_rows = rows.len() - 1,
        kept = tasks.len(),
        "decoded sheet rows"
    );
    Ok(tasks)
}

pub fn task_to_row(task: &Task) -> Vec<String> {
    vec![
        task.id.clone(),
        task.area.clone(),
        task.description.clone(),
        task.status.clone(),
        format_deadline(task.deadline),
        task.priority.as_str().to_ascii_uppercase(),
        task.notes.clone(),
        if task.completed { "TRUE" } else { "FALSE" }.to_string(),
        encode_comments(&task.comments),
    ]
}

/// Malformed blobs and malformed entries degrade to nothing.
pub fn parse_comments(raw: &str) -> Vec<Comment> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return vec![];
    }

    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) else {
        trace!(blob = %trimmed, "comments cell is not a JSON array");
        return vec![];
    };

    let total = items.len();
    let comments: Vec<Comment> = items.into_iter().filter_map(comment_from_value).collect();
    if comments.len() < total {
        warn!(
            dropped = total - comments.len(),
            kept = comments.len(),
            "comment entries without text or a readable timestamp were dropped"
        );
    }
    comments
}

/// Accepts RFC 3339 timestamps and, failing that, zone-less
/// `YYYY-MM-DD[ T]HH:MM[:SS]` or a bare date, read as UTC.
fn comment_from_value(item: Value) -> Option<Comment> {
    if let Ok(comment) = serde_json::from_value::<Comment>(item.clone()) {
        return Some(comment);
    }

    let text = item.get("text")?.as_str()?;
    let raw = item.get("timestamp")?.as_str()?.trim();
    let timestamp = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?
        .and_utc();

    Some(Comment {
        text: text.to_string(),
        timestamp,
    })
}

pub fn encode_comments(comments: &[Comment]) -> String {
    serde_json::to_string(comments).unwrap_or_else(|_| "[]".to_string())
}

/// 1-based sheet row holding `id`, ignoring the header row. Id cells are
/// compared trimmed, the same way rows are decoded.
pub fn find_row_number(id_column: &[Vec<String>], id: &str) -> Option<usize> {
    let id = id.trim();
    id_column
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, row)| cell(row, 0).trim() == id)
        .map(|(idx, _)| idx + 1)
}
