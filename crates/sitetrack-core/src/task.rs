use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{SyncError, SyncResult};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Case-insensitive; anything unrecognised (including empty) is `Medium`.
    pub fn parse_or_default(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Priority::Low,
            "high" => Priority::High,
            _ => Priority::Medium,
        }
    }

    pub fn parse_strict(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Some(Priority::Low),
            "medium" | "m" => Some(Priority::Medium),
            "high" | "h" => Some(Priority::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,

    #[serde(default)]
    pub area: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub status: String,

    #[serde(default, with = "deadline_serde")]
    pub deadline: Option<NaiveDate>,

    #[serde(default, deserialize_with = "lenient_priority")]
    pub priority: Priority,

    #[serde(default)]
    pub notes: String,

    #[serde(default)]
    pub completed: bool,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub comments: Vec<Comment>,
}

/// The user-editable part of a task, used for both create and edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub area: String,
    pub description: String,
    pub status: String,
    pub deadline: Option<NaiveDate>,
    pub priority: Priority,
    pub notes: String,
    pub completed: bool,
}

impl TaskDraft {
    pub fn from_task(task: &Task) -> Self {
        Self {
            area: task.area.clone(),
            description: task.description.clone(),
            status: task.status.clone(),
            deadline: task.deadline,
            priority: task.priority,
            notes: task.notes.clone(),
            completed: task.completed,
        }
    }

    /// Area, description, status and deadline are required.
    pub fn validate(&self) -> SyncResult<()> {
        let mut missing = Vec::new();
        if self.area.trim().is_empty() {
            missing.push("area");
        }
        if self.description.trim().is_empty() {
            missing.push("description");
        }
        if self.status.trim().is_empty() {
            missing.push("status");
        }
        if self.deadline.is_none() {
            missing.push("deadline");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Invalid(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )))
        }
    }
}

impl Task {
    pub fn from_draft(id: String, draft: TaskDraft) -> Self {
        Self {
            id,
            area: draft.area.trim().to_string(),
            description: draft.description.trim().to_string(),
            status: draft.status.trim().to_string(),
            deadline: draft.deadline,
            priority: draft.priority,
            notes: draft.notes.trim().to_string(),
            completed: draft.completed,
            comments: vec![],
        }
    }

    pub fn apply_draft(&mut self, draft: TaskDraft) {
        self.area = draft.area.trim().to_string();
        self.description = draft.description.trim().to_string();
        self.status = draft.status.trim().to_string();
        self.deadline = draft.deadline;
        self.priority = draft.priority;
        self.notes = draft.notes.trim().to_string();
        self.completed = draft.completed;
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.deadline.map(|d| d < today).unwrap_or(false)
    }
}

/// Timestamp-derived id for locally created tasks.
pub fn local_task_id(now: DateTime<Utc>) -> String {
    format!("task_{}", now.timestamp_millis())
}

/// Empty or malformed dates become `None`.
pub fn parse_deadline(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT).ok()
}

pub fn format_deadline(deadline: Option<NaiveDate>) -> String {
    deadline
        .map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Comment>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Comment>>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_priority<'de, D>(deserializer: D) -> Result<Priority, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .map(Priority::parse_or_default)
        .unwrap_or_default())
}

mod deadline_serde {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{format_deadline, parse_deadline};

    pub fn serialize<S>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_deadline(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse_deadline))
    }
}
