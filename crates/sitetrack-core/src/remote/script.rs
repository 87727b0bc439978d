use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{PushOutcome, TaskWriter};
use crate::error::{SyncError, SyncResult};
use crate::task::{Comment, Task, format_deadline};

/// Task as the script endpoint expects it; the description travels as `task`.
#[derive(Debug, Serialize)]
struct ScriptTask<'a> {
    id: &'a str,
    area: &'a str,
    task: &'a str,
    status: &'a str,
    deadline: String,
    priority: &'static str,
    notes: &'a str,
    completed: bool,
    comments: &'a [Comment],
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    action: &'static str,
    task: ScriptTask<'a>,
}

fn envelope(task: &Task) -> Envelope<'_> {
    Envelope {
        action: "updateTask",
        task: ScriptTask {
            id: &task.id,
            area: &task.area,
            task: &task.description,
            status: &task.status,
            deadline: format_deadline(task.deadline),
            priority: task.priority.as_str(),
            notes: &task.notes,
            completed: task.completed,
            comments: &task.comments,
        },
    }
}

/// Legacy push path: hand the whole task to a script endpoint that performs
/// its own upsert.
#[derive(Debug, Clone)]
pub struct ScriptWriter {
    url: String,
    http: reqwest::Client,
}

impl ScriptWriter {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed building HTTP client for script endpoint")?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }
}

#[async_trait]
impl TaskWriter for ScriptWriter {
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    async fn upsert(&self, task: &Task) -> SyncResult<PushOutcome> {
        if self.url.trim().is_empty() {
            return Err(SyncError::NotConfigured(
                "script endpoint URL not configured".to_string(),
            ));
        }

        let body = serde_json::to_string(&envelope(task))
            .map_err(|err| SyncError::Invalid(format!("failed encoding task: {err}")))?;
        let response = self
            .http
            .post(self.url.as_str())
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "script endpoint rejected task");
            return Err(SyncError::Http {
                status: status.as_u16(),
                body,
            });
        }

        info!("delivered task to script endpoint");
        Ok(PushOutcome::Delivered)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::task::{Priority, TaskDraft};

    #[test]
    fn envelope_uses_the_endpoint_field_names() {
        let mut task = Task::from_draft(
            "ph_1".to_string(),
            TaskDraft {
                area: "PRASADAM HALL".to_string(),
                description: "Finalize ceiling design".to_string(),
                status: "IN PROGRESS".to_string(),
                deadline: chrono::NaiveDate::from_ymd_opt(2025, 11, 30),
                priority: Priority::High,
                ..TaskDraft::default()
            },
        );
        task.completed = true;

        let value = serde_json::to_value(envelope(&task)).expect("encode");
        assert_eq!(
            value,
            json!({
                "action": "updateTask",
                "task": {
                    "id": "ph_1",
                    "area": "PRASADAM HALL",
                    "task": "Finalize ceiling design",
                    "status": "IN PROGRESS",
                    "deadline": "2025-11-30",
                    "priority": "high",
                    "notes": "",
                    "completed": true,
                    "comments": []
                }
            })
        );
    }

    #[tokio::test]
    async fn missing_url_is_not_configured() {
        let writer = ScriptWriter::new("", Duration::from_secs(1)).expect("writer");
        let task = Task::from_draft("t".to_string(), TaskDraft::default());
        assert!(matches!(
            writer.upsert(&task).await,
            Err(SyncError::NotConfigured(_))
        ));
    }
}
