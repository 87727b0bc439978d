use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::task::Task;

pub const CACHE_FILE: &str = "tasks.json";

/// Durable mirror of the whole task list in a single JSON slot.
#[derive(Debug, Clone)]
pub struct LocalCache {
    pub data_dir: PathBuf,
    pub path: PathBuf,
}

impl LocalCache {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let path = data_dir.join(CACHE_FILE);

        info!(
            data_dir = %data_dir.display(),
            cache = %path.display(),
            "opened local cache"
        );

        Ok(Self { data_dir, path })
    }

    /// Returns `None` when nothing is stored or the payload does not parse.
    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> Option<Vec<Task>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(file = %self.path.display(), "no cached task list");
                return None;
            }
            Err(err) => {
                warn!(file = %self.path.display(), error = %err, "failed reading cache; ignoring it");
                return None;
            }
        };

        if raw.trim().is_empty() {
            return None;
        }

        match serde_json::from_str::<Vec<Task>>(&raw) {
            Ok(tasks) => {
                let tasks: Vec<Task> = tasks.into_iter().filter(|t| !t.id.is_empty()).collect();
                debug!(count = tasks.len(), "loaded tasks from cache");
                Some(tasks)
            }
            Err(err) => {
                warn!(file = %self.path.display(), error = %err, "cached task list is corrupt; ignoring it");
                None
            }
        }
    }

    /// Overwrites the slot with the full list.
    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub fn save(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_json_atomic(&self.path, tasks).context("failed to save tasks.json")
    }

    #[tracing::instrument(skip(self))]
    pub fn clear(&self) -> anyhow::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(file = %self.path.display(), "cleared local cache");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed removing {}", self.path.display()))
            }
        }
    }
}

#[tracing::instrument(skip(path, tasks))]
fn save_json_atomic(path: &Path, tasks: &[Task]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = tasks.len(), "saving cache atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    let serialized = serde_json::to_string(tasks)?;
    temp.write_all(serialized.as_bytes())?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;
    use crate::task::{Comment, Priority, TaskDraft};

    fn sample() -> Task {
        let mut task = Task::from_draft(
            "t1".to_string(),
            TaskDraft {
                area: "Hall".to_string(),
                description: "Paint wall".to_string(),
                status: "DOING".to_string(),
                priority: Priority::High,
                ..TaskDraft::default()
            },
        );
        task.comments.push(Comment {
            text: "primer done".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
        });
        task
    }

    #[test]
    fn missing_slot_loads_as_none() {
        let temp = tempdir().expect("tempdir");
        let cache = LocalCache::open(temp.path()).expect("open cache");
        assert!(cache.load().is_none());
    }

    #[test]
    fn save_then_load_returns_the_same_list() {
        let temp = tempdir().expect("tempdir");
        let cache = LocalCache::open(temp.path()).expect("open cache");
        cache.save(&[sample()]).expect("save");
        assert_eq!(cache.load(), Some(vec![sample()]));
    }

    #[test]
    fn corrupt_payload_is_treated_as_absent() {
        let temp = tempdir().expect("tempdir");
        let cache = LocalCache::open(temp.path()).expect("open cache");
        fs::write(&cache.path, "{not json").expect("write garbage");
        assert!(cache.load().is_none());
    }

    #[test]
    fn clear_removes_the_slot() {
        let temp = tempdir().expect("tempdir");
        let cache = LocalCache::open(temp.path()).expect("open cache");
        cache.save(&[sample()]).expect("save");
        cache.clear().expect("clear");
        assert!(cache.load().is_none());
        cache.clear().expect("clearing twice is fine");
    }
}
