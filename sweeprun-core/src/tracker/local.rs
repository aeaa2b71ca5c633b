//! Local experiment tracker.
//!
//! Layout per run: `<dir>/<project>/<run-id>/` holding `run.json` (spec,
//! status, summary of the latest logged values), `events.jsonl` (one line per
//! `log` call) and `artifacts/` (copies of logged files).

use super::{ExperimentTracker, RunSpec, RunStatus, TrackerRun};
use crate::error::HarnessError;
use crate::persistence::atomic_write_json;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Contents of `run.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub spec: RunSpec,
    pub status: RunStatus,
    pub summary: serde_json::Map<String, serde_json::Value>,
    pub artifacts: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// One line of `events.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub step: usize,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Map<String, serde_json::Value>,
}

pub struct LocalTracker {
    base_dir: PathBuf,
}

impl LocalTracker {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }
}

#[async_trait]
impl ExperimentTracker for LocalTracker {
    async fn init(&self, spec: RunSpec) -> Result<Arc<dyn TrackerRun>, HarnessError> {
        let id = uuid::Uuid::new_v4().to_string();
        let dir = self.base_dir.join(&spec.project).join(&id);
        tokio::fs::create_dir_all(dir.join("artifacts")).await?;

        let record = RunRecord {
            id: id.clone(),
            spec,
            status: RunStatus::Running,
            summary: serde_json::Map::new(),
            artifacts: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
        };
        atomic_write_json(&dir.join("run.json"), &record)?;
        tracing::info!(run_id = %id, dir = %dir.display(), "Tracking run locally");

        Ok(Arc::new(LocalRun {
            id,
            dir,
            state: Mutex::new(LocalRunState { record, step: 0 }),
        }))
    }
}

struct LocalRunState {
    record: RunRecord,
    step: usize,
}

struct LocalRun {
    id: String,
    dir: PathBuf,
    state: Mutex<LocalRunState>,
}

#[async_trait]
impl TrackerRun for LocalRun {
    fn id(&self) -> &str {
        &self.id
    }

    async fn log(
        &self,
        entry: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), HarnessError> {
        let mut state = self.state.lock().await;
        let event = RunEvent {
            step: state.step,
            timestamp: Utc::now(),
            data: entry,
        };
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join("events.jsonl"))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        state.step += 1;
        for (key, value) in event.data {
            state.record.summary.insert(key, value);
        }
        Ok(())
    }

    async fn log_artifact(&self, name: &str, path: &Path) -> Result<(), HarnessError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| name.to_string());
        tokio::fs::copy(path, self.dir.join("artifacts").join(&file_name)).await?;

        let mut state = self.state.lock().await;
        state.record.artifacts.push(name.to_string());
        atomic_write_json(&self.dir.join("run.json"), &state.record)?;
        Ok(())
    }

    async fn finish(&self, status: RunStatus) -> Result<(), HarnessError> {
        let mut state = self.state.lock().await;
        state.record.status = status;
        state.record.finished_at = Some(Utc::now());
        atomic_write_json(&self.dir.join("run.json"), &state.record)?;
        Ok(())
    }
}
