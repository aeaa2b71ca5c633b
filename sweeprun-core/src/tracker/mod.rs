//! Experiment tracking: runs, metric logs and artifacts.
//!
//! A run is opened once per executed experiment, receives the hostname, the
//! per-epoch metrics and the final test metrics, and is closed with a status.
//! Backends are selected by [`TrackerMode`].

pub mod http;
pub mod local;

use crate::config::{TrackerConfig, TrackerMode};
use crate::error::HarnessError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub use http::HttpTracker;
pub use local::LocalTracker;

/// Everything needed to open a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSpec {
    pub project: String,
    pub name: String,
    /// Artifact base name of the experiment.
    pub notes: String,
    pub config: serde_json::Value,
}

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

/// A tracking backend.
#[async_trait]
pub trait ExperimentTracker: Send + Sync {
    async fn init(&self, spec: RunSpec) -> Result<Arc<dyn TrackerRun>, HarnessError>;
}

/// One open run. Shared between the runner and the metrics logger callback.
#[async_trait]
pub trait TrackerRun: Send + Sync {
    fn id(&self) -> &str;

    async fn log(
        &self,
        entry: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), HarnessError>;

    async fn log_artifact(&self, name: &str, path: &Path) -> Result<(), HarnessError>;

    async fn finish(&self, status: RunStatus) -> Result<(), HarnessError>;
}

/// Tracker that accepts and discards everything.
#[derive(Debug, Clone, Default)]
pub struct DisabledTracker;

struct DisabledRun;

#[async_trait]
impl ExperimentTracker for DisabledTracker {
    async fn init(&self, _spec: RunSpec) -> Result<Arc<dyn TrackerRun>, HarnessError> {
        Ok(Arc::new(DisabledRun))
    }
}

#[async_trait]
impl TrackerRun for DisabledRun {
    fn id(&self) -> &str {
        "disabled"
    }

    async fn log(
        &self,
        _entry: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), HarnessError> {
        Ok(())
    }

    async fn log_artifact(&self, _name: &str, _path: &Path) -> Result<(), HarnessError> {
        Ok(())
    }

    async fn finish(&self, _status: RunStatus) -> Result<(), HarnessError> {
        Ok(())
    }
}

/// Build the tracker selected by `config`.
pub fn from_config(config: &TrackerConfig) -> Result<Box<dyn ExperimentTracker>, HarnessError> {
    match config.mode {
        TrackerMode::Local => Ok(Box::new(LocalTracker::new(config.dir.clone()))),
        TrackerMode::Http => Ok(Box::new(HttpTracker::from_config(config)?)),
        TrackerMode::Disabled => Ok(Box::new(DisabledTracker)),
    }
}

/// Name of the machine running the experiment.
pub fn hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
