//! Persisted run results and the environment they were produced in.

use crate::args::ExperimentArgs;
use crate::error::HarnessError;
use crate::persistence::{atomic_write_json, load_json};
use crate::training::metrics::{Evaluation, TrainingHistory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Snapshot of the execution environment for reproducibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub hostname: String,
    pub platform: String,
    pub visible_devices: Vec<String>,
    pub harness_version: String,
    pub timestamp: DateTime<Utc>,
    /// Hash of accelerator and scheduler environment variables.
    pub env_vars_hash: String,
}

impl EnvironmentSnapshot {
    pub fn capture(visible_devices: &[String]) -> Self {
        Self {
            hostname: crate::tracker::hostname(),
            platform: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            visible_devices: visible_devices.to_vec(),
            harness_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            env_vars_hash: Self::compute_env_vars_hash(),
        }
    }

    fn compute_env_vars_hash() -> String {
        let mut hasher = Sha256::new();
        for var in &[
            "CUDA_VISIBLE_DEVICES",
            "SLURM_JOB_ID",
            "SLURM_ARRAY_TASK_ID",
            "SLURM_CPUS_PER_TASK",
        ] {
            let value = std::env::var(var).unwrap_or_default();
            hasher.update(var.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Everything written to `{base}_results.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResults {
    pub fname_base: PathBuf,
    /// Test-set evaluation values, loss first.
    pub predict_testing_eval: Option<Vec<f64>>,
    pub evaluation: Option<Evaluation>,
    pub history: TrainingHistory,
    pub stopped_epoch: Option<usize>,
    pub best_epoch: Option<usize>,
    pub n_classes: Option<usize>,
    pub n_tokens: Option<usize>,
    pub model_path: Option<PathBuf>,
    pub params: serde_json::Map<String, serde_json::Value>,
    pub args: ExperimentArgs,
    pub environment: EnvironmentSnapshot,
}

impl RunResults {
    pub fn save(&self, path: &Path) -> Result<(), HarnessError> {
        atomic_write_json(path, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        load_json(path)?
            .ok_or_else(|| HarnessError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )))
    }
}
