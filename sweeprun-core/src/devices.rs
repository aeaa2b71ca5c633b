//! Accelerator visibility and threading configuration handed to the trainer.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Environment variable a batch scheduler uses to assign GPUs to a job.
pub const CUDA_VISIBLE_DEVICES: &str = "CUDA_VISIBLE_DEVICES";

/// Devices the trainer may use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub visible: Vec<String>,
    pub memory_growth: bool,
}

impl DeviceConfig {
    /// Resolve visible devices from the process environment.
    pub fn detect(gpu_requested: bool) -> Self {
        let env = std::env::var(CUDA_VISIBLE_DEVICES).ok();
        Self::from_env_value(gpu_requested, env.as_deref())
    }

    /// Resolve visible devices from a `CUDA_VISIBLE_DEVICES` value.
    ///
    /// Devices are hidden unless the GPU flag is set and the variable exists.
    pub fn from_env_value(gpu_requested: bool, value: Option<&str>) -> Self {
        let Some(value) = value.filter(|_| gpu_requested) else {
            warn!("No visible devices");
            return Self::default();
        };

        let visible: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != "-1")
            .map(String::from)
            .collect();

        if visible.is_empty() {
            info!("No GPU");
        } else {
            info!(devices = ?visible, "We have {} GPUs", visible.len());
        }

        Self {
            memory_growth: !visible.is_empty(),
            visible,
        }
    }

    pub fn count(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }
}

/// Intra/inter-op thread counts, set only when the scheduler pinned the CPU count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadConfig {
    pub intra_op: Option<usize>,
    pub inter_op: Option<usize>,
}

impl ThreadConfig {
    pub fn from_cpus(cpus_per_task: Option<usize>) -> Self {
        Self {
            intra_op: cpus_per_task,
            inter_op: cpus_per_task,
        }
    }
}
