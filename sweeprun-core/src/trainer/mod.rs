//! Training backends.
//!
//! The harness never builds or fits a model itself. A [`Trainer`] starts a
//! session with the external framework; the session streams
//! [`TrainerEvent`]s back and accepts a [`TrainerCommand`] after every epoch
//! so that stopping decisions stay with the harness callbacks.

pub mod process;

use crate::args::ExperimentArgs;
use crate::devices::{DeviceConfig, ThreadConfig};
use crate::error::HarnessError;
use crate::training::metrics::{EpochMetrics, Evaluation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use process::ProcessTrainer;

/// Job description handed to the trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerJob {
    pub args: ExperimentArgs,
    /// Sweep assignment selected by `exp_index`, if any.
    pub point: serde_json::Map<String, serde_json::Value>,
    /// Artifact base name.
    pub base: PathBuf,
    /// Where to save the trained model; `None` when saving is off.
    pub model_path: Option<PathBuf>,
    pub devices: DeviceConfig,
    pub threads: ThreadConfig,
}

/// Message from the trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrainerEvent {
    Dataset {
        #[serde(default)]
        n_tokens: Option<usize>,
        n_classes: usize,
    },
    Summary {
        text: String,
    },
    Epoch {
        epoch: usize,
        metrics: BTreeMap<String, f64>,
    },
    Evaluation(Evaluation),
    ModelSaved {
        path: PathBuf,
    },
    Log {
        message: String,
    },
    Done,
}

impl TrainerEvent {
    pub fn epoch_metrics(&self) -> Option<EpochMetrics> {
        match self {
            TrainerEvent::Epoch { epoch, metrics } => Some(EpochMetrics {
                epoch: *epoch,
                values: metrics.clone(),
            }),
            _ => None,
        }
    }
}

/// Reply to an `epoch` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum TrainerCommand {
    Continue,
    Stop { restore_epoch: Option<usize> },
}

/// A running training session.
#[async_trait]
pub trait TrainerSession: Send {
    /// Next event, or `None` once the trainer closed its output.
    async fn next_event(&mut self) -> Result<Option<TrainerEvent>, HarnessError>;

    async fn send(&mut self, command: TrainerCommand) -> Result<(), HarnessError>;

    /// Wait for the trainer to exit and surface its failure, if any.
    async fn finish(self: Box<Self>) -> Result<(), HarnessError>;
}

/// A training backend.
#[async_trait]
pub trait Trainer: Send + Sync {
    async fn start(&self, job: &TrainerJob) -> Result<Box<dyn TrainerSession>, HarnessError>;
}
