//! Experiment arguments: everything one run of the driver is parameterized by.
//!
//! The same record is validated, rewritten by the sweep point selected with
//! `exp_index`, forwarded to the trainer and logged as the tracker config, so
//! it is kept serde-friendly and free of CLI concerns.

use crate::error::HarnessError;
use crate::experiment_type::ExperimentType;
use crate::sweep::{HyperparameterSpace, JobIterator, JobPoint};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Arguments for a single experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentArgs {
    // Experiment
    pub exp_type: ExperimentType,
    pub exp_index: Option<usize>,
    pub label: Option<String>,
    pub project: String,
    pub rotation: usize,
    pub fold: usize,
    pub results_path: PathBuf,
    pub dataset: PathBuf,

    // Data pipeline
    pub batch: usize,
    pub prefetch: usize,
    pub shuffle: usize,
    pub repeat: bool,
    pub cache: Option<PathBuf>,
    pub precache: Option<PathBuf>,

    // Network
    pub rnn_layers: Vec<usize>,
    pub dense_layers: Vec<usize>,
    pub rnn_activation: String,
    pub dense_activation: String,
    pub return_sequences: bool,
    pub unroll: bool,
    pub dropout: Option<f64>,
    pub spatial_dropout: Option<f64>,
    pub l1_regularization: Option<f64>,
    pub l2_regularization: Option<f64>,
    pub batch_normalization: bool,
    pub grad_clip: Option<f64>,
    pub lrate: f64,

    // Training
    pub epochs: usize,
    pub steps_per_epoch: Option<usize>,
    pub patience: usize,
    pub min_delta: f64,
    pub monitor: String,

    // Control
    pub verbose: u8,
    pub render: bool,
    pub nogo: bool,
    pub force: bool,
    pub save_model: bool,
    pub check: bool,
    pub gpu: bool,
    pub cpus_per_task: Option<usize>,
}

impl Default for ExperimentArgs {
    fn default() -> Self {
        Self {
            exp_type: ExperimentType::Rnn,
            exp_index: None,
            label: None,
            project: "sweeprun".to_string(),
            rotation: 0,
            fold: 0,
            results_path: PathBuf::from("./results"),
            dataset: PathBuf::from("./data"),
            batch: 32,
            prefetch: 2,
            shuffle: 0,
            repeat: false,
            cache: None,
            precache: None,
            rnn_layers: Vec::new(),
            dense_layers: Vec::new(),
            rnn_activation: "tanh".to_string(),
            dense_activation: "elu".to_string(),
            return_sequences: false,
            unroll: false,
            dropout: None,
            spatial_dropout: None,
            l1_regularization: None,
            l2_regularization: None,
            batch_normalization: false,
            grad_clip: None,
            lrate: 0.001,
            epochs: 100,
            steps_per_epoch: None,
            patience: 10,
            min_delta: 0.0,
            monitor: "val_loss".to_string(),
            verbose: 0,
            render: false,
            nogo: false,
            force: false,
            save_model: false,
            check: false,
            gpu: false,
            cpus_per_task: None,
        }
    }
}

fn check_open_unit(name: &str, value: Option<f64>) -> Result<(), HarnessError> {
    match value {
        Some(v) if !(v > 0.0 && v < 1.0) => Err(HarnessError::invalid_argument(format!(
            "{name} must be between 0 and 1 (got {v})"
        ))),
        _ => Ok(()),
    }
}

impl ExperimentArgs {
    /// Reject argument combinations that cannot describe a sane run.
    pub fn validate(&self) -> Result<(), HarnessError> {
        check_open_unit("spatial_dropout", self.spatial_dropout)?;
        check_open_unit("lrate", Some(self.lrate))?;
        check_open_unit("l1_regularization", self.l1_regularization)?;
        check_open_unit("l2_regularization", self.l2_regularization)?;
        if let Some(cpus) = self.cpus_per_task {
            if cpus <= 1 {
                return Err(HarnessError::invalid_argument(format!(
                    "cpus_per_task must be greater than 1 (got {cpus})"
                )));
            }
        }
        Ok(())
    }

    /// Overwrite the fields named by `point` with its values.
    pub fn apply_point(&mut self, point: &JobPoint) -> Result<(), HarnessError> {
        let mut value = serde_json::to_value(&*self)?;
        let fields = value
            .as_object_mut()
            .ok_or_else(|| HarnessError::invalid_argument("arguments are not a record"))?;

        for (name, param) in &point.assignments {
            if !fields.contains_key(name) {
                return Err(HarnessError::UnknownParameter(name.clone()));
            }
            fields.insert(name.clone(), param.to_json());
        }

        *self = serde_json::from_value(value).map_err(|e| {
            HarnessError::invalid_argument(format!("cannot apply {point}: {e}"))
        })?;
        Ok(())
    }

    /// Select the sweep point for `exp_index` and apply it.
    ///
    /// Returns `None` (leaving the arguments untouched) when no index was given.
    pub fn augment(
        &mut self,
        space: &HyperparameterSpace,
    ) -> Result<Option<JobPoint>, HarnessError> {
        let Some(index) = self.exp_index else {
            return Ok(None);
        };

        let ji = JobIterator::new(space.clone())?;
        info!(total_jobs = ji.njobs(), "Total jobs: {}", ji.njobs());

        let point = ji.point(index)?;
        info!(exp_index = index, "Selected {point}");

        self.apply_point(&point)?;
        Ok(Some(point))
    }

    /// Scale the per-device batch size to the number of visible devices.
    pub fn scale_batch(&mut self, n_devices: usize) {
        if n_devices > 1 {
            self.batch *= n_devices;
        }
    }

    /// Tracker run name: `{label}_F{fold}`.
    pub fn run_name(&self) -> String {
        format!(
            "{}_F{}",
            self.label.as_deref().unwrap_or("None"),
            self.fold
        )
    }
}
