//! Command-line flags describing one experiment.

use std::path::PathBuf;
use sweeprun_core::{ExperimentArgs, ExperimentType};

#[derive(clap::Args, Debug, Clone)]
pub struct ExperimentFlags {
    // Experiment
    /// Experiment type: rnn or cnn
    #[arg(long, default_value = "rnn")]
    pub exp_type: ExperimentType,

    /// Index into the hyperparameter sweep (batch array task id)
    #[arg(long)]
    pub exp_index: Option<usize>,

    /// Extra label for file names and the tracker run name
    #[arg(long)]
    pub label: Option<String>,

    /// Tracker project name
    #[arg(long, default_value = "sweeprun")]
    pub project: String,

    /// Data rotation (overridden by the sweep when it sweeps rotation)
    #[arg(long, default_value_t = 0)]
    pub rotation: usize,

    /// Fold number used in the tracker run name
    #[arg(long, default_value_t = 0)]
    pub fold: usize,

    /// Directory for results files and saved models
    #[arg(long, default_value = "./results")]
    pub results_path: PathBuf,

    /// Dataset directory
    #[arg(long, default_value = "./data")]
    pub dataset: PathBuf,

    // Data pipeline
    /// Batch size per device
    #[arg(long, default_value_t = 32)]
    pub batch: usize,

    /// Number of batches to prefetch
    #[arg(long, default_value_t = 2)]
    pub prefetch: usize,

    /// Shuffle buffer size (0 disables shuffling)
    #[arg(long, default_value_t = 0)]
    pub shuffle: usize,

    /// Repeat the training set indefinitely
    #[arg(long)]
    pub repeat: bool,

    /// Cache directory for loaded datasets (e.g. node-local scratch)
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Pre-constructed dataset directory
    #[arg(long)]
    pub precache: Option<PathBuf>,

    // Network
    /// Recurrent layer sizes
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub rnn_layers: Vec<usize>,

    /// Dense layer sizes
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub dense_layers: Vec<usize>,

    /// Recurrent layer activation
    #[arg(long, default_value = "tanh")]
    pub rnn_activation: String,

    /// Dense layer activation
    #[arg(long, default_value = "elu")]
    pub dense_activation: String,

    /// Return full sequences from the last recurrent layer
    #[arg(long)]
    pub return_sequences: bool,

    /// Unroll recurrent layers
    #[arg(long)]
    pub unroll: bool,

    /// Dropout rate
    #[arg(long)]
    pub dropout: Option<f64>,

    /// Spatial dropout rate
    #[arg(long)]
    pub spatial_dropout: Option<f64>,

    /// L1 regularization factor
    #[arg(long, alias = "L1_regularization")]
    pub l1_regularization: Option<f64>,

    /// L2 regularization factor
    #[arg(long, alias = "L2_regularization")]
    pub l2_regularization: Option<f64>,

    /// Insert batch normalization layers
    #[arg(long)]
    pub batch_normalization: bool,

    /// Gradient clipping threshold
    #[arg(long)]
    pub grad_clip: Option<f64>,

    /// Learning rate
    #[arg(long, default_value_t = 0.001)]
    pub lrate: f64,

    // Training
    /// Maximum number of epochs
    #[arg(long, default_value_t = 100)]
    pub epochs: usize,

    /// Training steps per epoch (full pass when omitted)
    #[arg(long)]
    pub steps_per_epoch: Option<usize>,

    /// Early stopping patience in epochs
    #[arg(long, default_value_t = 10)]
    pub patience: usize,

    /// Minimum change that counts as an improvement
    #[arg(long, default_value_t = 0.0)]
    pub min_delta: f64,

    /// Metric monitored by early stopping
    #[arg(long, default_value = "val_loss")]
    pub monitor: String,

    // Control
    /// Write the model summary next to the results and log it to the tracker
    #[arg(long)]
    pub render: bool,

    /// Compute names and stop before training
    #[arg(long)]
    pub nogo: bool,

    /// Run even if the results file already exists
    #[arg(long)]
    pub force: bool,

    /// Save the trained model
    #[arg(long)]
    pub save_model: bool,

    /// Only report which sweep points are missing results
    #[arg(long)]
    pub check: bool,

    /// Use the GPUs listed in CUDA_VISIBLE_DEVICES
    #[arg(long)]
    pub gpu: bool,

    /// CPUs allotted by the scheduler; sets trainer thread pools
    #[arg(long)]
    pub cpus_per_task: Option<usize>,
}

impl ExperimentFlags {
    pub fn into_args(self, verbose: u8) -> ExperimentArgs {
        ExperimentArgs {
            exp_type: self.exp_type,
            exp_index: self.exp_index,
            label: self.label,
            project: self.project,
            rotation: self.rotation,
            fold: self.fold,
            results_path: self.results_path,
            dataset: self.dataset,
            batch: self.batch,
            prefetch: self.prefetch,
            shuffle: self.shuffle,
            repeat: self.repeat,
            cache: self.cache,
            precache: self.precache,
            rnn_layers: self.rnn_layers,
            dense_layers: self.dense_layers,
            rnn_activation: self.rnn_activation,
            dense_activation: self.dense_activation,
            return_sequences: self.return_sequences,
            unroll: self.unroll,
            dropout: self.dropout,
            spatial_dropout: self.spatial_dropout,
            l1_regularization: self.l1_regularization,
            l2_regularization: self.l2_regularization,
            batch_normalization: self.batch_normalization,
            grad_clip: self.grad_clip,
            lrate: self.lrate,
            epochs: self.epochs,
            steps_per_epoch: self.steps_per_epoch,
            patience: self.patience,
            min_delta: self.min_delta,
            monitor: self.monitor,
            verbose,
            render: self.render,
            nogo: self.nogo,
            force: self.force,
            save_model: self.save_model,
            check: self.check,
            gpu: self.gpu,
            cpus_per_task: self.cpus_per_task,
        }
    }
}
