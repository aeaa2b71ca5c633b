//! # sweeprun-core: hyperparameter sweeps for batch-array training jobs
//!
//! A batch scheduler starts one process per array index. This crate turns
//! that index into a point of a Cartesian product of hyperparameters, names
//! every output artifact after it, drives an external trainer through one
//! run while an experiment tracker records it, and can later check which
//! points of the sweep never produced results.

pub mod args;
pub mod completeness;
pub mod config;
pub mod devices;
pub mod error;
pub mod experiment_type;
pub mod naming;
pub mod persistence;
pub mod sweep;
pub mod tracker;
pub mod trainer;
pub mod training;

// Re-exports
pub use args::ExperimentArgs;
pub use completeness::{CompletenessReport, check_completeness};
pub use config::{HarnessConfig, load_config, write_default_config};
pub use devices::{DeviceConfig, ThreadConfig};
pub use error::HarnessError;
pub use experiment_type::{ExperimentType, hyperparameters_for};
pub use naming::ArtifactNames;
pub use sweep::{HyperparameterSpace, JobIterator, JobPoint, ParamValue};
pub use training::{ExperimentRunner, Outcome};
