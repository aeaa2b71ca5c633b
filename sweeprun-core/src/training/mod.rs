//! Training orchestration: callbacks, metrics, results and the experiment runner.

pub mod callbacks;
pub mod metrics;
pub mod results;
pub mod runner;

pub use callbacks::{CallbackAction, CallbackList, EarlyStopping, TrainingCallback};
pub use metrics::{EpochMetrics, Evaluation, TrainingHistory};
pub use results::{EnvironmentSnapshot, RunResults};
pub use runner::{ExperimentRunner, Outcome};
