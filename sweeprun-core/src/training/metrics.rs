//! Training metrics tracking.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Direction in which a monitored metric improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Min,
    Max,
}

impl Mode {
    /// Accuracy-like metrics are maximized, everything else minimized.
    pub fn for_metric(name: &str) -> Self {
        if name.contains("acc") { Mode::Max } else { Mode::Min }
    }

    pub fn is_better(&self, candidate: f64, best: f64, min_delta: f64) -> bool {
        match self {
            Mode::Min => candidate < best - min_delta,
            Mode::Max => candidate > best + min_delta,
        }
    }
}

/// Metrics reported by the trainer at the end of one epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub values: BTreeMap<String, f64>,
}

impl EpochMetrics {
    pub fn new(epoch: usize) -> Self {
        Self {
            epoch,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// Per-metric series over all completed epochs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs_completed: usize,
    /// Epoch numbers as the trainer reported them, aligned with every series.
    #[serde(default)]
    pub epochs: Vec<usize>,
    pub series: BTreeMap<String, Vec<f64>>,
    pub total_training_time_secs: f64,
}

impl TrainingHistory {
    pub fn record(&mut self, metrics: &EpochMetrics) {
        for (name, value) in &metrics.values {
            self.series.entry(name.clone()).or_default().push(*value);
        }
        self.epochs.push(metrics.epoch);
        self.epochs_completed += 1;
    }
}

/// Test-set evaluation: metric names in the order the trainer reported them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub metrics: Vec<(String, f64)>,
}

impl Evaluation {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn loss(&self) -> Option<f64> {
        self.get("loss")
    }

    /// Raw values, loss first, matching the framework's `evaluate` output.
    pub fn values(&self) -> Vec<f64> {
        self.metrics.iter().map(|(_, v)| *v).collect()
    }
}
