//! Training callbacks for early stopping, NaN termination and metric logging.

use crate::error::HarnessError;
use crate::tracker::TrackerRun;
use crate::training::metrics::{EpochMetrics, Mode, TrainingHistory};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Action a callback can request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    /// Stop training, optionally rolling the model back to an earlier epoch.
    Stop { restore_epoch: Option<usize> },
}

/// Trait for training callbacks.
#[async_trait]
pub trait TrainingCallback: Send + Sync {
    async fn on_train_begin(&mut self) -> Result<(), HarnessError> {
        Ok(())
    }

    /// Called at the end of each epoch with the metrics the trainer reported.
    async fn on_epoch_end(&mut self, metrics: &EpochMetrics)
    -> Result<CallbackAction, HarnessError>;

    async fn on_train_end(&mut self, _history: &TrainingHistory) -> Result<(), HarnessError> {
        Ok(())
    }
}

/// Early stopping callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyStopping {
    pub monitor: String,
    pub patience: usize,
    pub min_delta: f64,
    pub restore_best_weights: bool,
    pub mode: Mode,
    #[serde(skip)]
    wait: usize,
    #[serde(skip)]
    best: Option<f64>,
    #[serde(skip)]
    best_epoch: Option<usize>,
    #[serde(skip)]
    stopped_epoch: Option<usize>,
}

impl EarlyStopping {
    pub fn new(monitor: &str, patience: usize, min_delta: f64) -> Self {
        Self {
            monitor: monitor.to_string(),
            patience,
            min_delta: min_delta.abs(),
            restore_best_weights: true,
            mode: Mode::for_metric(monitor),
            wait: 0,
            best: None,
            best_epoch: None,
            stopped_epoch: None,
        }
    }

    pub fn restore_best_weights(mut self, restore: bool) -> Self {
        self.restore_best_weights = restore;
        self
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    /// Feed one value of the monitored metric.
    pub fn update(&mut self, epoch: usize, value: f64) -> CallbackAction {
        let improved = match self.best {
            None => true,
            Some(best) => self.mode.is_better(value, best, self.min_delta),
        };

        if improved {
            self.best = Some(value);
            self.best_epoch = Some(epoch);
            self.wait = 0;
            return CallbackAction::Continue;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            self.stopped_epoch = Some(epoch);
            info!(
                epoch,
                best_epoch = ?self.best_epoch,
                "Early stopping on {}",
                self.monitor
            );
            CallbackAction::Stop {
                restore_epoch: self.best_epoch.filter(|_| self.restore_best_weights),
            }
        } else {
            CallbackAction::Continue
        }
    }
}

#[async_trait]
impl TrainingCallback for EarlyStopping {
    async fn on_epoch_end(
        &mut self,
        metrics: &EpochMetrics,
    ) -> Result<CallbackAction, HarnessError> {
        match metrics.get(&self.monitor) {
            Some(value) => Ok(self.update(metrics.epoch, value)),
            None => {
                let available: Vec<&str> = metrics.values.keys().map(String::as_str).collect();
                warn!(
                    monitor = %self.monitor,
                    ?available,
                    "Early stopping conditioned on unavailable metric"
                );
                Ok(CallbackAction::Continue)
            }
        }
    }
}

/// Stops training as soon as any loss goes NaN or infinite.
#[derive(Debug, Clone, Default)]
pub struct TerminateOnNaN;

#[async_trait]
impl TrainingCallback for TerminateOnNaN {
    async fn on_epoch_end(
        &mut self,
        metrics: &EpochMetrics,
    ) -> Result<CallbackAction, HarnessError> {
        let diverged = metrics
            .values
            .iter()
            .any(|(name, v)| name.contains("loss") && !v.is_finite());
        if diverged {
            warn!(epoch = metrics.epoch, "Invalid loss, terminating training");
            Ok(CallbackAction::Stop {
                restore_epoch: None,
            })
        } else {
            Ok(CallbackAction::Continue)
        }
    }
}

/// Forwards epoch metrics to the experiment tracker.
pub struct MetricsLogger {
    run: Arc<dyn TrackerRun>,
}

impl MetricsLogger {
    pub fn new(run: Arc<dyn TrackerRun>) -> Self {
        Self { run }
    }
}

#[async_trait]
impl TrainingCallback for MetricsLogger {
    async fn on_epoch_end(
        &mut self,
        metrics: &EpochMetrics,
    ) -> Result<CallbackAction, HarnessError> {
        let mut entry = serde_json::Map::new();
        entry.insert("epoch/epoch".to_string(), metrics.epoch.into());
        for (name, value) in &metrics.values {
            entry.insert(format!("epoch/{name}"), serde_json::Value::from(*value));
        }
        self.run.log(entry).await?;
        Ok(CallbackAction::Continue)
    }
}

/// Ordered set of callbacks. Every callback sees every epoch.
#[derive(Default)]
pub struct CallbackList {
    callbacks: Vec<Box<dyn TrainingCallback>>,
}

impl CallbackList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, callback: impl TrainingCallback + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub async fn on_train_begin(&mut self) -> Result<(), HarnessError> {
        for cb in &mut self.callbacks {
            cb.on_train_begin().await?;
        }
        Ok(())
    }

    /// First requested stop wins; later callbacks still run.
    pub async fn on_epoch_end(
        &mut self,
        metrics: &EpochMetrics,
    ) -> Result<CallbackAction, HarnessError> {
        let mut action = CallbackAction::Continue;
        for cb in &mut self.callbacks {
            let requested = cb.on_epoch_end(metrics).await?;
            if action == CallbackAction::Continue {
                action = requested;
            }
        }
        Ok(action)
    }

    pub async fn on_train_end(&mut self, history: &TrainingHistory) -> Result<(), HarnessError> {
        for cb in &mut self.callbacks {
            cb.on_train_end(history).await?;
        }
        Ok(())
    }
}
