//! Experiment runner: executes one sweep point end to end.

use crate::args::ExperimentArgs;
use crate::completeness::{CompletenessReport, check_completeness};
use crate::devices::{DeviceConfig, ThreadConfig};
use crate::error::HarnessError;
use crate::experiment_type::hyperparameters_for;
use crate::naming::ArtifactNames;
use crate::persistence::atomic_write;
use crate::sweep::{HyperparameterSpace, JobPoint};
use crate::trainer::{Trainer, TrainerCommand, TrainerEvent, TrainerJob};
use crate::tracker::{ExperimentTracker, RunSpec, RunStatus, TrackerRun, hostname};
use crate::training::callbacks::{
    CallbackAction, CallbackList, EarlyStopping, MetricsLogger, TerminateOnNaN, TrainingCallback,
};
use crate::training::metrics::{EpochMetrics, Evaluation, TrainingHistory};
use crate::training::results::{EnvironmentSnapshot, RunResults};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// What a call to [`ExperimentRunner::execute`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// `nogo` was set: names were computed, nothing ran.
    NoGo { base: PathBuf },
    /// The results file already existed and `force` was off.
    Skipped { results: PathBuf },
    Completed(Box<RunResults>),
}

/// Runs experiments against a trainer and a tracker.
pub struct ExperimentRunner {
    trainer: Box<dyn Trainer>,
    tracker: Box<dyn ExperimentTracker>,
    devices: DeviceConfig,
    threads: ThreadConfig,
    sweeps: BTreeMap<String, HyperparameterSpace>,
}

impl ExperimentRunner {
    pub fn new(trainer: Box<dyn Trainer>, tracker: Box<dyn ExperimentTracker>) -> Self {
        Self {
            trainer,
            tracker,
            devices: DeviceConfig::default(),
            threads: ThreadConfig::default(),
            sweeps: BTreeMap::new(),
        }
    }

    pub fn with_devices(mut self, devices: DeviceConfig) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_threads(mut self, threads: ThreadConfig) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_sweeps(mut self, sweeps: BTreeMap<String, HyperparameterSpace>) -> Self {
        self.sweeps = sweeps;
        self
    }

    pub fn space_for(&self, args: &ExperimentArgs) -> HyperparameterSpace {
        hyperparameters_for(args.exp_type, &self.sweeps)
    }

    /// Report which points of the sweep have no results yet.
    pub fn check(&self, args: &ExperimentArgs) -> Result<CompletenessReport, HarnessError> {
        check_completeness(args, &self.space_for(args))
    }

    /// Train and evaluate the model for one sweep point.
    pub async fn execute(&self, mut args: ExperimentArgs) -> Result<Outcome, HarnessError> {
        let point = args.augment(&self.space_for(&args))?;
        let params = point.as_ref().map(JobPoint::describe).unwrap_or_default();

        args.scale_batch(self.devices.count());
        info!(batch = args.batch, "Batch size {}", args.batch);

        let names = ArtifactNames::new(&args, &params);
        info!(base = %names.base().display(), "Output base");

        if args.nogo {
            info!(base = %names.base().display(), "NO GO");
            return Ok(Outcome::NoGo {
                base: names.base().to_path_buf(),
            });
        }

        let results_path = names.results();
        if !args.force && results_path.exists() {
            info!("File {} already exists", results_path.display());
            return Ok(Outcome::Skipped {
                results: results_path,
            });
        }

        let params = point.map(|p| p.as_map()).unwrap_or_default();
        let mut config = serde_json::to_value(&args)?;
        if let Some(obj) = config.as_object_mut() {
            obj.insert("sweep_point".to_string(), params.clone().into());
        }

        let run = self
            .tracker
            .init(RunSpec {
                project: args.project.clone(),
                name: args.run_name(),
                notes: names.base().display().to_string(),
                config,
            })
            .await?;

        let trained = async {
            let mut host = serde_json::Map::new();
            host.insert("hostname".to_string(), hostname().into());
            run.log(host).await?;

            let results = self.train(&args, &names, params, run.clone()).await?;
            results.save(&results_path)?;
            Ok::<_, HarnessError>(results)
        }
        .await;

        match trained {
            Ok(results) => {
                run.finish(RunStatus::Finished).await?;
                info!(results = %results_path.display(), "Run complete");
                Ok(Outcome::Completed(Box::new(results)))
            }
            Err(err) => {
                if let Err(finish_err) = run.finish(RunStatus::Failed).await {
                    warn!(error = %finish_err, "Could not mark tracker run as failed");
                }
                Err(err)
            }
        }
    }

    async fn train(
        &self,
        args: &ExperimentArgs,
        names: &ArtifactNames,
        params: serde_json::Map<String, serde_json::Value>,
        run: Arc<dyn TrackerRun>,
    ) -> Result<RunResults, HarnessError> {
        let job = TrainerJob {
            args: args.clone(),
            point: params.clone(),
            base: names.base().to_path_buf(),
            model_path: args.save_model.then(|| names.model()),
            devices: self.devices.clone(),
            threads: self.threads.clone(),
        };

        // Early stopping is held outside the list: its best epoch is persisted.
        let mut early_stopping = EarlyStopping::new(&args.monitor, args.patience, args.min_delta);
        let mut callbacks = CallbackList::new();
        callbacks.push(TerminateOnNaN);
        callbacks.push(MetricsLogger::new(run.clone()));
        early_stopping.on_train_begin().await?;
        callbacks.on_train_begin().await?;

        let started = Instant::now();
        let mut session = self.trainer.start(&job).await?;

        let mut history = TrainingHistory::default();
        let mut evaluation: Option<Evaluation> = None;
        let mut stopped_epoch = None;
        let mut summary = None;
        let mut model_path = None;
        let mut n_classes = None;
        let mut n_tokens = None;

        while let Some(event) = session.next_event().await? {
            match event {
                TrainerEvent::Dataset {
                    n_tokens: tokens,
                    n_classes: classes,
                } => {
                    info!(n_classes = classes, n_tokens = ?tokens, "Dataset loaded");
                    n_classes = Some(classes);
                    n_tokens = tokens;
                }
                TrainerEvent::Summary { text } => {
                    if args.verbose >= 1 {
                        info!("{text}");
                    }
                    summary = Some(text);
                }
                TrainerEvent::Epoch { epoch, metrics } => {
                    let metrics = EpochMetrics {
                        epoch,
                        values: metrics,
                    };
                    history.record(&metrics);
                    let mut action = early_stopping.on_epoch_end(&metrics).await?;
                    let others = callbacks.on_epoch_end(&metrics).await?;
                    if action == CallbackAction::Continue {
                        action = others;
                    }
                    let command = match action {
                        CallbackAction::Continue => TrainerCommand::Continue,
                        CallbackAction::Stop { restore_epoch } => {
                            stopped_epoch = Some(epoch);
                            TrainerCommand::Stop { restore_epoch }
                        }
                    };
                    session.send(command).await?;
                }
                TrainerEvent::Evaluation(eval) => {
                    let mut entry = serde_json::Map::new();
                    for (name, value) in &eval.metrics {
                        entry.insert(format!("final_test_{name}"), serde_json::Value::from(*value));
                    }
                    run.log(entry).await?;
                    evaluation = Some(eval);
                }
                TrainerEvent::ModelSaved { path } => {
                    info!(path = %path.display(), "Model saved");
                    model_path = Some(path);
                }
                TrainerEvent::Log { message } => info!(target: "trainer", "{message}"),
                TrainerEvent::Done => break,
            }
        }
        session.finish().await?;

        history.total_training_time_secs = started.elapsed().as_secs_f64();
        early_stopping.on_train_end(&history).await?;
        callbacks.on_train_end(&history).await?;

        if args.render {
            match &summary {
                Some(text) => {
                    let path = names.model_summary();
                    atomic_write(&path, text.as_bytes())?;
                    run.log_artifact("model architecture", &path).await?;
                }
                None => warn!("Trainer sent no model summary; nothing to render"),
            }
        }

        Ok(RunResults {
            fname_base: names.base().to_path_buf(),
            predict_testing_eval: evaluation.as_ref().map(Evaluation::values),
            evaluation,
            history,
            stopped_epoch,
            best_epoch: early_stopping.best_epoch(),
            n_classes,
            n_tokens,
            model_path,
            params,
            args: args.clone(),
            environment: EnvironmentSnapshot::capture(&self.devices.visible),
        })
    }
}
