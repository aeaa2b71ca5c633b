//! End-to-end runs of `ExperimentRunner` against a scripted trainer and a
//! recording tracker.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use sweeprun_core::devices::DeviceConfig;
use sweeprun_core::error::HarnessError;
use sweeprun_core::tracker::{ExperimentTracker, RunSpec, RunStatus, TrackerRun};
use sweeprun_core::trainer::{Trainer, TrainerCommand, TrainerEvent, TrainerJob, TrainerSession};
use sweeprun_core::training::{Evaluation, RunResults};
use sweeprun_core::{ExperimentArgs, ExperimentRunner, Outcome};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Scripted trainer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TrainerLog {
    jobs: Vec<TrainerJob>,
    commands: Vec<TrainerCommand>,
}

#[derive(Clone)]
struct ScriptedTrainer {
    events: Vec<TrainerEvent>,
    fail_on_finish: bool,
    log: Arc<Mutex<TrainerLog>>,
}

impl ScriptedTrainer {
    fn new(events: Vec<TrainerEvent>) -> Self {
        Self {
            events,
            fail_on_finish: false,
            log: Arc::new(Mutex::new(TrainerLog::default())),
        }
    }

    fn failing(mut self) -> Self {
        self.fail_on_finish = true;
        self
    }
}

struct ScriptedSession {
    events: std::vec::IntoIter<TrainerEvent>,
    stopped: bool,
    fail_on_finish: bool,
    log: Arc<Mutex<TrainerLog>>,
}

#[async_trait]
impl Trainer for ScriptedTrainer {
    async fn start(&self, job: &TrainerJob) -> Result<Box<dyn TrainerSession>, HarnessError> {
        self.log.lock().unwrap().jobs.push(job.clone());
        Ok(Box::new(ScriptedSession {
            events: self.events.clone().into_iter(),
            stopped: false,
            fail_on_finish: self.fail_on_finish,
            log: self.log.clone(),
        }))
    }
}

#[async_trait]
impl TrainerSession for ScriptedSession {
    async fn next_event(&mut self) -> Result<Option<TrainerEvent>, HarnessError> {
        loop {
            let event = self.events.next();
            match event {
                // A stopped trainer skips its remaining epochs.
                Some(TrainerEvent::Epoch { .. }) if self.stopped => continue,
                other => return Ok(other),
            }
        }
    }

    async fn send(&mut self, command: TrainerCommand) -> Result<(), HarnessError> {
        if matches!(command, TrainerCommand::Stop { .. }) {
            self.stopped = true;
        }
        self.log.lock().unwrap().commands.push(command);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<(), HarnessError> {
        if self.fail_on_finish {
            Err(HarnessError::trainer("trainer exited with exit status: 1"))
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Recording tracker
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TrackerLog {
    specs: Vec<RunSpec>,
    entries: Vec<serde_json::Map<String, serde_json::Value>>,
    artifacts: Vec<(String, PathBuf)>,
    status: Option<RunStatus>,
}

#[derive(Clone, Default)]
struct RecordingTracker {
    log: Arc<Mutex<TrackerLog>>,
    reject_logs: bool,
}

impl RecordingTracker {
    fn rejecting_logs() -> Self {
        Self {
            reject_logs: true,
            ..Default::default()
        }
    }
}

struct RecordingRun {
    log: Arc<Mutex<TrackerLog>>,
    reject_logs: bool,
}

#[async_trait]
impl ExperimentTracker for RecordingTracker {
    async fn init(&self, spec: RunSpec) -> Result<Arc<dyn TrackerRun>, HarnessError> {
        self.log.lock().unwrap().specs.push(spec);
        Ok(Arc::new(RecordingRun {
            log: self.log.clone(),
            reject_logs: self.reject_logs,
        }))
    }
}

#[async_trait]
impl TrackerRun for RecordingRun {
    fn id(&self) -> &str {
        "recording"
    }

    async fn log(
        &self,
        entry: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), HarnessError> {
        if self.reject_logs {
            return Err(HarnessError::tracker("tracker returned 503"));
        }
        self.log.lock().unwrap().entries.push(entry);
        Ok(())
    }

    async fn log_artifact(&self, name: &str, path: &Path) -> Result<(), HarnessError> {
        self.log
            .lock()
            .unwrap()
            .artifacts
            .push((name.to_string(), path.to_path_buf()));
        Ok(())
    }

    async fn finish(&self, status: RunStatus) -> Result<(), HarnessError> {
        self.log.lock().unwrap().status = Some(status);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn epoch(n: usize, loss: f64, val_loss: f64) -> TrainerEvent {
    TrainerEvent::Epoch {
        epoch: n,
        metrics: [("loss".to_string(), loss), ("val_loss".to_string(), val_loss)]
            .into_iter()
            .collect(),
    }
}

fn evaluation(loss: f64, accuracy: f64) -> TrainerEvent {
    TrainerEvent::Evaluation(Evaluation {
        metrics: vec![
            ("loss".to_string(), loss),
            ("sparse_categorical_accuracy".to_string(), accuracy),
        ],
    })
}

fn converging_script() -> Vec<TrainerEvent> {
    vec![
        TrainerEvent::Dataset {
            n_tokens: Some(25),
            n_classes: 46,
        },
        TrainerEvent::Summary {
            text: "Model: simple_rnn\nTotal params: 12,345".to_string(),
        },
        epoch(1, 1.2, 1.3),
        epoch(2, 0.9, 1.0),
        epoch(3, 0.7, 0.8),
        evaluation(0.85, 0.72),
        TrainerEvent::Done,
    ]
}

fn args_in(dir: &TempDir) -> ExperimentArgs {
    ExperimentArgs {
        results_path: dir.path().to_path_buf(),
        label: Some("gru".to_string()),
        patience: 2,
        ..Default::default()
    }
}

fn runner(trainer: &ScriptedTrainer, tracker: &RecordingTracker) -> ExperimentRunner {
    ExperimentRunner::new(Box::new(trainer.clone()), Box::new(tracker.clone()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_completed_run_writes_results_and_logs() {
    let dir = TempDir::new().unwrap();
    let trainer = ScriptedTrainer::new(converging_script());
    let tracker = RecordingTracker::default();

    let outcome = runner(&trainer, &tracker)
        .execute(args_in(&dir))
        .await
        .unwrap();

    let results_path = dir.path().join("rnn_gru_results.json");
    let Outcome::Completed(results) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(RunResults::load(&results_path).unwrap(), *results);
    assert_eq!(results.predict_testing_eval, Some(vec![0.85, 0.72]));
    assert_eq!(results.history.epochs_completed, 3);
    assert_eq!(results.best_epoch, Some(3));
    assert_eq!(results.stopped_epoch, None);
    assert_eq!(results.n_classes, Some(46));

    let trainer_log = trainer.log.lock().unwrap();
    assert_eq!(trainer_log.commands, vec![TrainerCommand::Continue; 3]);
    assert_eq!(trainer_log.jobs[0].model_path, None);

    let log = tracker.log.lock().unwrap();
    assert_eq!(log.specs[0].name, "gru_F0");
    assert_eq!(log.specs[0].project, "sweeprun");
    assert_eq!(log.specs[0].notes, dir.path().join("rnn_gru").display().to_string());
    assert!(log.entries[0].contains_key("hostname"));
    assert_eq!(log.entries[1]["epoch/val_loss"], 1.3);
    let last = log.entries.last().unwrap();
    assert_eq!(last["final_test_loss"], 0.85);
    assert_eq!(last["final_test_sparse_categorical_accuracy"], 0.72);
    assert_eq!(log.status, Some(RunStatus::Finished));
}

#[tokio::test]
async fn test_early_stopping_stops_trainer_and_restores_best() {
    let dir = TempDir::new().unwrap();
    let trainer = ScriptedTrainer::new(vec![
        epoch(1, 1.0, 0.9),
        epoch(2, 0.8, 0.5),
        epoch(3, 0.7, 0.6),
        epoch(4, 0.6, 0.55),
        epoch(5, 0.5, 0.4),
        evaluation(0.6, 0.7),
        TrainerEvent::Done,
    ]);
    let tracker = RecordingTracker::default();

    let Outcome::Completed(results) = runner(&trainer, &tracker)
        .execute(args_in(&dir))
        .await
        .unwrap()
    else {
        panic!("expected a completed run");
    };

    assert_eq!(results.history.epochs_completed, 4);
    assert_eq!(results.stopped_epoch, Some(4));
    assert_eq!(results.best_epoch, Some(2));
    assert_eq!(
        trainer.log.lock().unwrap().commands,
        vec![
            TrainerCommand::Continue,
            TrainerCommand::Continue,
            TrainerCommand::Continue,
            TrainerCommand::Stop {
                restore_epoch: Some(2)
            },
        ]
    );
}

#[tokio::test]
async fn test_best_epoch_honours_min_delta() {
    let dir = TempDir::new().unwrap();
    let trainer = ScriptedTrainer::new(vec![
        epoch(1, 0.9, 0.5),
        epoch(2, 0.8, 0.495),
        epoch(3, 0.7, 0.499),
        TrainerEvent::Done,
    ]);
    let tracker = RecordingTracker::default();
    let args = ExperimentArgs {
        min_delta: 0.01,
        ..args_in(&dir)
    };

    let Outcome::Completed(results) = runner(&trainer, &tracker).execute(args).await.unwrap()
    else {
        panic!("expected a completed run");
    };

    // 0.495 is not better than 0.5 by more than 0.01.
    assert_eq!(
        trainer.log.lock().unwrap().commands.last(),
        Some(&TrainerCommand::Stop {
            restore_epoch: Some(1)
        })
    );
    assert_eq!(results.stopped_epoch, Some(3));
    assert_eq!(results.best_epoch, Some(1));
}

#[tokio::test]
async fn test_best_epoch_uses_trainer_epoch_numbers() {
    let dir = TempDir::new().unwrap();
    let trainer = ScriptedTrainer::new(vec![
        epoch(0, 1.0, 0.9),
        epoch(1, 0.8, 0.5),
        epoch(2, 0.7, 0.6),
        epoch(3, 0.6, 0.7),
        TrainerEvent::Done,
    ]);
    let tracker = RecordingTracker::default();

    let Outcome::Completed(results) = runner(&trainer, &tracker)
        .execute(args_in(&dir))
        .await
        .unwrap()
    else {
        panic!("expected a completed run");
    };

    assert_eq!(
        trainer.log.lock().unwrap().commands.last(),
        Some(&TrainerCommand::Stop {
            restore_epoch: Some(1)
        })
    );
    assert_eq!(results.best_epoch, Some(1));
    assert_eq!(results.stopped_epoch, Some(3));
    assert_eq!(results.history.epochs, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_tracker_log_failure_marks_run_failed() {
    let dir = TempDir::new().unwrap();
    let trainer = ScriptedTrainer::new(converging_script());
    let tracker = RecordingTracker::rejecting_logs();

    let err = runner(&trainer, &tracker)
        .execute(args_in(&dir))
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::Tracker(_)));
    assert_eq!(tracker.log.lock().unwrap().status, Some(RunStatus::Failed));
    assert!(trainer.log.lock().unwrap().jobs.is_empty());
    assert!(!dir.path().join("rnn_gru_results.json").exists());
}

#[tokio::test]
async fn test_nogo_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let trainer = ScriptedTrainer::new(converging_script());
    let tracker = RecordingTracker::default();

    let args = ExperimentArgs {
        nogo: true,
        exp_index: Some(3),
        results_path: dir.path().join("results"),
        ..Default::default()
    };
    let outcome = runner(&trainer, &tracker).execute(args).await.unwrap();

    assert_eq!(
        outcome,
        Outcome::NoGo {
            base: dir.path().join("results").join("rnn_rotation_3")
        }
    );
    assert!(trainer.log.lock().unwrap().jobs.is_empty());
    assert!(tracker.log.lock().unwrap().specs.is_empty());
    assert!(!dir.path().join("results").exists());
}

#[tokio::test]
async fn test_existing_results_are_skipped_unless_forced() {
    let dir = TempDir::new().unwrap();
    let existing = dir.path().join("rnn_gru_results.json");
    std::fs::write(&existing, "{}").unwrap();

    let trainer = ScriptedTrainer::new(converging_script());
    let tracker = RecordingTracker::default();
    let r = runner(&trainer, &tracker);

    let outcome = r.execute(args_in(&dir)).await.unwrap();
    assert_eq!(outcome, Outcome::Skipped { results: existing.clone() });
    assert!(trainer.log.lock().unwrap().jobs.is_empty());

    let forced = ExperimentArgs {
        force: true,
        ..args_in(&dir)
    };
    assert!(matches!(r.execute(forced).await.unwrap(), Outcome::Completed(_)));
    assert!(RunResults::load(&existing).is_ok());
}

#[tokio::test]
async fn test_exp_index_selects_point_and_devices_scale_batch() {
    let dir = TempDir::new().unwrap();
    let trainer = ScriptedTrainer::new(converging_script());
    let tracker = RecordingTracker::default();

    let args = ExperimentArgs {
        exp_index: Some(4),
        batch: 4096,
        save_model: true,
        ..args_in(&dir)
    };
    let devices = DeviceConfig::from_env_value(true, Some("0,1"));
    let r = runner(&trainer, &tracker).with_devices(devices);
    let Outcome::Completed(results) = r.execute(args).await.unwrap() else {
        panic!("expected a completed run");
    };

    assert_eq!(results.args.rotation, 4);
    assert_eq!(results.args.batch, 8192);
    assert_eq!(results.params["rotation"], 4);
    assert!(dir.path().join("rnn_gru_rotation_4_results.json").exists());

    let job = trainer.log.lock().unwrap().jobs[0].clone();
    assert_eq!(job.devices.count(), 2);
    assert_eq!(job.model_path, Some(dir.path().join("rnn_gru_rotation_4_model")));

    let config = tracker.log.lock().unwrap().specs[0].config.clone();
    assert_eq!(config["sweep_point"]["rotation"], 4);
    assert_eq!(config["batch"], 8192);
}

#[tokio::test]
async fn test_out_of_range_index_is_rejected() {
    let dir = TempDir::new().unwrap();
    let trainer = ScriptedTrainer::new(converging_script());
    let tracker = RecordingTracker::default();

    let args = ExperimentArgs {
        exp_index: Some(5),
        ..args_in(&dir)
    };
    let err = runner(&trainer, &tracker).execute(args).await.unwrap_err();
    assert!(matches!(err, HarnessError::IndexOutOfRange { index: 5, njobs: 5 }));
}

#[tokio::test]
async fn test_trainer_failure_marks_run_failed() {
    let dir = TempDir::new().unwrap();
    let trainer = ScriptedTrainer::new(converging_script()).failing();
    let tracker = RecordingTracker::default();

    let err = runner(&trainer, &tracker)
        .execute(args_in(&dir))
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::Trainer(_)));
    assert_eq!(tracker.log.lock().unwrap().status, Some(RunStatus::Failed));
    assert!(!dir.path().join("rnn_gru_results.json").exists());
}

#[tokio::test]
async fn test_render_writes_summary_artifact() {
    let dir = TempDir::new().unwrap();
    let trainer = ScriptedTrainer::new(converging_script());
    let tracker = RecordingTracker::default();

    let args = ExperimentArgs {
        render: true,
        ..args_in(&dir)
    };
    runner(&trainer, &tracker).execute(args).await.unwrap();

    let summary = dir.path().join("rnn_gru_model_summary.txt");
    assert!(
        std::fs::read_to_string(&summary)
            .unwrap()
            .starts_with("Model: simple_rnn")
    );
    assert_eq!(
        tracker.log.lock().unwrap().artifacts,
        vec![("model architecture".to_string(), summary)]
    );
}

#[tokio::test]
async fn test_check_reports_points_not_yet_run() {
    let dir = TempDir::new().unwrap();
    let trainer = ScriptedTrainer::new(converging_script());
    let tracker = RecordingTracker::default();
    let r = runner(&trainer, &tracker);

    for index in [0, 3] {
        let args = ExperimentArgs {
            exp_index: Some(index),
            ..args_in(&dir)
        };
        r.execute(args).await.unwrap();
    }

    let report = r.check(&args_in(&dir)).unwrap();
    assert_eq!(report.total, 5);
    assert_eq!(report.missing_indices(), vec![1, 2, 4]);
    assert!(report.to_string().ends_with("Missing indices (3): 1,2,4"));
}
