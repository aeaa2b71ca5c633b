//! External-process trainer.
//!
//! Spawns the configured model program, writes the [`TrainerJob`] as one JSON
//! line on its stdin and reads JSON-line [`TrainerEvent`]s from its stdout.
//! Every `epoch` event must be answered with a [`TrainerCommand`] line before
//! the program continues. Stdout lines that do not start with `{` are treated
//! as framework chatter and logged at debug level.

use super::{Trainer, TrainerCommand, TrainerEvent, TrainerJob, TrainerSession};
use crate::config::TrainerConfig;
use crate::devices::CUDA_VISIBLE_DEVICES;
use crate::error::HarnessError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::Instant;
use tracing::debug;

pub struct ProcessTrainer {
    program: PathBuf,
    args: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl ProcessTrainer {
    pub fn new(program: PathBuf, args: Vec<String>, working_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            program,
            args,
            working_dir,
            timeout,
        }
    }

    pub fn from_config(config: &TrainerConfig, workspace: PathBuf) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            config.working_dir.clone().unwrap_or(workspace),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl Trainer for ProcessTrainer {
    async fn start(&self, job: &TrainerJob) -> Result<Box<dyn TrainerSession>, HarnessError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.working_dir)
            // An empty list hides every accelerator from the framework.
            .env(CUDA_VISIBLE_DEVICES, job.devices.visible.join(","))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        debug!(program = %self.program.display(), args = ?self.args, "Spawning trainer");
        let mut child = command.spawn().map_err(|e| {
            HarnessError::trainer(format!("Failed to spawn {}: {e}", self.program.display()))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HarnessError::trainer("trainer stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::trainer("trainer stdout unavailable"))?;

        let mut session = ProcessSession {
            child,
            stdin: Some(stdin),
            lines: BufReader::new(stdout).lines(),
            deadline: Instant::now() + self.timeout,
            timeout: self.timeout,
        };
        session.write_line(&serde_json::to_string(job)?).await?;
        Ok(Box::new(session))
    }
}

struct ProcessSession {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Lines<BufReader<ChildStdout>>,
    deadline: Instant,
    timeout: Duration,
}

impl ProcessSession {
    async fn write_line(&mut self, line: &str) -> Result<(), HarnessError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| HarnessError::trainer("trainer stdin already closed"))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    fn timed_out(&self) -> HarnessError {
        HarnessError::Timeout(format!(
            "trainer exceeded {}s",
            self.timeout.as_secs()
        ))
    }
}

#[async_trait]
impl TrainerSession for ProcessSession {
    async fn next_event(&mut self) -> Result<Option<TrainerEvent>, HarnessError> {
        loop {
            let next = tokio::time::timeout_at(self.deadline, self.lines.next_line()).await;
            let line = match next {
                Ok(line) => line?,
                Err(_) => {
                    self.child.start_kill().ok();
                    return Err(self.timed_out());
                }
            };
            let Some(line) = line else {
                return Ok(None);
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !trimmed.starts_with('{') {
                debug!(target: "trainer", "{trimmed}");
                continue;
            }

            let event: TrainerEvent = serde_json::from_str(trimmed)
                .map_err(|e| HarnessError::trainer(format!("malformed event {trimmed:?}: {e}")))?;
            debug!(?event, "Trainer event");
            return Ok(Some(event));
        }
    }

    async fn send(&mut self, command: TrainerCommand) -> Result<(), HarnessError> {
        let line = serde_json::to_string(&command)?;
        self.write_line(&line).await
    }

    async fn finish(mut self: Box<Self>) -> Result<(), HarnessError> {
        // Closing stdin lets a trainer blocked on a command read exit.
        drop(self.stdin.take());
        let waited = tokio::time::timeout_at(self.deadline, self.child.wait()).await;
        let status = match waited {
            Ok(status) => status?,
            Err(_) => {
                self.child.start_kill().ok();
                return Err(self.timed_out());
            }
        };
        if !status.success() {
            return Err(HarnessError::trainer(format!("trainer exited with {status}")));
        }
        Ok(())
    }
}
