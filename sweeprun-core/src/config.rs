//! Configuration for sweeprun.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace config -> explicit file -> environment.

use crate::error::HarnessError;
use crate::persistence::atomic_write;
use crate::sweep::HyperparameterSpace;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// External model program.
    #[serde(default)]
    pub trainer: TrainerConfig,
    /// Experiment tracking backend.
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// Log file settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Per-experiment-type sweeps replacing the built-in ones, keyed by type name.
    #[serde(default)]
    pub sweep: BTreeMap<String, HyperparameterSpace>,
}

/// How to launch the model-building and training program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Executable to spawn.
    #[serde(default = "default_trainer_program")]
    pub program: PathBuf,
    /// Arguments passed before anything else (e.g. the script path).
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory (defaults to the workspace).
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Wall-clock limit for one run, in seconds.
    #[serde(default = "default_trainer_timeout")]
    pub timeout_secs: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            program: default_trainer_program(),
            args: Vec::new(),
            working_dir: None,
            timeout_secs: default_trainer_timeout(),
        }
    }
}

fn default_trainer_program() -> PathBuf {
    PathBuf::from("python3")
}

fn default_trainer_timeout() -> u64 {
    48 * 3600
}

/// Experiment tracking backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerMode {
    /// Event logs on local disk.
    #[default]
    Local,
    /// JSON events posted to a tracking server.
    Http,
    /// No tracking.
    Disabled,
}

/// Experiment tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub mode: TrackerMode,
    /// Root directory for the local backend.
    #[serde(default = "default_tracker_dir")]
    pub dir: PathBuf,
    /// Base URL for the HTTP backend.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding the HTTP bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Request timeout for the HTTP backend, in seconds.
    #[serde(default = "default_tracker_timeout")]
    pub timeout_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            mode: TrackerMode::default(),
            dir: default_tracker_dir(),
            endpoint: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_tracker_timeout(),
        }
    }
}

fn default_tracker_dir() -> PathBuf {
    PathBuf::from(".sweeprun/runs")
}

fn default_api_key_env() -> String {
    "SWEEPRUN_TRACKER_TOKEN".to_string()
}

fn default_tracker_timeout() -> u64 {
    30
}

/// Structured log file configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the JSON log; the platform data directory when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Write the JSON log file at all.
    #[serde(default = "default_true")]
    pub json_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            json_file: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `SWEEPRUN_`)
/// 2. Explicit config file (`--config`)
/// 3. Workspace-local config (`.sweeprun/config.toml`)
/// 4. User config (`~/.config/sweeprun/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<HarnessConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(HarnessConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "sweeprun", "sweeprun") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".sweeprun").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        figment = figment.merge(Toml::file_exact(path));
    }

    // SWEEPRUN_TRACKER__MODE, SWEEPRUN_TRAINER__PROGRAM, etc.
    figment = figment.merge(Env::prefixed("SWEEPRUN_").split("__"));

    figment.extract().map_err(Box::new)
}

impl HarnessConfig {
    /// Render the configuration as pretty TOML.
    pub fn to_toml(&self) -> Result<String, HarnessError> {
        toml::to_string_pretty(self).map_err(|e| HarnessError::config(e.to_string()))
    }
}

/// Write a default `.sweeprun/config.toml` into the workspace.
///
/// Returns `Ok(None)` without touching anything when the file already exists.
pub fn write_default_config(workspace: &Path) -> Result<Option<PathBuf>, HarnessError> {
    let config_path = workspace.join(".sweeprun").join("config.toml");
    if config_path.exists() {
        return Ok(None);
    }
    let toml_str = HarnessConfig::default().to_toml()?;
    atomic_write(&config_path, toml_str.as_bytes())?;
    Ok(Some(config_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::JobIterator;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.tracker.mode, TrackerMode::Local);
        assert_eq!(config.trainer.program, PathBuf::from("python3"));
        assert!(config.logging.json_file);
        assert!(config.sweep.is_empty());
    }

    #[test]
    fn test_workspace_config_layers_over_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".sweeprun")).unwrap();
        std::fs::write(
            dir.path().join(".sweeprun").join("config.toml"),
            r#"
[trainer]
program = "/opt/venv/bin/python"
args = ["rnn_classifier.py"]

[tracker]
mode = "disabled"

[[sweep.rnn]]
name = "rotation"
values = [0, 1, 2, 3, 4]

[[sweep.rnn]]
name = "lrate"
values = [0.001, 0.0001]
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.trainer.program, PathBuf::from("/opt/venv/bin/python"));
        assert_eq!(config.trainer.args, vec!["rnn_classifier.py".to_string()]);
        assert_eq!(config.trainer.timeout_secs, 48 * 3600);
        assert_eq!(config.tracker.mode, TrackerMode::Disabled);

        let ji = JobIterator::new(config.sweep["rnn"].clone()).unwrap();
        assert_eq!(ji.njobs(), 10);
        assert_eq!(ji.point(1).unwrap().describe(), "rotation_0_lrate_0.0001");
    }

    #[test]
    fn test_sweep_accepts_table_of_arrays() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sweep.toml");
        std::fs::write(
            &path,
            r#"
[sweep.rnn]
rotation = [0, 1]
lrate = [0.01, 0.001]
"#,
        )
        .unwrap();

        let config = load_config(None, Some(&path)).unwrap();
        let ji = JobIterator::new(config.sweep["rnn"].clone()).unwrap();
        assert_eq!(ji.njobs(), 4);
        // Table keys come back sorted by name.
        assert_eq!(ji.point(1).unwrap().describe(), "lrate_0.01_rotation_1");
    }

    #[test]
    fn test_sweep_rejects_duplicate_axes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sweep.toml");
        std::fs::write(
            &path,
            r#"
[[sweep.rnn]]
name = "rotation"
values = [0, 1]

[[sweep.rnn]]
name = "rotation"
values = [2]
"#,
        )
        .unwrap();
        assert!(load_config(None, Some(&path)).is_err());
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config(None, Some(&missing)).is_err());
    }

    #[test]
    fn test_write_default_config_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = write_default_config(dir.path()).unwrap().unwrap();
        assert!(path.ends_with(".sweeprun/config.toml"));

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.tracker.mode, TrackerMode::Local);
        assert_eq!(config.trainer.timeout_secs, 48 * 3600);

        // Second call leaves the existing file alone.
        assert!(write_default_config(dir.path()).unwrap().is_none());
    }
}
