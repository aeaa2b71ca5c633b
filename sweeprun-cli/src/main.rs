//! sweeprun CLI: run one point of a hyperparameter sweep, or check which
//! points are still missing.

mod flags;

use anyhow::Context;
use clap::Parser;
use flags::ExperimentFlags;
use std::path::{Path, PathBuf};
use sweeprun_core::config::LoggingConfig;
use sweeprun_core::trainer::ProcessTrainer;
use sweeprun_core::{DeviceConfig, ExperimentRunner, Outcome, ThreadConfig, tracker};
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// sweeprun: batch-array hyperparameter sweeps over an external trainer
#[derive(Parser, Debug)]
#[command(name = "sweeprun", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    experiment: ExperimentFlags,

    /// Workspace directory (trainer working directory, `.sweeprun/config.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Write a default `.sweeprun/config.toml` into the workspace and exit
    #[arg(long)]
    init_config: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long, conflicts_with = "init_config")]
    show_config: bool,
}

/// Human-readable stderr output plus an optional JSON log file.
fn init_tracing(verbose: u8, quiet: bool, logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = match verbose {
        0 if quiet => "error",
        0 | 1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    if !logging.json_file {
        tracing_subscriber::registry().with(stderr_layer).init();
        return None;
    }

    let log_dir = logging.dir.clone().unwrap_or_else(|| {
        directories::ProjectDirs::from("dev", "sweeprun", "sweeprun")
            .map(|d| d.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("."))
    });
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "sweeprun.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();
    Some(guard)
}

fn resolve_workspace(workspace: &Path) -> PathBuf {
    workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let workspace = resolve_workspace(&cli.workspace);

    if cli.init_config {
        match sweeprun_core::write_default_config(&workspace)? {
            Some(path) => println!("Created default configuration at: {}", path.display()),
            None => println!("Configuration file already exists in {}", workspace.display()),
        }
        return Ok(());
    }

    let config = sweeprun_core::load_config(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    if cli.show_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    let _guard = init_tracing(cli.verbose, cli.quiet, &config.logging);

    let args = cli.experiment.into_args(cli.verbose);
    args.validate().context("Invalid arguments")?;
    debug!(?args, "Arguments parsed");

    let devices = DeviceConfig::detect(args.gpu);
    let threads = ThreadConfig::from_cpus(args.cpus_per_task);
    let trainer = ProcessTrainer::from_config(&config.trainer, workspace.clone());
    let tracker = tracker::from_config(&config.tracker)?;

    let runner = ExperimentRunner::new(Box::new(trainer), tracker)
        .with_devices(devices)
        .with_threads(threads)
        .with_sweeps(config.sweep.clone());

    if args.check {
        let report = runner.check(&args)?;
        println!("{report}");
        return Ok(());
    }

    match runner.execute(args).await.context("Experiment failed")? {
        Outcome::NoGo { base } => {
            println!("NO GO");
            println!("{}", base.display());
        }
        Outcome::Skipped { results } => {
            println!("File {} already exists", results.display());
        }
        Outcome::Completed(results) => {
            println!("{}", results.fname_base.display());
            if let Some(eval) = &results.evaluation {
                for (name, value) in &eval.metrics {
                    println!("  test {name}: {value:.6}");
                }
            }
        }
    }

    Ok(())
}
