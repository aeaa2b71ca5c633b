//! Completeness check for a Cartesian-product run.
//!
//! Walks every job index with the same arguments the batch was submitted
//! with and reports the indices whose results file is missing, in a form that
//! can be pasted straight into a scheduler `--array` line.

use crate::args::ExperimentArgs;
use crate::error::HarnessError;
use crate::naming::ArtifactNames;
use crate::sweep::{HyperparameterSpace, JobIterator};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingRun {
    pub index: usize,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub total: usize,
    pub missing: Vec<MissingRun>,
}

impl CompletenessReport {
    pub fn missing_indices(&self) -> Vec<usize> {
        self.missing.iter().map(|m| m.index).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

impl fmt::Display for CompletenessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total jobs: {}", self.total)?;
        writeln!(f, "MISSING RUNS:")?;
        for run in &self.missing {
            writeln!(f, "{:3}\t{}", run.index, run.path.display())?;
        }
        let indices = self
            .missing_indices()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "Missing indices ({}): {}", self.missing.len(), indices)
    }
}

/// Check which points of `space` have no results file yet.
pub fn check_completeness(
    args: &ExperimentArgs,
    space: &HyperparameterSpace,
) -> Result<CompletenessReport, HarnessError> {
    let ji = JobIterator::new(space.clone())?;
    let mut missing = Vec::new();

    for point in ji.points() {
        let mut job_args = args.clone();
        job_args.apply_point(&point)?;
        let results = ArtifactNames::new(&job_args, &point.describe()).results();
        if !results.exists() {
            missing.push(MissingRun {
                index: point.index,
                path: results,
            });
        }
    }

    Ok(CompletenessReport {
        total: ji.njobs(),
        missing,
    })
}
