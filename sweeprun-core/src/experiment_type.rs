//! Experiment types and the sweep each one runs.

use crate::error::HarnessError;
use crate::sweep::HyperparameterSpace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Which network family an experiment trains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ExperimentType {
    Rnn,
    Cnn,
}

impl ExperimentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentType::Rnn => "rnn",
            ExperimentType::Cnn => "cnn",
        }
    }
}

impl fmt::Display for ExperimentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentType {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rnn" => Ok(ExperimentType::Rnn),
            "cnn" => Ok(ExperimentType::Cnn),
            _ => Err(HarnessError::UnknownExperimentType(s.to_string())),
        }
    }
}

impl TryFrom<String> for ExperimentType {
    type Error = HarnessError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Sweep for `exp_type`.
///
/// Both types rotate over the five data folds unless `overrides` carries a
/// space keyed by the type's name.
pub fn hyperparameters_for(
    exp_type: ExperimentType,
    overrides: &BTreeMap<String, HyperparameterSpace>,
) -> HyperparameterSpace {
    if let Some(space) = overrides.get(exp_type.as_str()) {
        return space.clone();
    }
    match exp_type {
        ExperimentType::Rnn | ExperimentType::Cnn => HyperparameterSpace::new().range("rotation", 0..5),
    }
}
