//! Output artifact names.
//!
//! Every file a run produces hangs off one base path that encodes the
//! experiment type, the optional label and the sweep parameters. Names depend
//! only on the arguments, so the completeness check can predict them without
//! running anything.

use crate::args::ExperimentArgs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    base: PathBuf,
}

impl ArtifactNames {
    pub fn new(args: &ExperimentArgs, params: &str) -> Self {
        let mut stem = args.exp_type.to_string();
        if let Some(label) = args.label.as_deref().filter(|l| !l.is_empty()) {
            stem.push('_');
            stem.push_str(label);
        }
        if !params.is_empty() {
            stem.push('_');
            stem.push_str(params);
        }
        Self {
            base: args.results_path.join(stem),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn results(&self) -> PathBuf {
        self.with_suffix("_results.json")
    }

    pub fn model(&self) -> PathBuf {
        self.with_suffix("_model")
    }

    pub fn model_summary(&self) -> PathBuf {
        self.with_suffix("_model_summary.txt")
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = self.base.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }
}
