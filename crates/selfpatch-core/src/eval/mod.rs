//! Evaluation clients.
//!
//! An [`EvaluationClient`] takes a patch file and a task subset and returns an
//! [`EvalReport`] keyed by exactly the selected tasks. Two interchangeable
//! implementations exist, chosen by [`EvaluationMode`]: the in-process
//! [`SimulatedEvaluationClient`] and the external-harness client in the
//! `selfpatch-harness` crate.

pub mod simulated;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, SelfPatchError};
use crate::domain::report::EvalReport;

pub use simulated::SimulatedEvaluationClient;

/// One evaluation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalRequest {
    /// Patch file; empty contents mean "no patch" (baseline).
    pub patch_path: PathBuf,
    /// Label for the run; names the report directory.
    pub run_label: String,
    /// Subset name resolved to `<subsets_dir>/<subset>.json`.
    pub subset: String,
    pub num_instances: usize,
    /// Parallelism inside the harness; passed through untouched.
    pub max_workers: usize,
}

#[async_trait]
pub trait EvaluationClient: Send + Sync {
    /// Evaluate `request`. Harness faults are `EvaluationUnavailable`.
    async fn evaluate(&self, request: &EvalRequest) -> Result<EvalReport>;
}

/// Which evaluation client to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    #[default]
    Simulated,
    Harness,
}

impl std::fmt::Display for EvaluationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluationMode::Simulated => write!(f, "simulated"),
            EvaluationMode::Harness => write!(f, "harness"),
        }
    }
}

/// External harness invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSettings {
    /// Argv template. Placeholders: `{patch_path}` `{run_label}` `{subset}`
    /// `{num_instances}` `{max_workers}` `{instances_file}` `{report_path}`.
    pub command: Vec<String>,
    /// Hard upper bound on one harness run.
    pub timeout_secs: u64,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            command: [
                "./scripts/run_harness.sh",
                "{patch_path}",
                "{run_label}",
                "{instances_file}",
                "{max_workers}",
                "{report_path}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            timeout_secs: 3_600,
        }
    }
}

/// Evaluation defaults and client selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub mode: EvaluationMode,
    /// Directory holding `<subset>.json` files.
    pub subsets_dir: PathBuf,
    pub subset: String,
    pub num_instances: usize,
    pub max_workers: usize,
    pub harness: HarnessSettings,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            mode: EvaluationMode::Simulated,
            subsets_dir: PathBuf::from("subsets"),
            subset: "small".to_string(),
            num_instances: 10,
            max_workers: 5,
            harness: HarnessSettings::default(),
        }
    }
}

impl EvaluationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.subset.trim().is_empty() {
            return Err(SelfPatchError::InvalidConfig("subset must not be empty".into()));
        }
        if self.num_instances == 0 {
            return Err(SelfPatchError::InvalidConfig("num_instances must be >= 1".into()));
        }
        if self.max_workers == 0 {
            return Err(SelfPatchError::InvalidConfig("max_workers must be >= 1".into()));
        }
        if self.mode == EvaluationMode::Harness && self.harness.command.is_empty() {
            return Err(SelfPatchError::InvalidConfig(
                "harness mode requires a non-empty harness.command".into(),
            ));
        }
        Ok(())
    }

    /// Request for `patch_path` under `run_label` with the configured subset.
    pub fn request(&self, patch_path: impl Into<PathBuf>, run_label: &str) -> EvalRequest {
        EvalRequest {
            patch_path: patch_path.into(),
            run_label: run_label.to_string(),
            subset: self.subset.clone(),
            num_instances: self.num_instances,
            max_workers: self.max_workers,
        }
    }
}
