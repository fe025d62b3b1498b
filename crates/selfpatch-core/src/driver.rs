//! Improvement driver: one baseline → diagnose → patch → apply → re-eval cycle.
//!
//! ```text
//! BASELINE_EVAL → DIAGNOSE → GENERATE_PATCH → VALIDATE → APPLY → RE_EVAL → DONE
//!        └──────────────┴─────────────┴──────────┴────────┴────────┴──→ FAILED
//! ```
//!
//! Steps run strictly in sequence. A malformed patch (under
//! [`InvalidPatchPolicy::BestEffort`]) and a rejected patch are recorded and
//! the cycle continues; every other error moves the cycle to `FAILED` and is
//! returned as a [`CycleError`] naming the step.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument};

use crate::apply::{ApplyResult, PatchApplicator};
use crate::audit::{sha256_hex, AuditTrail, CycleSummary};
use crate::backend::LanguageModel;
use crate::config::InvalidPatchPolicy;
use crate::domain::error::SelfPatchError;
use crate::domain::patch::Patch;
use crate::domain::report::{EvalReport, ResolvedDelta};
use crate::eval::{EvaluationClient, EvaluationConfig};
use crate::obs::{self, LogContext};
use crate::prompts;
use crate::sandbox::SandboxManager;

/// Run label of the unpatched evaluation.
pub const BASELINE_LABEL: &str = "baseline";
/// Run label of the post-patch evaluation.
pub const IMPROVED_LABEL: &str = "improved";
/// Run label of the span wrapping a whole cycle.
pub const CYCLE_LABEL: &str = "cycle";

/// Driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverState {
    BaselineEval,
    Diagnose,
    GeneratePatch,
    Validate,
    Apply,
    ReEval,
    Done,
    Failed,
}

impl DriverState {
    /// Successor on the success path; `None` for terminal states.
    pub fn next(self) -> Option<DriverState> {
        match self {
            DriverState::BaselineEval => Some(DriverState::Diagnose),
            DriverState::Diagnose => Some(DriverState::GeneratePatch),
            DriverState::GeneratePatch => Some(DriverState::Validate),
            DriverState::Validate => Some(DriverState::Apply),
            DriverState::Apply => Some(DriverState::ReEval),
            DriverState::ReEval => Some(DriverState::Done),
            DriverState::Done | DriverState::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverState::BaselineEval => "BASELINE_EVAL",
            DriverState::Diagnose => "DIAGNOSE",
            DriverState::GeneratePatch => "GENERATE_PATCH",
            DriverState::Validate => "VALIDATE",
            DriverState::Apply => "APPLY",
            DriverState::ReEval => "RE_EVAL",
            DriverState::Done => "DONE",
            DriverState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// A fatal error together with the step it happened in.
#[derive(Debug, thiserror::Error)]
#[error("cycle failed at {step}: {source}")]
pub struct CycleError {
    pub step: DriverState,
    #[source]
    pub source: SelfPatchError,
    /// States visited, ending in `FAILED`.
    pub transitions: Vec<DriverState>,
}

/// Result of the VALIDATE step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub well_formed: bool,
    /// Structural elements the patch lacks.
    pub missing: Vec<String>,
    /// `invalid_patch.diff`, written only when validation failed.
    pub invalid_dump: Option<PathBuf>,
}

/// Everything a finished cycle produced.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub entry: String,
    pub baseline: EvalReport,
    pub problem_statement: String,
    pub patch: Patch,
    pub post_patch: EvalReport,
    pub validation: ValidationOutcome,
    pub apply: ApplyResult,
    pub delta: ResolvedDelta,
    pub transitions: Vec<DriverState>,
    /// `cycle.json`, when it could be written.
    pub summary_path: Option<PathBuf>,
}

impl CycleOutcome {
    /// `(baseline report, problem statement, patch text, post-patch report)`.
    pub fn into_parts(self) -> (EvalReport, String, String, EvalReport) {
        (
            self.baseline,
            self.problem_statement,
            self.patch.into_text(),
            self.post_patch,
        )
    }
}

/// Runs improvement cycles against injected collaborators.
pub struct ImproveDriver {
    backend: Arc<dyn LanguageModel>,
    sandbox: Arc<dyn SandboxManager>,
    evaluator: Arc<dyn EvaluationClient>,
    applicator: PatchApplicator,
    audit: AuditTrail,
    evaluation: EvaluationConfig,
    policy: InvalidPatchPolicy,
    log: LogContext,
}

/// States visited so far.
struct Progress {
    visited: Vec<DriverState>,
}

impl Progress {
    fn enter(&mut self, state: DriverState) -> DriverState {
        self.visited.push(state);
        obs::emit_state(&state);
        state
    }
}

impl ImproveDriver {
    pub fn new(
        backend: Arc<dyn LanguageModel>,
        sandbox: Arc<dyn SandboxManager>,
        evaluator: Arc<dyn EvaluationClient>,
        audit: AuditTrail,
        log: LogContext,
    ) -> Self {
        let log = log.component("driver");
        Self {
            backend,
            sandbox,
            evaluator,
            applicator: PatchApplicator::new(audit.clone(), log.clone()),
            audit,
            evaluation: EvaluationConfig::default(),
            policy: InvalidPatchPolicy::default(),
            log,
        }
    }

    pub fn with_policy(mut self, policy: InvalidPatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Subset, instance count and worker count used for both evaluations.
    pub fn with_evaluation(mut self, evaluation: EvaluationConfig) -> Self {
        self.evaluation = evaluation;
        self
    }

    /// Run one full cycle for `entry`.
    pub async fn run(&self, entry: &str) -> Result<CycleOutcome, CycleError> {
        self.run_inner(entry).instrument(self.log.span()).await
    }

    async fn run_inner(&self, entry: &str) -> Result<CycleOutcome, CycleError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut progress = Progress {
            visited: Vec::new(),
        };
        obs::emit_cycle_started(entry, &self.evaluation.subset, self.evaluation.num_instances);

        // BASELINE_EVAL
        let step = progress.enter(DriverState::BaselineEval);
        let baseline = match self.baseline().await {
            Ok(report) => report,
            Err(err) => return Err(fail(progress, step, err)),
        };
        let logs = baseline.to_log_text();

        // DIAGNOSE
        let step = progress.enter(DriverState::Diagnose);
        let problem_statement = match self
            .backend
            .send(&prompts::diagnose_prompt(entry, &logs), &[])
            .await
        {
            Ok(text) => text,
            Err(err) => return Err(fail(progress, step, err.into())),
        };

        // GENERATE_PATCH
        let step = progress.enter(DriverState::GeneratePatch);
        let patch = match self
            .backend
            .send(&prompts::improve_prompt(&problem_statement), &[])
            .await
        {
            Ok(text) => Patch::from_model_output(text),
            Err(err) => return Err(fail(progress, step, err.into())),
        };
        let patch_path = match self.audit.write_new_patch(patch.text()) {
            Ok(path) => path,
            Err(err) => return Err(fail(progress, step, err)),
        };

        // VALIDATE
        let step = progress.enter(DriverState::Validate);
        let validation = match self.validate(&patch) {
            Ok(outcome) => outcome,
            Err(err) => return Err(fail(progress, step, err)),
        };

        // APPLY
        let step = progress.enter(DriverState::Apply);
        let apply = match self
            .applicator
            .apply_scoped(self.sandbox.as_ref(), patch.text())
            .await
        {
            Ok(result) => result,
            Err(err) => return Err(fail(progress, step, err)),
        };
        if let Some(rejection) = apply.rejection() {
            warn!(error = %rejection, "continuing to re-evaluation with unapplied patch");
        }

        // RE_EVAL
        let step = progress.enter(DriverState::ReEval);
        let request = self.evaluation.request(&patch_path, IMPROVED_LABEL);
        let post_patch = match self.evaluator.evaluate(&request).await {
            Ok(report) => report,
            Err(err) => return Err(fail(progress, step, err)),
        };

        progress.enter(DriverState::Done);
        let delta = ResolvedDelta::between(&baseline, &post_patch);
        obs::emit_cycle_finished(
            delta.baseline_resolved,
            delta.post_resolved,
            clock.elapsed().as_millis() as u64,
        );

        let summary = CycleSummary {
            entry: entry.to_string(),
            started_at,
            finished_at: Utc::now(),
            transitions: progress.visited.clone(),
            problem_statement: problem_statement.clone(),
            patch_sha256: sha256_hex(patch.text().as_bytes()),
            patch_well_formed: validation.well_formed,
            apply: apply.clone(),
            baseline: baseline.clone(),
            post_patch: post_patch.clone(),
            delta: delta.clone(),
        };
        let summary_path = match self.audit.write_cycle_summary(&summary) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(error = %err, "failed to write cycle summary");
                None
            }
        };

        Ok(CycleOutcome {
            entry: entry.to_string(),
            baseline,
            problem_statement,
            patch,
            post_patch,
            validation,
            apply,
            delta,
            transitions: progress.visited,
            summary_path,
        })
    }

    async fn baseline(&self) -> crate::domain::error::Result<EvalReport> {
        let path = self.audit.write_baseline_patch()?;
        let request = self.evaluation.request(path, BASELINE_LABEL);
        let report = self.evaluator.evaluate(&request).await?;
        info!(
            tasks = report.len(),
            resolved = report.resolved_count(),
            "baseline established"
        );
        Ok(report)
    }

    fn validate(&self, patch: &Patch) -> crate::domain::error::Result<ValidationOutcome> {
        let well_formed = patch.is_well_formed();
        obs::emit_patch_validated(
            well_formed,
            patch.text().len(),
            patch.touched_files().len(),
            self.policy == InvalidPatchPolicy::BestEffort,
        );
        if well_formed {
            return Ok(ValidationOutcome {
                well_formed,
                missing: Vec::new(),
                invalid_dump: None,
            });
        }

        let dump = self.audit.write_invalid_patch(patch.text())?;
        let missing = patch.flags().missing();
        if self.policy == InvalidPatchPolicy::FailFast {
            return Err(SelfPatchError::PatchMalformed { missing });
        }
        Ok(ValidationOutcome {
            well_formed,
            missing,
            invalid_dump: Some(dump),
        })
    }
}

fn fail(mut progress: Progress, step: DriverState, source: SelfPatchError) -> CycleError {
    progress.visited.push(DriverState::Failed);
    obs::emit_state(&DriverState::Failed);
    obs::emit_cycle_failed(&step, &source);
    CycleError {
        step,
        source,
        transitions: progress.visited,
    }
}
