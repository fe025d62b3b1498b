//! In-process evaluation: a task counts as resolved iff the patch applies.
//!
//! Stands in for the real harness during development. It never mutates the
//! mounted tree; the patch is only checked (`git apply --check`) and, when
//! that fails, reverse-checked to recognise a patch that is already present.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn, Instrument};

use crate::apply::PatchApplicator;
use crate::audit::{check_run_label, AuditTrail};
use crate::domain::error::{Result, SelfPatchError};
use crate::domain::report::{EvalReport, TaskResult};
use crate::domain::task::{SubsetCatalog, TaskId};
use crate::obs::{self, LogContext};
use crate::sandbox::{with_sandbox, SandboxManager};

use super::{EvalRequest, EvaluationClient};

pub struct SimulatedEvaluationClient {
    catalog: SubsetCatalog,
    sandbox: Arc<dyn SandboxManager>,
    applicator: PatchApplicator,
    audit: AuditTrail,
    log: LogContext,
}

impl SimulatedEvaluationClient {
    pub fn new(
        catalog: SubsetCatalog,
        sandbox: Arc<dyn SandboxManager>,
        audit: AuditTrail,
        log: LogContext,
    ) -> Self {
        let log = log.component("evaluation");
        Self {
            catalog,
            sandbox,
            applicator: PatchApplicator::new(audit.clone(), log.clone()),
            audit,
            log,
        }
    }

    /// Whether `patch_text` applies to, or is already present in, the tree.
    async fn patch_applies(&self, patch_text: &str) -> Result<bool> {
        let manager = self.sandbox.as_ref();
        let applicator = &self.applicator;
        let outcome = with_sandbox(manager, |handle| async move {
            let check = applicator.check(manager, &handle, patch_text).await?;
            if check.ok {
                return Ok(true);
            }
            debug!(output = %check.output, "patch does not apply; checking whether already present");
            applicator.is_already_applied(manager, &handle, patch_text).await
        })
        .await
        .map_err(unavailable)?;
        outcome.map_err(|e| match e {
            SelfPatchError::Sandbox(inner) => unavailable(inner),
            other => other,
        })
    }

    async fn evaluate_inner(&self, request: &EvalRequest) -> Result<EvalReport> {
        let started = Instant::now();
        check_run_label(&request.run_label)?;
        let ids = self.catalog.select(&request.subset, request.num_instances)?;
        let patch_text = tokio::fs::read_to_string(&request.patch_path).await?;
        let has_patch = !patch_text.trim().is_empty();

        let applied = if has_patch {
            self.patch_applies(&patch_text).await?
        } else {
            debug!(patch = %request.patch_path.display(), "empty patch; evaluating baseline");
            false
        };

        let results: BTreeMap<_, _> = ids
            .iter()
            .map(|id| (id.clone(), simulated_result(id, applied)))
            .collect();

        let (report, reconciliation) = EvalReport::for_requested(&ids, results);
        if !reconciliation.is_clean() {
            warn!(
                missing = reconciliation.missing.len(),
                unrequested = reconciliation.unrequested.len(),
                "report reconciled against requested tasks"
            );
        }

        self.audit.write_report(&request.run_label, &report)?;
        obs::emit_eval_completed(
            &request.run_label,
            report.len(),
            report.resolved_count(),
            started.elapsed().as_millis() as u64,
        );
        Ok(report)
    }
}

/// Record for one task: the patch file exists (possibly empty), and a patch
/// that applies flips the task's own test from failing to passing.
fn simulated_result(id: &TaskId, applied: bool) -> TaskResult {
    let mut result = TaskResult {
        patch_is_none: false,
        patch_exists: true,
        applied,
        resolved: applied,
        ..TaskResult::default()
    };
    if applied {
        result
            .test_outcomes
            .fail_to_pass
            .success
            .push(format!("test_{id}"));
    }
    result
}

fn unavailable(err: impl std::fmt::Display) -> SelfPatchError {
    SelfPatchError::EvaluationUnavailable(format!("simulated harness: {err}"))
}

#[async_trait]
impl EvaluationClient for SimulatedEvaluationClient {
    async fn evaluate(&self, request: &EvalRequest) -> Result<EvalReport> {
        self.evaluate_inner(request)
            .instrument(self.log.span())
            .await
    }
}
