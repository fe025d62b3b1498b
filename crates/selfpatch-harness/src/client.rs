//! Evaluation through an external harness process.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn, Instrument};

use selfpatch_core::audit::check_run_label;
use selfpatch_core::obs::{self, LogContext};
use selfpatch_core::{
    AuditTrail, EvalReport, EvalRequest, EvaluationClient, HarnessSettings, Result,
    SubsetCatalog, TaskId,
};

use crate::error::HarnessError;
use crate::runner::HarnessRunner;
use crate::spec::HarnessSpec;

/// File names under `output/<label>/`.
pub const INSTANCES_FILE: &str = "instances.json";
pub const RAW_REPORT_FILE: &str = "harness_report.json";

/// Runs the configured harness command once per evaluation.
///
/// The harness receives the selected task ids as a JSON array file and must
/// write a JSON object keyed by task id to `{report_path}`. That raw report is
/// reconciled against the request before it is returned.
pub struct HarnessEvaluationClient {
    catalog: SubsetCatalog,
    settings: HarnessSettings,
    audit: AuditTrail,
    workdir: Option<PathBuf>,
    log: LogContext,
}

impl HarnessEvaluationClient {
    pub fn new(
        catalog: SubsetCatalog,
        settings: HarnessSettings,
        audit: AuditTrail,
        log: LogContext,
    ) -> Self {
        Self {
            catalog,
            settings,
            audit,
            workdir: None,
            log: log.component("evaluation"),
        }
    }

    /// Run the harness from `dir` instead of the current directory.
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    fn run_dir(&self, run_label: &str) -> PathBuf {
        self.audit.dir().join("output").join(run_label)
    }

    async fn evaluate_inner(&self, request: &EvalRequest) -> Result<EvalReport> {
        let started = Instant::now();
        check_run_label(&request.run_label)?;
        let ids = self.catalog.select(&request.subset, request.num_instances)?;

        let run_dir = absolute(&self.run_dir(&request.run_label))?;
        tokio::fs::create_dir_all(&run_dir)
            .await
            .map_err(HarnessError::from)?;
        let instances_file = run_dir.join(INSTANCES_FILE);
        let report_path = run_dir.join(RAW_REPORT_FILE);
        write_instances(&instances_file, &ids).await?;
        remove_stale(&report_path).await?;

        let mut request = request.clone();
        request.patch_path = absolute(&request.patch_path)?;
        let spec = HarnessSpec::render(
            &self.settings.command,
            &request,
            instances_file,
            report_path,
        )?;

        info!(
            run_label = %request.run_label,
            tasks = ids.len(),
            digest = %spec.command_digest,
            "running evaluation harness"
        );
        HarnessRunner::execute(&spec, self.workdir.as_deref(), self.settings.timeout_secs).await?;

        let report = read_report(&spec.report_path, &ids).await?;
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

#[async_trait]
impl EvaluationClient for HarnessEvaluationClient {
    async fn evaluate(&self, request: &EvalRequest) -> Result<EvalReport> {
        self.evaluate_inner(request)
            .instrument(self.log.span())
            .await
    }
}

async fn write_instances(path: &Path, ids: &[TaskId]) -> std::result::Result<(), HarnessError> {
    let json = serde_json::to_vec_pretty(ids).map_err(|e| HarnessError::BadReport {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

async fn remove_stale(path: &Path) -> std::result::Result<(), HarnessError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn read_report(
    path: &Path,
    requested: &[TaskId],
) -> std::result::Result<EvalReport, HarnessError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(HarnessError::MissingReport {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    let (report, reconciliation) =
        EvalReport::from_json(requested, &raw).map_err(|e| HarnessError::BadReport {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if !reconciliation.is_clean() {
        warn!(
            missing = ?reconciliation.missing,
            unrequested = ?reconciliation.unrequested,
            "harness report reconciled against requested tasks"
        );
    }
    Ok(report)
}

fn absolute(path: &Path) -> std::result::Result<PathBuf, HarnessError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
