//! Harness process execution.

use std::path::Path;
use std::process::Stdio;

use selfpatch_core::sandbox::exec::{self, ExecOutput};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::HarnessError;
use crate::spec::HarnessSpec;

/// Result of one harness execution.
#[derive(Debug, Clone)]
pub struct HarnessRun {
    /// Exit code (0 = success).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl HarnessRun {
    /// Whether the harness exited cleanly.
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

impl From<ExecOutput> for HarnessRun {
    fn from(out: ExecOutput) -> Self {
        Self {
            exit_code: out.exit_code,
            stdout: out.stdout,
            stderr: out.stderr,
            duration_ms: out.duration_ms,
        }
    }
}

/// Runs rendered harness commands with a hard timeout.
pub struct HarnessRunner;

impl HarnessRunner {
    /// Execute `spec` in `workdir`, killing it after `timeout_secs` (0 = none).
    ///
    /// A non-zero exit is an error; the harness signals success only by
    /// exiting cleanly and writing its report.
    pub async fn execute(
        spec: &HarnessSpec,
        workdir: Option<&Path>,
        timeout_secs: u64,
    ) -> Result<HarnessRun, HarnessError> {
        let (program, args) = spec
            .argv
            .split_first()
            .ok_or_else(|| HarnessError::Template("empty command".to_string()))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = workdir {
            command.current_dir(dir);
        }

        debug!(program = %program, digest = %spec.command_digest, "starting harness");
        let run: HarnessRun = exec::run(command, program, timeout_secs.saturating_mul(1_000))
            .await?
            .into();
        info!(
            exit_code = run.exit_code,
            duration_ms = run.duration_ms,
            "harness finished"
        );

        if !run.passed() {
            let output = if run.stderr.trim().is_empty() {
                &run.stdout
            } else {
                &run.stderr
            };
            return Err(HarnessError::exit(run.exit_code, output.trim()));
        }
        Ok(run)
    }
}
