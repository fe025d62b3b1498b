//! Patch applicator: moves a patch into a sandbox and runs `git apply`.
//!
//! A rejected patch is a normal outcome reported through [`ApplyResult`];
//! only sandbox faults (copy or exec could not run) are errors.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{debug, Instrument};

use crate::audit::AuditTrail;
use crate::domain::error::{Result, SelfPatchError};
use crate::obs::{self, LogContext};
use crate::sandbox::{with_sandbox, ExecOutput, SandboxHandle, SandboxManager};

/// Patch-apply primitive run inside the sandbox. `git apply` refuses fuzz.
pub const APPLY_PROGRAM: [&str; 2] = ["git", "apply"];

/// Outcome of handing a patch to the sandbox's apply command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub ok: bool,
    /// Combined output of the apply command; never empty on rejection.
    pub output: String,
    pub exit_code: i32,
}

impl ApplyResult {
    fn from_exec(out: ExecOutput) -> Self {
        let ok = out.success();
        let mut output = out.combined();
        if !ok && output.is_empty() {
            output = format!("{} exited with status {}", APPLY_PROGRAM.join(" "), out.exit_code);
        }
        Self {
            ok,
            output,
            exit_code: out.exit_code,
        }
    }

    /// The rejection as a domain error, if the apply failed.
    pub fn rejection(&self) -> Option<SelfPatchError> {
        (!self.ok).then(|| SelfPatchError::PatchRejected {
            exit_code: self.exit_code,
            output: self.output.clone(),
        })
    }
}

/// Which flavour of `git apply` to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplyMode {
    Apply,
    Check,
    ReverseCheck,
}

impl ApplyMode {
    fn flags(self) -> &'static [&'static str] {
        match self {
            ApplyMode::Apply => &[],
            ApplyMode::Check => &["--check"],
            ApplyMode::ReverseCheck => &["--reverse", "--check"],
        }
    }
}

/// Applies patch text inside a sandbox and keeps a host copy for audit.
#[derive(Debug, Clone)]
pub struct PatchApplicator {
    audit: AuditTrail,
    log: LogContext,
}

impl PatchApplicator {
    pub fn new(audit: AuditTrail, log: LogContext) -> Self {
        Self {
            audit,
            log: log.component("applicator"),
        }
    }

    /// Apply `patch_text` to the mounted tree of `handle`.
    ///
    /// Re-applying a patch that is already present is a rejection.
    pub async fn apply(
        &self,
        manager: &dyn SandboxManager,
        handle: &SandboxHandle,
        patch_text: &str,
    ) -> Result<ApplyResult> {
        self.audit.write_applied_copy(patch_text)?;
        let result = self
            .run(manager, handle, patch_text, ApplyMode::Apply)
            .instrument(self.log.span())
            .await?;
        self.log.span().in_scope(|| obs::emit_patch_applied(result.ok, &result.output));
        Ok(result)
    }

    /// Whether `patch_text` would apply cleanly, without touching the tree.
    pub async fn check(
        &self,
        manager: &dyn SandboxManager,
        handle: &SandboxHandle,
        patch_text: &str,
    ) -> Result<ApplyResult> {
        self.run(manager, handle, patch_text, ApplyMode::Check)
            .instrument(self.log.span())
            .await
    }

    /// Whether `patch_text` is already present in the tree.
    pub async fn is_already_applied(
        &self,
        manager: &dyn SandboxManager,
        handle: &SandboxHandle,
        patch_text: &str,
    ) -> Result<bool> {
        let result = self
            .run(manager, handle, patch_text, ApplyMode::ReverseCheck)
            .instrument(self.log.span())
            .await?;
        Ok(result.ok)
    }

    /// Acquire a sandbox, apply, and release it on every path.
    pub async fn apply_scoped(
        &self,
        manager: &dyn SandboxManager,
        patch_text: &str,
    ) -> Result<ApplyResult> {
        with_sandbox(manager, |handle| async move {
            self.apply(manager, &handle, patch_text).await
        })
        .await?
    }

    async fn run(
        &self,
        manager: &dyn SandboxManager,
        handle: &SandboxHandle,
        patch_text: &str,
        mode: ApplyMode,
    ) -> Result<ApplyResult> {
        let sandbox_path = self.stage(manager, handle, patch_text).await?;

        let mut argv: Vec<String> = APPLY_PROGRAM.iter().map(|s| s.to_string()).collect();
        argv.extend(mode.flags().iter().map(|s| s.to_string()));
        argv.push(sandbox_path);

        let out = manager.exec(handle, &argv).await?;
        debug!(mode = ?mode, exit_code = out.exit_code, "git apply finished");
        Ok(ApplyResult::from_exec(out))
    }

    /// Write the patch to a host temp file and copy it into the sandbox.
    async fn stage(
        &self,
        manager: &dyn SandboxManager,
        handle: &SandboxHandle,
        patch_text: &str,
    ) -> Result<String> {
        let mut staged = tempfile::Builder::new()
            .prefix("selfpatch-")
            .suffix(".patch")
            .tempfile()?;
        staged.write_all(patch_text.as_bytes())?;
        staged.flush()?;

        let sandbox_path = format!("/tmp/selfpatch-{}.patch", uuid::Uuid::new_v4().simple());
        manager.copy_in(handle, staged.path(), &sandbox_path).await?;
        Ok(sandbox_path)
    }
}
