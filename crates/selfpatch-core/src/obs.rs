//! Structured observability hooks for the improvement cycle.
//!
//! This module provides:
//! - [`LogContext`], the logging context every component receives at
//!   construction (no process-wide logger registry)
//! - emission functions for key lifecycle events
//!
//! Events are emitted at `info!` level unless noted. For JSON output, start
//! the binary with `--json`.

use tracing::{info, warn, Span};

/// Logging context injected into components.
///
/// Wraps a `tracing::Span` carrying the run label and task entry. Components
/// instrument their async work with [`LogContext::span`] so concurrent cycles
/// in one process keep their output attributable.
#[derive(Debug, Clone)]
pub struct LogContext {
    span: Span,
}

impl LogContext {
    /// Context for one driver cycle.
    pub fn cycle(run_label: &str, entry: &str) -> Self {
        Self {
            span: tracing::info_span!("selfpatch.cycle", run_label = %run_label, entry = %entry),
        }
    }

    /// Context for standalone use (CLI `evaluate`, tests).
    pub fn standalone(run_label: &str) -> Self {
        Self {
            span: tracing::info_span!("selfpatch.run", run_label = %run_label),
        }
    }

    /// Child context tagged with a component name.
    pub fn component(&self, name: &'static str) -> Self {
        Self {
            span: tracing::info_span!(parent: &self.span, "selfpatch.component", component = name),
        }
    }

    pub fn span(&self) -> Span {
        self.span.clone()
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self {
            span: Span::none(),
        }
    }
}

/// Emit event: cycle started for a task entry.
pub fn emit_cycle_started(entry: &str, subset: &str, num_instances: usize) {
    info!(
        event = "cycle.started",
        entry = %entry,
        subset = %subset,
        num_instances = num_instances,
    );
}

/// Emit event: driver moved to a new state.
pub fn emit_state(state: &dyn std::fmt::Display) {
    info!(event = "cycle.state", state = %state);
}

/// Emit event: structural validation result.
///
/// `continue_cycle` says whether the cycle goes on to apply a malformed patch.
pub fn emit_patch_validated(
    well_formed: bool,
    bytes: usize,
    files: usize,
    continue_cycle: bool,
) {
    if well_formed {
        info!(event = "patch.validated", well_formed = true, bytes = bytes, files = files);
    } else if continue_cycle {
        warn!(
            event = "patch.validated",
            well_formed = false,
            bytes = bytes,
            "generated patch failed validation; applying it anyway"
        );
    } else {
        warn!(
            event = "patch.validated",
            well_formed = false,
            bytes = bytes,
            "generated patch failed validation; failing the cycle"
        );
    }
}

/// Emit event: patch applied cleanly or rejected by the sandbox.
pub fn emit_patch_applied(ok: bool, output: &str) {
    if ok {
        info!(event = "patch.applied", ok = true);
    } else {
        warn!(event = "patch.rejected", ok = false, output = %output);
    }
}

/// Emit event: evaluation finished.
pub fn emit_eval_completed(run_label: &str, tasks: usize, resolved: usize, duration_ms: u64) {
    info!(
        event = "eval.completed",
        run_label = %run_label,
        tasks = tasks,
        resolved = resolved,
        duration_ms = duration_ms,
    );
}

/// Emit event: cycle finished with its resolved-count delta.
pub fn emit_cycle_finished(baseline_resolved: usize, post_resolved: usize, duration_ms: u64) {
    info!(
        event = "cycle.finished",
        baseline_resolved = baseline_resolved,
        post_resolved = post_resolved,
        duration_ms = duration_ms,
    );
}

/// Emit event: cycle failed (error level).
pub fn emit_cycle_failed(step: &dyn std::fmt::Display, error: &dyn std::fmt::Display) {
    tracing::error!(event = "cycle.failed", step = %step, error = %error);
}
