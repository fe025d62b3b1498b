//! Structured lifecycle events for the improvement cycle.
//!
//! Logging goes through an injected `LogContext`, so a captured subscriber
//! sees every event of a cycle without any global logger registry.

use std::sync::Arc;

use selfpatch_core::fakes::{exec_failed, FakeSandboxManager, ScriptedBackend, StaticEvaluationClient};
use selfpatch_core::obs::{
    emit_cycle_failed, emit_cycle_finished, emit_eval_completed, emit_patch_applied,
    emit_patch_validated, emit_state,
};
use selfpatch_core::{
    AuditTrail, DriverState, ImproveDriver, InvalidPatchPolicy, LogContext, CYCLE_LABEL,
};
use tempfile::tempdir;
use tracing_test::traced_test;

const PATCH: &str = "diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1,1 +1,1 @@\n-foo\n+bar\n";

#[traced_test]
#[test]
fn test_emit_state_logs_state_name() {
    emit_state(&DriverState::GeneratePatch);
    assert!(logs_contain("cycle.state"));
    assert!(logs_contain("GENERATE_PATCH"));
}

#[traced_test]
#[test]
fn test_invalid_patch_validation_is_a_warning() {
    emit_patch_validated(false, 12, 0, true);
    assert!(logs_contain("WARN"));
    assert!(logs_contain("patch.validated"));
    assert!(logs_contain("applying it anyway"));
}

#[traced_test]
#[test]
fn test_fail_fast_validation_warning_names_the_failure() {
    emit_patch_validated(false, 12, 0, false);
    assert!(logs_contain("failing the cycle"));
    assert!(!logs_contain("applying it anyway"));
}

#[traced_test]
#[test]
fn test_rejection_logs_apply_output() {
    emit_patch_applied(false, "error: patch does not apply");
    assert!(logs_contain("patch.rejected"));
    assert!(logs_contain("patch does not apply"));
}

#[traced_test]
#[test]
fn test_eval_and_cycle_events() {
    emit_eval_completed("baseline", 10, 3, 1500);
    emit_cycle_finished(3, 4, 9000);
    emit_cycle_failed(&DriverState::ReEval, &"harness exited 137");

    assert!(logs_contain("eval.completed"));
    assert!(logs_contain("cycle.finished"));
    assert!(logs_contain("cycle.failed"));
    assert!(logs_contain("harness exited 137"));
}

#[traced_test]
#[tokio::test]
async fn test_driver_cycle_emits_lifecycle_in_cycle_span() {
    let dir = tempdir().unwrap();
    let sandbox = Arc::new(FakeSandboxManager::new());
    sandbox.push_exec(exec_failed(1, "error: patch failed: x:1"));

    let driver = ImproveDriver::new(
        Arc::new(ScriptedBackend::new(["diagnosis", PATCH])),
        sandbox,
        Arc::new(StaticEvaluationClient::new(["T-1"])),
        AuditTrail::new(dir.path()),
        LogContext::cycle(CYCLE_LABEL, "T-1"),
    );
    driver.run("T-1").await.unwrap();

    assert!(logs_contain("cycle.started"));
    assert!(logs_contain("BASELINE_EVAL"));
    assert!(logs_contain("patch.validated"));
    assert!(logs_contain("patch.rejected"));
    assert!(logs_contain("RE_EVAL"));
    assert!(logs_contain("cycle.finished"));
    assert!(logs_contain("selfpatch.cycle"));
    assert!(logs_contain("run_label=\"cycle\"") || logs_contain("run_label=cycle"));
}

#[traced_test]
#[tokio::test]
async fn test_failed_cycle_logs_error_with_step() {
    let dir = tempdir().unwrap();
    let evaluator = Arc::new(StaticEvaluationClient::new(["T-1"]));
    evaluator.fail_on("baseline");

    let driver = ImproveDriver::new(
        Arc::new(ScriptedBackend::new(Vec::<String>::new())),
        Arc::new(FakeSandboxManager::new()),
        evaluator,
        AuditTrail::new(dir.path()),
        LogContext::cycle(CYCLE_LABEL, "T-1"),
    );
    assert!(driver.run("T-1").await.is_err());

    assert!(logs_contain("ERROR"));
    assert!(logs_contain("cycle.failed"));
    assert!(logs_contain("BASELINE_EVAL"));
}

#[traced_test]
#[tokio::test]
async fn test_fail_fast_cycle_does_not_claim_to_continue() {
    let dir = tempdir().unwrap();

    let driver = ImproveDriver::new(
        Arc::new(ScriptedBackend::new(["diagnosis", "change foo to bar"])),
        Arc::new(FakeSandboxManager::new()),
        Arc::new(StaticEvaluationClient::new(["T-1"])),
        AuditTrail::new(dir.path()),
        LogContext::cycle(CYCLE_LABEL, "T-1"),
    )
    .with_policy(InvalidPatchPolicy::FailFast);
    assert!(driver.run("T-1").await.is_err());

    assert!(logs_contain("failing the cycle"));
    assert!(!logs_contain("applying it anyway"));
}
