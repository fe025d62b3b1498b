//! In-process evaluation client against a fake sandbox.

use std::path::Path;
use std::sync::Arc;

use selfpatch_core::fakes::{exec_failed, FakeSandboxManager};
use selfpatch_core::{
    AuditTrail, EvalRequest, EvaluationClient, LogContext, SelfPatchError,
    SimulatedEvaluationClient, SubsetCatalog, TaskId,
};
use tempfile::{tempdir, TempDir};

const PATCH: &str = "diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1,1 +1,1 @@\n-foo\n+bar\n";

struct Fixture {
    dir: TempDir,
    fake: Arc<FakeSandboxManager>,
    client: SimulatedEvaluationClient,
}

fn fixture(fake: FakeSandboxManager) -> Fixture {
    let dir = tempdir().unwrap();
    let subsets = dir.path().join("subsets");
    std::fs::create_dir_all(&subsets).unwrap();
    std::fs::write(subsets.join("small.json"), r#"["T-1", "T-2", "T-3"]"#).unwrap();

    let fake = Arc::new(fake);
    let client = SimulatedEvaluationClient::new(
        SubsetCatalog::new(&subsets),
        fake.clone(),
        AuditTrail::new(dir.path()),
        LogContext::default(),
    );
    Fixture { dir, fake, client }
}

fn request(dir: &Path, patch: &str, label: &str, n: usize) -> EvalRequest {
    let patch_path = dir.join(format!("{label}.diff"));
    std::fs::write(&patch_path, patch).unwrap();
    EvalRequest {
        patch_path,
        run_label: label.to_string(),
        subset: "small".to_string(),
        num_instances: n,
        max_workers: 4,
    }
}

fn ids(raw: &[&str]) -> Vec<TaskId> {
    raw.iter().map(|s| TaskId::new(*s)).collect()
}

#[tokio::test]
async fn empty_patch_is_baseline_without_sandbox() {
    let fx = fixture(FakeSandboxManager::new());
    let req = request(fx.dir.path(), "", "baseline", 2);

    let report = fx.client.evaluate(&req).await.unwrap();

    assert_eq!(report.task_ids(), ids(&["T-1", "T-2"]));
    assert_eq!(report.resolved_count(), 0);
    let t1 = report.get(&TaskId::new("T-1")).unwrap();
    assert!(!t1.patch_is_none);
    assert!(t1.patch_exists);
    assert!(!t1.applied);
    assert!(t1.test_outcomes.fail_to_pass.success.is_empty());
    assert_eq!(fx.fake.acquisitions(), 0);

    let written = fx.dir.path().join("output/baseline/baseline_report.json");
    assert!(written.exists());
}

#[tokio::test]
async fn baseline_is_deterministic() {
    let fx = fixture(FakeSandboxManager::new());
    let req = request(fx.dir.path(), "", "baseline", 3);

    let first = fx.client.evaluate(&req).await.unwrap();
    let second = fx.client.evaluate(&req).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn applicable_patch_resolves_every_selected_task() {
    let fx = fixture(FakeSandboxManager::new());
    let req = request(fx.dir.path(), PATCH, "improved", 3);

    let report = fx.client.evaluate(&req).await.unwrap();

    assert_eq!(report.len(), 3);
    assert_eq!(report.resolved_count(), 3);
    assert_eq!(report.applied_count(), 3);
    for (id, result) in report.iter() {
        assert_eq!(result.test_outcomes.fail_to_pass.success, vec![format!("test_{id}")]);
        assert!(result.test_outcomes.fail_to_pass.failure.is_empty());
    }

    let calls = fx.fake.exec_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(&calls[0][..3], &["git", "apply", "--check"]);
    assert_eq!(fx.fake.live(), 0);
}

#[tokio::test]
async fn already_applied_patch_counts_as_applied() {
    let fake = FakeSandboxManager::new();
    fake.push_exec(exec_failed(1, "error: patch failed: x:1"));
    // reverse check falls through to the default success
    let fx = fixture(fake);
    let req = request(fx.dir.path(), PATCH, "improved", 1);

    let report = fx.client.evaluate(&req).await.unwrap();

    assert_eq!(report.resolved_count(), 1);
    let calls = fx.fake.exec_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(&calls[1][..4], &["git", "apply", "--reverse", "--check"]);
    assert_eq!(fx.fake.releases(), 1);
}

#[tokio::test]
async fn non_applying_patch_resolves_nothing() {
    let fake = FakeSandboxManager::new();
    fake.push_exec(exec_failed(1, "error: patch failed"));
    fake.push_exec(exec_failed(1, "error: patch failed"));
    let fx = fixture(fake);
    let req = request(fx.dir.path(), PATCH, "improved", 3);

    let report = fx.client.evaluate(&req).await.unwrap();

    assert_eq!(report.resolved_count(), 0);
    assert!(report.iter().all(|(_, r)| r.patch_exists && !r.applied));
    assert_eq!(fx.fake.live(), 0);
}

#[tokio::test]
async fn sandbox_failure_is_evaluation_unavailable() {
    let fx = fixture(FakeSandboxManager::failing_acquire());
    let req = request(fx.dir.path(), PATCH, "improved", 1);

    let err = fx.client.evaluate(&req).await.unwrap_err();
    assert!(matches!(err, SelfPatchError::EvaluationUnavailable(_)));
    assert!(!fx.dir.path().join("output/improved/improved_report.json").exists());
}

#[tokio::test]
async fn unknown_subset_is_reported() {
    let fx = fixture(FakeSandboxManager::new());
    let mut req = request(fx.dir.path(), "", "baseline", 1);
    req.subset = "huge".to_string();

    let err = fx.client.evaluate(&req).await.unwrap_err();
    assert!(matches!(err, SelfPatchError::SubsetNotFound(_)));
}

#[tokio::test]
async fn escaping_run_label_is_rejected_before_sandbox() {
    let fx = fixture(FakeSandboxManager::new());
    let mut req = request(fx.dir.path(), PATCH, "improved", 1);
    req.run_label = "../outside".to_string();

    let err = fx.client.evaluate(&req).await.unwrap_err();
    assert!(matches!(err, SelfPatchError::InvalidConfig(_)));
    assert_eq!(fx.fake.acquisitions(), 0);
}
