//! Evaluation report: per-task pass/fail outcome returned by an evaluation client.
//!
//! The JSON shape follows the SWE-bench harness report: an object keyed by
//! task id whose values carry `resolved`, `patch_successfully_applied` and the
//! `tests_status` buckets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::task::TaskId;

/// Tests that ended in success or failure within one transition bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestBucket {
    #[serde(default)]
    pub success: Vec<String>,
    #[serde(default)]
    pub failure: Vec<String>,
}

/// Test-status buckets by transition between the unpatched and patched runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcomes {
    #[serde(rename = "FAIL_TO_PASS", default)]
    pub fail_to_pass: TestBucket,
    #[serde(rename = "PASS_TO_PASS", default)]
    pub pass_to_pass: TestBucket,
    #[serde(rename = "FAIL_TO_FAIL", default)]
    pub fail_to_fail: TestBucket,
    #[serde(rename = "PASS_TO_FAIL", default)]
    pub pass_to_fail: TestBucket,
}

/// Outcome of evaluating one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(rename = "patch_is_None", default)]
    pub patch_is_none: bool,
    #[serde(default)]
    pub patch_exists: bool,
    #[serde(rename = "patch_successfully_applied", default)]
    pub applied: bool,
    pub resolved: bool,
    #[serde(rename = "tests_status", default)]
    pub test_outcomes: TestOutcomes,
}

impl TaskResult {
    /// Placeholder for a requested task the harness said nothing about.
    pub fn unresolved() -> Self {
        Self::default()
    }
}

/// Per-task results keyed by exactly the requested task ids.
///
/// Immutable once built. Reports produced by evaluation clients go through
/// [`EvalReport::for_requested`], which enforces the key-set invariant;
/// `Deserialize` exists only to read persisted artifacts back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvalReport {
    results: BTreeMap<TaskId, TaskResult>,
}

/// Key-set repairs made while building a report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportReconciliation {
    /// Entries returned for tasks nobody asked for (dropped).
    pub unrequested: Vec<TaskId>,
    /// Requested tasks with no returned entry (filled as unresolved).
    pub missing: Vec<TaskId>,
}

impl ReportReconciliation {
    pub fn is_clean(&self) -> bool {
        self.unrequested.is_empty() && self.missing.is_empty()
    }
}

impl EvalReport {
    /// Build a report whose keys are exactly `requested`.
    pub fn for_requested(
        requested: &[TaskId],
        mut results: BTreeMap<TaskId, TaskResult>,
    ) -> (Self, ReportReconciliation) {
        let mut reconciliation = ReportReconciliation::default();
        let mut out = BTreeMap::new();

        for id in requested {
            match results.remove(id) {
                Some(result) => {
                    out.insert(id.clone(), result);
                }
                None => {
                    reconciliation.missing.push(id.clone());
                    out.insert(id.clone(), TaskResult::unresolved());
                }
            }
        }
        reconciliation.unrequested = results.into_keys().collect();

        (Self { results: out }, reconciliation)
    }

    /// Parse harness JSON and reconcile it against `requested`.
    pub fn from_json(
        requested: &[TaskId],
        raw: &[u8],
    ) -> serde_json::Result<(Self, ReportReconciliation)> {
        let results: BTreeMap<TaskId, TaskResult> = serde_json::from_slice(raw)?;
        Ok(Self::for_requested(requested, results))
    }

    pub fn get(&self, id: &TaskId) -> Option<&TaskResult> {
        self.results.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TaskId, &TaskResult)> {
        self.results.iter()
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.results.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn resolved_count(&self) -> usize {
        self.results.values().filter(|r| r.resolved).count()
    }

    pub fn applied_count(&self) -> usize {
        self.results.values().filter(|r| r.applied).count()
    }

    /// Log text handed to the diagnosis prompt (pretty JSON).
    pub fn to_log_text(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{:?}", self.results))
    }
}

/// Change in resolved tasks between a baseline and a post-patch report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDelta {
    pub baseline_resolved: usize,
    pub post_resolved: usize,
    pub newly_resolved: Vec<TaskId>,
    pub regressed: Vec<TaskId>,
}

impl ResolvedDelta {
    pub fn between(baseline: &EvalReport, post: &EvalReport) -> Self {
        let mut newly_resolved = Vec::new();
        let mut regressed = Vec::new();

        for (id, after) in post.iter() {
            let before = baseline.get(id).map(|r| r.resolved).unwrap_or(false);
            match (before, after.resolved) {
                (false, true) => newly_resolved.push(id.clone()),
                (true, false) => regressed.push(id.clone()),
                _ => {}
            }
        }
        for (id, before) in baseline.iter() {
            if before.resolved && post.get(id).is_none() {
                regressed.push(id.clone());
            }
        }

        Self {
            baseline_resolved: baseline.resolved_count(),
            post_resolved: post.resolved_count(),
            newly_resolved,
            regressed,
        }
    }

    /// Post-patch resolved count minus baseline resolved count.
    pub fn net(&self) -> i64 {
        self.post_resolved as i64 - self.baseline_resolved as i64
    }

    pub fn improved(&self) -> bool {
        self.net() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<TaskId> {
        raw.iter().map(|s| TaskId::from(*s)).collect()
    }

    fn resolved(flag: bool) -> TaskResult {
        TaskResult {
            applied: flag,
            resolved: flag,
            patch_exists: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_for_requested_fills_missing_and_drops_extras() {
        let requested = ids(&["a", "b"]);
        let mut results = BTreeMap::new();
        results.insert(TaskId::from("a"), resolved(true));
        results.insert(TaskId::from("zzz"), resolved(true));

        let (report, rec) = EvalReport::for_requested(&requested, results);
        assert_eq!(report.task_ids(), requested);
        assert_eq!(rec.missing, ids(&["b"]));
        assert_eq!(rec.unrequested, ids(&["zzz"]));
        assert!(!rec.is_clean());
        assert!(!report.get(&TaskId::from("b")).unwrap().resolved);
    }

    #[test]
    fn test_parses_swe_bench_shape() {
        let raw = serde_json::json!({
            "django__django-10973": {
                "patch_is_None": false,
                "patch_exists": true,
                "patch_successfully_applied": true,
                "resolved": true,
                "tests_status": {
                    "FAIL_TO_PASS": {"success": ["test_x"], "failure": []},
                    "PASS_TO_PASS": {"success": [], "failure": []},
                    "FAIL_TO_FAIL": {"success": [], "failure": []},
                    "PASS_TO_FAIL": {"success": [], "failure": []}
                }
            }
        });
        let bytes = serde_json::to_vec(&raw).unwrap();
        let requested = ids(&["django__django-10973"]);

        let (report, rec) = EvalReport::from_json(&requested, &bytes).unwrap();
        assert!(rec.is_clean());
        assert_eq!(report.resolved_count(), 1);
        assert_eq!(report.applied_count(), 1);
        let result = report.get(&requested[0]).unwrap();
        assert_eq!(result.test_outcomes.fail_to_pass.success, vec!["test_x"]);

        // Serializes back to the same keys.
        let back = serde_json::to_value(&report).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_resolved_delta() {
        let requested = ids(&["a", "b", "c"]);
        let mut before = BTreeMap::new();
        before.insert(TaskId::from("a"), resolved(true));
        before.insert(TaskId::from("b"), resolved(false));
        before.insert(TaskId::from("c"), resolved(false));
        let mut after = BTreeMap::new();
        after.insert(TaskId::from("a"), resolved(false));
        after.insert(TaskId::from("b"), resolved(true));
        after.insert(TaskId::from("c"), resolved(true));

        let (baseline, _) = EvalReport::for_requested(&requested, before);
        let (post, _) = EvalReport::for_requested(&requested, after);
        let delta = ResolvedDelta::between(&baseline, &post);

        assert_eq!(delta.baseline_resolved, 1);
        assert_eq!(delta.post_resolved, 2);
        assert_eq!(delta.newly_resolved, ids(&["b", "c"]));
        assert_eq!(delta.regressed, ids(&["a"]));
        assert_eq!(delta.net(), 1);
        assert!(delta.improved());
    }

    #[test]
    fn test_log_text_is_deterministic() {
        let requested = ids(&["b", "a"]);
        let (r1, _) = EvalReport::for_requested(&requested, BTreeMap::new());
        let (r2, _) = EvalReport::for_requested(&requested, BTreeMap::new());
        assert_eq!(r1.to_log_text(), r2.to_log_text());
        assert!(r1.to_log_text().contains("\"resolved\": false"));
    }
}
