//! In-memory fakes for the driver's collaborators (testing only)
//!
//! Provides `ScriptedBackend`, `FakeSandboxManager` and
//! `StaticEvaluationClient`, which satisfy the trait contracts without
//! network access, a container runtime or a benchmark harness.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::{BackendError, BackendKind, ChatMessage, LanguageModel};
use crate::domain::error::{Result, SelfPatchError};
use crate::domain::report::{EvalReport, TaskResult};
use crate::domain::task::TaskId;
use crate::eval::{EvalRequest, EvaluationClient};
use crate::sandbox::{ExecOutput, SandboxError, SandboxHandle, SandboxManager, SandboxResult};

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

/// Backend that replays queued replies in order and records every prompt.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<std::result::Result<String, BackendError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn push_error(&self, err: BackendError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    /// Prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenAi
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn send(
        &self,
        prompt: &str,
        _history: &[ChatMessage],
    ) -> std::result::Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::MalformedResponse("script exhausted".into())))
    }
}

// ---------------------------------------------------------------------------
// FakeSandboxManager
// ---------------------------------------------------------------------------

/// Successful, silent command output.
pub fn exec_ok() -> ExecOutput {
    ExecOutput {
        exit_code: 0,
        stdout: String::new(),
        stderr: String::new(),
        duration_ms: 0,
    }
}

/// Failed command output with `stderr`.
pub fn exec_failed(exit_code: i32, stderr: &str) -> ExecOutput {
    ExecOutput {
        exit_code,
        stdout: String::new(),
        stderr: stderr.to_string(),
        duration_ms: 0,
    }
}

#[derive(Debug, Default)]
struct SandboxState {
    next_id: usize,
    acquisitions: usize,
    releases: usize,
    live: HashSet<String>,
    max_live: usize,
    exec_script: VecDeque<SandboxResult<ExecOutput>>,
    exec_calls: Vec<Vec<String>>,
    copied: Vec<(String, String)>,
    fail_acquire: bool,
}

/// Sandbox manager that tracks handle lifetimes and replays exec results.
///
/// Commands with no scripted result succeed silently.
#[derive(Debug, Default)]
pub struct FakeSandboxManager {
    state: Mutex<SandboxState>,
}

impl FakeSandboxManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager whose every `acquire` fails.
    pub fn failing_acquire() -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().fail_acquire = true;
        fake
    }

    /// Queue the result of the next `exec`.
    pub fn push_exec(&self, output: ExecOutput) {
        self.state.lock().unwrap().exec_script.push_back(Ok(output));
    }

    /// Queue a fault for the next `exec`.
    pub fn push_exec_error(&self, err: SandboxError) {
        self.state.lock().unwrap().exec_script.push_back(Err(err));
    }

    pub fn acquisitions(&self) -> usize {
        self.state.lock().unwrap().acquisitions
    }

    pub fn releases(&self) -> usize {
        self.state.lock().unwrap().releases
    }

    /// Handles acquired and not yet released.
    pub fn live(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }

    /// Highest number of simultaneously live handles observed.
    pub fn max_live(&self) -> usize {
        self.state.lock().unwrap().max_live
    }

    pub fn exec_calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().exec_calls.clone()
    }

    /// `(sandbox_path, contents)` of every copied file.
    pub fn copied_files(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().copied.clone()
    }
}

#[async_trait]
impl SandboxManager for FakeSandboxManager {
    async fn acquire(&self) -> SandboxResult<SandboxHandle> {
        let mut state = self.state.lock().unwrap();
        if state.fail_acquire {
            return Err(SandboxError::Acquire {
                image: "fake".to_string(),
                reason: "acquire disabled".to_string(),
            });
        }
        state.next_id += 1;
        state.acquisitions += 1;
        let id = format!("fake-{}", state.next_id);
        state.live.insert(id.clone());
        state.max_live = state.max_live.max(state.live.len());
        Ok(SandboxHandle {
            id: id.clone(),
            name: id,
            host_dir: std::path::PathBuf::from("."),
            mount_path: "/app".to_string(),
        })
    }

    async fn exec(&self, _handle: &SandboxHandle, argv: &[String]) -> SandboxResult<ExecOutput> {
        let mut state = self.state.lock().unwrap();
        state.exec_calls.push(argv.to_vec());
        state.exec_script.pop_front().unwrap_or_else(|| Ok(exec_ok()))
    }

    async fn copy_in(
        &self,
        _handle: &SandboxHandle,
        host_path: &Path,
        sandbox_path: &str,
    ) -> SandboxResult<()> {
        let contents = std::fs::read_to_string(host_path)?;
        self.state
            .lock()
            .unwrap()
            .copied
            .push((sandbox_path.to_string(), contents));
        Ok(())
    }

    async fn release(&self, handle: &SandboxHandle) {
        let mut state = self.state.lock().unwrap();
        state.releases += 1;
        state.live.remove(&handle.id);
    }
}

// ---------------------------------------------------------------------------
// StaticEvaluationClient
// ---------------------------------------------------------------------------

/// Evaluation client returning fixed outcomes per run label.
///
/// Each request selects the first `num_instances` of the configured tasks;
/// tasks listed for the request's label are resolved.
#[derive(Debug)]
pub struct StaticEvaluationClient {
    tasks: Vec<TaskId>,
    resolved: Mutex<BTreeMap<String, BTreeSet<TaskId>>>,
    failing: Mutex<HashSet<String>>,
    requests: Mutex<Vec<(EvalRequest, String)>>,
}

impl StaticEvaluationClient {
    pub fn new<I, S>(tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        Self {
            tasks: tasks.into_iter().map(Into::into).collect(),
            resolved: Mutex::new(BTreeMap::new()),
            failing: Mutex::new(HashSet::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Mark `tasks` resolved for runs labelled `run_label`.
    pub fn resolve(&self, run_label: &str, tasks: &[&str]) {
        self.resolved
            .lock()
            .unwrap()
            .entry(run_label.to_string())
            .or_default()
            .extend(tasks.iter().map(|t| TaskId::new(*t)));
    }

    /// Make runs labelled `run_label` fail as unavailable.
    pub fn fail_on(&self, run_label: &str) {
        self.failing.lock().unwrap().insert(run_label.to_string());
    }

    /// Requests received with the patch file contents at call time.
    pub fn requests(&self) -> Vec<(EvalRequest, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl EvaluationClient for StaticEvaluationClient {
    async fn evaluate(&self, request: &EvalRequest) -> Result<EvalReport> {
        let patch = std::fs::read_to_string(&request.patch_path).unwrap_or_default();
        self.requests.lock().unwrap().push((request.clone(), patch.clone()));

        if self.failing.lock().unwrap().contains(&request.run_label) {
            return Err(SelfPatchError::EvaluationUnavailable(format!(
                "static harness down for {}",
                request.run_label
            )));
        }

        let selected: Vec<TaskId> = self
            .tasks
            .iter()
            .take(request.num_instances)
            .cloned()
            .collect();
        let resolved = self
            .resolved
            .lock()
            .unwrap()
            .get(&request.run_label)
            .cloned()
            .unwrap_or_default();
        let has_patch = !patch.trim().is_empty();

        let results = selected
            .iter()
            .map(|id| {
                let result = TaskResult {
                    patch_is_none: !has_patch,
                    patch_exists: has_patch,
                    applied: has_patch,
                    resolved: resolved.contains(id),
                    ..TaskResult::default()
                };
                (id.clone(), result)
            })
            .collect();

        Ok(EvalReport::for_requested(&selected, results).0)
    }
}
