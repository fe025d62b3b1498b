//! selfpatch core library
//!
//! Patch lifecycle for an autonomous self-improvement loop: evaluate a
//! codebase, ask a language model to diagnose and patch it, apply the patch
//! in a disposable sandbox, and re-evaluate.

pub mod apply;
pub mod audit;
pub mod backend;
pub mod config;
pub mod domain;
pub mod driver;
pub mod eval;
pub mod fakes;
pub mod obs;
pub mod prompts;
pub mod sandbox;
pub mod telemetry;

pub use apply::{ApplyResult, PatchApplicator};
pub use audit::{AuditTrail, CycleSummary};
pub use backend::{
    build_backend, BackendConfig, BackendError, BackendKind, ChatMessage, LanguageModel,
};
pub use config::{InvalidPatchPolicy, SelfPatchConfig};
pub use domain::{
    validate, EvalReport, Patch, PatchFlags, ResolvedDelta, Result, SelfPatchError,
    SubsetCatalog, TaskId, TaskResult,
};
pub use driver::{
    CycleError, CycleOutcome, DriverState, ImproveDriver, ValidationOutcome, BASELINE_LABEL,
    CYCLE_LABEL, IMPROVED_LABEL,
};
pub use eval::{
    EvalRequest, EvaluationClient, EvaluationConfig, EvaluationMode, HarnessSettings,
    SimulatedEvaluationClient,
};
pub use obs::LogContext;
pub use sandbox::{
    with_sandbox, ContainerSandboxManager, SandboxConfig, SandboxError, SandboxHandle,
    SandboxManager,
};
pub use telemetry::init_tracing;

/// Version of the selfpatch crates.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
