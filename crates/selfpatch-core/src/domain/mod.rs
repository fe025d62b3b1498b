//! Domain models for selfpatch.
//!
//! Canonical definitions for the core entities:
//! - `TaskId` / `SubsetCatalog`: what gets evaluated
//! - `Patch`: a unified diff from the model, with structural flags
//! - `EvalReport`: per-task outcome of an evaluation run

pub mod error;
pub mod patch;
pub mod report;
pub mod task;

pub use error::{Result, SelfPatchError};
pub use patch::{validate, Patch, PatchFlags};
pub use report::{EvalReport, ReportReconciliation, ResolvedDelta, TaskResult, TestBucket, TestOutcomes};
pub use task::{SubsetCatalog, TaskId};
