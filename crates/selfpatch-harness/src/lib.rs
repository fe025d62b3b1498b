//! selfpatch harness - evaluation through an external benchmark harness
//!
//! Provides an [`EvaluationClient`](selfpatch_core::EvaluationClient) that:
//! - Renders the configured command template for each request
//! - Runs it with a hard timeout
//! - Reads and reconciles the JSON report it leaves behind

pub mod client;
pub mod error;
pub mod runner;
pub mod spec;

pub use client::HarnessEvaluationClient;
pub use error::HarnessError;
pub use runner::{HarnessRun, HarnessRunner};
pub use spec::HarnessSpec;
