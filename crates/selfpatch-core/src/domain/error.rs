//! Domain-level error taxonomy for selfpatch.

use crate::backend::BackendError;
use crate::sandbox::SandboxError;

/// selfpatch domain errors.
///
/// `PatchRejected` and `PatchMalformed` are recorded by the driver without
/// aborting a cycle. Every other variant is fatal to the cycle it occurs in.
#[derive(Debug, thiserror::Error)]
pub enum SelfPatchError {
    #[error("sandbox acquire failed: {0}")]
    SandboxAcquire(String),

    #[error("sandbox error: {0}")]
    Sandbox(SandboxError),

    #[error("patch rejected (exit {exit_code}): {output}")]
    PatchRejected { exit_code: i32, output: String },

    #[error("patch malformed: missing {}", missing.join(", "))]
    PatchMalformed { missing: Vec<String> },

    #[error("evaluation unavailable: {0}")]
    EvaluationUnavailable(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("subset not found: {0}")]
    SubsetNotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SelfPatchError {
    /// Whether the driver may record this error and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SelfPatchError::PatchRejected { .. } | SelfPatchError::PatchMalformed { .. }
        )
    }
}

impl From<SandboxError> for SelfPatchError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Acquire { .. } => SelfPatchError::SandboxAcquire(err.to_string()),
            other => SelfPatchError::Sandbox(other),
        }
    }
}

/// Result type for selfpatch domain operations.
pub type Result<T> = std::result::Result<T, SelfPatchError>;
