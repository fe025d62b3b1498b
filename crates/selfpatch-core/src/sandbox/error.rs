//! Error types for the sandbox module.

/// Errors produced by the sandbox layer.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to start sandbox from image {image}: {reason}")]
    Acquire { image: String, reason: String },

    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("command timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("copy into sandbox {sandbox} failed: {reason}")]
    Copy { sandbox: String, reason: String },

    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
