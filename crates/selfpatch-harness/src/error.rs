//! Harness invocation errors.

use std::path::PathBuf;

use selfpatch_core::{SandboxError, SelfPatchError};

/// Longest slice of harness output kept in an error.
const MAX_OUTPUT: usize = 2_000;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("harness command template: {0}")]
    Template(String),

    #[error("harness could not run: {0}")]
    Launch(#[from] SandboxError),

    #[error("harness exited with status {exit_code}: {output}")]
    Exit { exit_code: i32, output: String },

    #[error("harness produced no report at {}", path.display())]
    MissingReport { path: PathBuf },

    #[error("harness report at {} is unreadable: {reason}", path.display())]
    BadReport { path: PathBuf, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub(crate) fn exit(exit_code: i32, output: &str) -> Self {
        HarnessError::Exit {
            exit_code,
            output: tail(output, MAX_OUTPUT),
        }
    }
}

/// All harness faults surface as `EvaluationUnavailable`.
impl From<HarnessError> for SelfPatchError {
    fn from(err: HarnessError) -> Self {
        SelfPatchError::EvaluationUnavailable(err.to_string())
    }
}

fn tail(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}
