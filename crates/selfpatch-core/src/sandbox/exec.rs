//! Process execution with a hard timeout.
//!
//! Every sandbox lifecycle call and every harness invocation goes through
//! [`run_command`]; the child is killed if the deadline passes.

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::error::{SandboxError, SandboxResult};

/// Captured result of one finished process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ExecOutput {
    /// Zero exit status.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, trimmed.
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, true) => String::new(),
            (false, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }
}

/// Run `argv` to completion, killing it after `timeout_ms` (0 = no limit).
pub async fn run_command(argv: &[String], timeout_ms: u64) -> SandboxResult<ExecOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| SandboxError::InvalidConfig("empty command".to_string()))?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    run(command, program, timeout_ms).await
}

/// Run a pre-configured command (working directory, env, ...) with a timeout.
pub async fn run(mut command: Command, program: &str, timeout_ms: u64) -> SandboxResult<ExecOutput> {
    let start = Instant::now();
    command.kill_on_drop(true);

    let child = command.spawn().map_err(|e| SandboxError::Spawn {
        program: program.to_string(),
        reason: e.to_string(),
    })?;

    let output = if timeout_ms > 0 {
        tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait_with_output())
            .await
            .map_err(|_| SandboxError::Timeout {
                limit_ms: timeout_ms,
            })??
    } else {
        child.wait_with_output().await?
    };

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_combined_output() {
        let out = ExecOutput {
            exit_code: 1,
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
            duration_ms: 0,
        };
        assert_eq!(out.combined(), "out\nerr");
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_run_simple_command() {
        let out = run_command(&argv(&["echo", "hello"]), 5_000).await.unwrap();
        assert!(out.success());
        assert!(out.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_failing_command() {
        let out = run_command(&argv(&["false"]), 5_000).await.unwrap();
        assert!(!out.success());
        assert_ne!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = run_command(&argv(&["/nonexistent/selfpatch-bin"]), 5_000)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let err = run_command(&argv(&["sleep", "5"]), 50).await.unwrap_err();
        match err {
            SandboxError::Timeout { limit_ms } => assert_eq!(limit_ms, 50),
            other => panic!("expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        assert!(matches!(
            run_command(&[], 1_000).await,
            Err(SandboxError::InvalidConfig(_))
        ));
    }
}
